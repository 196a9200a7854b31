pub mod base;
pub mod configs;
pub mod factory;
pub mod ollama;
pub mod openai;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
