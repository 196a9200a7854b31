pub mod agent;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod rooms;
pub mod settings;
pub mod supervisor;
pub mod toolkits;
