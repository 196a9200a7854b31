//! These models represent the objects passed around a roundtable.
//!
//! Every participant (supervisor, worker agent, nested team) speaks in terms of
//! these structs. Provider specific wire formats are converted at the edge in
//! `providers::utils` and never leak past it.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
