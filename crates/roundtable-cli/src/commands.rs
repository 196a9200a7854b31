pub mod rooms;
pub mod run;
pub mod session;
pub mod version;
