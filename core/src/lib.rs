pub mod cli;
pub mod config;
pub mod init;
pub mod interpreter;

// Re-export init API for convenience
pub use init::{initialize, InitBuilder, InitOptions};

pub use config::Config;
pub use interpreter::{load_unit, load_unit_json, Frame, Host, Unit};
