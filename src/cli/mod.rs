pub mod args;
pub mod config;
pub mod loader;
pub mod skeleton;

pub use args::Args;
pub use config::ConfigFile;
pub use loader::{InputLoader, Inputs, run};
