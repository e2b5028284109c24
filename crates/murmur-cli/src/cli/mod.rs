pub mod args;
pub mod config;
pub mod runner;

pub use args::{Cli, CliCommand};
pub use config::{CliConfig, Credentials};
pub use runner::{execute, open_storage, render};
