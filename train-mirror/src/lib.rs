pub mod cli;
pub mod load_config;
pub mod self_update;

pub use cli::{run, Cli, Commands};
