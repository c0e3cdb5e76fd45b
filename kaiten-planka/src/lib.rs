pub mod cli;
pub mod http;
pub mod kaiten;
pub mod load_config;
pub mod planka;

pub use cli::{run, Cli, Commands};
