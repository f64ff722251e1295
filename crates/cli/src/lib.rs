//! Command-line front end for runcached

pub mod cli;
pub mod execute;

pub use cli::Cli;
pub use execute::execute;
