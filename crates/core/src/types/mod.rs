//! Domain types shared across the workspace

mod command;

pub use command::CommandSpec;
