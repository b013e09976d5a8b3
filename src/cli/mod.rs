//! Command line interface

pub mod args;
pub mod commands;
mod delegate;

pub use args::{Cli, Commands};
pub use delegate::ConsoleDelegate;
