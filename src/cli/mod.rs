//! Command line interface module
//!
//! Argument parsing for the `replicate` and `validate` subcommands and the
//! runner that layers configuration and drives a run.

pub mod args;
pub mod runner;

pub use args::{Args, Command, CommonArgs, ReplicateArgs, ValidateArgs};
pub use runner::{Runner, exit_status};
