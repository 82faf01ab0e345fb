//! # Shell Module
//!
//! Entry point and command-line handling for the `settle` binary.

pub mod cli;

pub use cli::{Cli, ProbeCommand, exit_code, run, wait_for_probe};
