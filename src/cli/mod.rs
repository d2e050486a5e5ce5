//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing and subcommand handlers.

mod args;
mod commands;
mod event_loop;

pub use args::{Args, Command, ConfigAction};
pub use commands::{describe, handle_config_action, list_sources};
pub use event_loop::run;
