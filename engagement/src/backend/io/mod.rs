//! # IO Module
//!
//! The interface layer between the outside world and the domain services.
//! Today that is the command line; handlers translate arguments into domain
//! commands and render results as text.

pub mod cli;

pub use cli::{execute_command, Command};
