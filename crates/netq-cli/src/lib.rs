//! netq command-line interface.
//!
//! The binary in `main.rs` is the composition root: it builds the HTTP
//! client, the queue and the progress bar, then hands off to a handler.

pub mod error;
pub mod handlers;
pub mod logging;
pub mod parser;
pub mod progress;

pub use error::CliError;
pub use parser::{Cli, Commands, FetchArgs};
