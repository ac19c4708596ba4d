//! CLI-specific error types and exit codes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Argument validation error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// IO error (output directory, permissions).
    #[error("IO error: {0}")]
    Io(String),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),

    /// The run finished but some transfers did not succeed.
    #[error("{failed} of {total} transfers failed")]
    TransfersFailed { failed: u32, total: u32 },

    /// Ctrl-C during the run.
    #[error("Interrupted")]
    Interrupted,
}

impl CliError {
    /// Map error to a process exit code (sysexits.h where one fits).
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::TransfersFailed { .. } => 1,
            Self::Arguments(_) => 2,
            Self::Client(_) => 70,
            Self::Io(_) => 74,
            Self::Interrupted => 130,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
