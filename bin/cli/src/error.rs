//! CLI error types.

use std::fmt;

/// Errors that stop a command before a migration outcome exists.
///
/// All of them exit with code 3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliError {
    /// Configuration could not be loaded.
    Config { details: String },
    /// A required config section is missing.
    MissingSection { section: &'static str },
    /// Reading input or writing output failed.
    Io { details: String },
    /// Listing the source instance failed.
    Source { details: String },
    /// The migration engine failed outside a run outcome.
    Engine { details: String },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "configuration error: {details}"),
            Self::MissingSection { section } => {
                write!(f, "missing [{section}] configuration section")
            }
            Self::Io { details } => write!(f, "I/O error: {details}"),
            Self::Source { details } => write!(f, "failed to read source workflows: {details}"),
            Self::Engine { details } => write!(f, "migration engine error: {details}"),
        }
    }
}

impl std::error::Error for CliError {}
