//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;
use typeshift_core::{MigrationError, SchemaError};

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Reading or writing a file failed.
    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A schema file did not describe a valid schema.
    #[error("{}: {source}", path.display())]
    Schema {
        path: PathBuf,
        #[source]
        source: SchemaError,
    },

    /// Storage, parsing or serialization error from the core.
    #[error(transparent)]
    Core(#[from] typeshift_core::Error),

    /// Diffing, planning or committing a migration failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),
}
