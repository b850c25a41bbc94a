use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] shopsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to read import file {path}: {message}")]
    Import { path: PathBuf, message: String },
    #[error("Import file {0} contains no records")]
    EmptyImport(PathBuf),
}
