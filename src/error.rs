//! Error handling for skelgen.
//! Defines the error kinds raised while loading a template document,
//! resolving its variables and emitting files.

use std::io;
use thiserror::Error;

/// Custom error types for skelgen operations.
///
/// Every error is fatal to a generation run: the first one aborts the
/// remaining work of the current phase and all subsequent phases.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed document structure (wrong node kind, invalid field).
    #[error("Parse error at line {line}, column {column}: {message}.")]
    ParseError { line: usize, column: usize, message: String },

    /// An import source is unreachable or itself malformed.
    #[error("Import error for '{locator}': {message}.")]
    ImportError { locator: String, message: String },

    /// Template grammar or evaluation failure, including explicit `error(...)` calls.
    #[error("Expression error in '{item}': {message}.")]
    ExpressionError { item: String, message: String },

    /// Missing URL, unsupported type, network failure, rejected or unparsable response.
    #[error("Remote variable '{name}' error: {message}.")]
    RemoteVarError { name: String, message: String },

    /// Empty or unsupported iteration source.
    #[error("Range error: {0}.")]
    RangeError(String),

    /// I/O failure while writing or copying an output file, or a corrupted byte stream.
    #[error("Failed to write '{path}': {message}.")]
    FileWriteError { path: String, message: String },

    /// A declared variable value is neither a scalar nor a list of scalars.
    #[error("Unsupported value type for '{key}': expected a string or a list of strings.")]
    UnsupportedTypeError { key: String },

    /// A pre or post execution command failed.
    #[error("Hook execution error: {0}.")]
    HookError(String),

    #[error("IO error: {0}.")]
    IoError(#[from] io::Error),

    #[error("Output directory '{output_dir}' already exists. Use --force to write into it.")]
    OutputDirectoryExistsError { output_dir: String },

    #[error("Template document '{path}' does not exist.")]
    DocumentNotFoundError { path: String },
}

impl Error {
    /// Builds a [`Error::ParseError`] from a YAML error, keeping its location when known.
    pub fn from_yaml(err: serde_yaml::Error) -> Self {
        let (line, column) =
            err.location().map(|loc| (loc.line(), loc.column())).unwrap_or((0, 0));
        Error::ParseError { line, column, message: err.to_string() }
    }

    /// Builds a [`Error::ParseError`] from a JSON error.
    pub fn from_json(err: serde_json::Error) -> Self {
        Error::ParseError { line: err.line(), column: err.column(), message: err.to_string() }
    }
}

/// Convenience type alias for Results with [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Default error handler that prints the error and exits the program.
pub fn default_error_handler(err: Error) {
    eprintln!("{err}");
    std::process::exit(1);
}
