use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Top-level service error covering startup and serving failures
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Couldn't bind server to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Configuration-specific error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value: {field} = {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("No {name} found in your PATH, please provide one")]
    ToolNotFound { name: String },

    #[error("Tool path is not an executable file: {path}")]
    ToolNotExecutable { path: PathBuf },
}

/// Failures of the external tool process feeding one request
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Tool {tool} started without a stdout handle")]
    MissingStdout { tool: PathBuf },

    #[error("Tool output IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tool {tool} exited unsuccessfully: {status}")]
    Exited { tool: PathBuf, status: ExitStatus },

    #[error("Tool task ended abnormally: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Tokenizer-level failures; these end a scan but never a request
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Malformed attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("Input ended inside table {table}")]
    UnexpectedEof { table: String },
}

/// The response body receiver has been dropped
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitError {
    #[error("Client disconnected")]
    ClientGone,
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ServerError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
