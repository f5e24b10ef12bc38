// CLI module for oxitag
//
// Only compiled into the binary; everything here sits on top of the public
// library API.

pub mod commands;
pub mod config;
pub mod output;

pub use commands::run;
pub use config::Config;

// Error type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub enum CliError {
    FileNotFound(String),
    InvalidArgument(String),
    Tag(oxitag::TagError),
    IoError(std::io::Error),
    ParseError(String),
    Other(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::FileNotFound(path) => write!(f, "File not found: {}", path),
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Tag(e) => write!(f, "{}", e),
            CliError::IoError(e) => write!(f, "I/O error: {}", e),
            CliError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            CliError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::IoError(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::ParseError(e.to_string())
    }
}

impl From<oxitag::TagError> for CliError {
    fn from(e: oxitag::TagError) -> Self {
        match e {
            oxitag::TagError::Io(e) => CliError::IoError(e),
            other => CliError::Tag(other),
        }
    }
}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> Self {
        CliError::Other(format!("{:#}", e))
    }
}
