use thiserror::Error;

/// Main error type for cimscope
#[derive(Error, Debug)]
pub enum CimscopeError {
    /// Composite identifier without its `NSFILE_` marker or `:` delimiter
    #[error("Malformed identifier: {0}")]
    MalformedIdentifier(String),

    /// Identifier prefix with no registered source file
    #[error("Unknown file prefix: {0}")]
    UnknownPrefix(String),

    /// User-supplied seed that does not decode or names no entity
    #[error("Unresolvable seed: {0}")]
    UnresolvableSeed(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// RDF/XML parse errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Snapshot (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using CimscopeError
pub type Result<T> = std::result::Result<T, CimscopeError>;
