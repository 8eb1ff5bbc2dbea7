use thiserror::Error;

/// Fusion and alignment error types
///
/// Insufficient data (too few anchors, no fix on a record) is not an error:
/// the affected scope is left untouched and a warning is logged.
#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed record on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed config: {0}")]
    Config(#[source] serde_json::Error),

    #[error("No absolute fix to use as local origin")]
    NoOrigin,
}

/// Result type for library operations
pub type Result<T> = std::result::Result<T, FusionError>;
