use thiserror::Error;

/// Central error type for the everyinstrument crate.
#[derive(Debug, Error)]
pub enum StemError {
    // Generic fallback (wraps anyhow)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),

    // Domain-specific variants
    #[error("`{tool}` is required but was not found. Install it and make sure it is on PATH")]
    MissingDependency { tool: String },

    #[error("{engine} failed: {message}")]
    Engine { engine: String, message: String },

    #[error("Separation failed\n{log}")]
    Separation { log: String },

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Unsupported format `{0}`")]
    UnsupportedFormat(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cache dir not available")]
    CacheDirUnavailable,
}

impl StemError {
    /// True for errors caused by the caller's request rather than the environment.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            StemError::UnsupportedFormat(_) | StemError::InvalidInput(_)
        )
    }
}

// --- Implement From conversions for common errors ---
impl From<std::io::Error> for StemError {
    fn from(e: std::io::Error) -> Self {
        StemError::Anyhow(e.into())
    }
}

impl From<serde_json::Error> for StemError {
    fn from(e: serde_json::Error) -> Self {
        StemError::Anyhow(e.into())
    }
}

impl From<zip::result::ZipError> for StemError {
    fn from(e: zip::result::ZipError) -> Self {
        StemError::Anyhow(e.into())
    }
}

pub type Result<T> = std::result::Result<T, StemError>;
