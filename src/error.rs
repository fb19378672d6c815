use thiserror::Error;

/// Result alias used across the pipeline.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised while converting G-code to STL.
///
/// Empty output (no segments, no faces) is not an error.
#[derive(Debug, Error)]
pub enum Error {
    /// A recognized numeric field could not be parsed.
    #[error("line {line}: malformed number in `{text}`")]
    Parse { line: usize, text: String },

    /// The source could not be read or the destination could not be written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The mesh would need more vertices than a u32 index can address.
    #[error("mesh too large: {vertices} vertices exceed the u32 index space")]
    MeshTooLarge { vertices: usize },
}

impl Error {
    pub(crate) fn parse(line: usize, text: &str) -> Self {
        Error::Parse {
            line,
            text: text.to_string(),
        }
    }
}
