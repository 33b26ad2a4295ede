use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

/// Every way an ingest (or buffer construction) can be refused.
///
/// A call that returns one of these has not touched the buffer, the cursor,
/// or the visit counter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("corrupted window state: {0}")]
    Invariant(String),
}

impl IngestError {
    pub fn label(&self) -> &'static str {
        match self {
            IngestError::Config(_)    => "CONFIG",
            IngestError::Shape(_)     => "SHAPE",
            IngestError::Invariant(_) => "INVARIANT",
        }
    }
}
