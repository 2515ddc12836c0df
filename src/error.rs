//! Error taxonomy shared by the composition core and persistence.

use uuid::Uuid;

pub type Result<T> = std::result::Result<T, ComposeError>;

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    /// An image handle could not be turned into bytes.
    #[error("image source unavailable ({handle}): {reason}")]
    SourceUnavailable { handle: String, reason: String },

    #[error("export failed: {0}")]
    ExportFailed(String),

    /// Another export currently owns the staging buffer.
    #[error("an export is already in progress")]
    ExportBusy,

    #[error("storage quota exceeded: {needed} bytes needed, {available} available")]
    StorageQuotaExceeded { needed: usize, available: usize },

    #[error("invalid transform: {0}")]
    InvalidTransform(String),

    #[error("layer {0} not found")]
    LayerNotFound(Uuid),

    #[error("background removal failed: {0}")]
    BackgroundRemoval(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl ComposeError {
    pub fn source_unavailable(handle: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            handle: handle.into(),
            reason: reason.to_string(),
        }
    }
}
