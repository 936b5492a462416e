/// Errors that can occur in debug server and client operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] statewire_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] statewire_frame::FrameError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A payload parsed as JSON but is not a debug snapshot.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// The snapshot's image data is not valid base64.
    #[error("invalid image data: {0}")]
    Image(#[from] base64::DecodeError),

    /// Peer disconnected.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// Operation timed out.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, ServerError>;
