//! Error taxonomy shared across the engine.

use thiserror::Error;

/// Failures surfaced by the transport session, renderer and dispatcher.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The transport session is not OPEN at send time.
    #[error("transport session is not connected")]
    NotConnected,

    /// The underlying network/protocol layer rejected a send.
    #[error("transport error: {0}")]
    Transport(String),

    /// Image decode, encode or compositing failure.
    #[error("render error: {0}")]
    Render(String),

    /// Repository or filesystem write failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// A referenced record does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
}

impl From<image::ImageError> for EngineError {
    fn from(err: image::ImageError) -> Self {
        EngineError::Render(err.to_string())
    }
}
