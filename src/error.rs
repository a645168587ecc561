//! Error types for avenc.

use crate::engine::EngineError;
use crate::negotiation::NegotiationError;
use thiserror::Error;

/// Result type alias using avenc's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for avenc operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Format negotiation failed; no session is open.
    #[error("negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),

    /// Data arrived before a format was negotiated.
    #[error("not negotiated: no encoder session is open")]
    NotNegotiated,

    /// Input violated a precondition of the current format.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The codec engine reported an error.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Unknown property or invalid property value.
    #[error("property error: {0}")]
    Property(String),

    /// Invalid element configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error only affects the current call.
    ///
    /// Precondition violations abort the buffer at hand without touching
    /// session or cache state.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::NotNegotiated | Self::Precondition(_))
    }
}
