//! Negotiation error types.

use crate::format::PixelFormat;
use thiserror::Error;

/// Error during caps negotiation.
///
/// Every variant is recoverable: the element stays usable and a later
/// negotiation may succeed. No encoder session is open after any of them.
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// The offered caps cannot be translated into an engine configuration.
    #[error("{codec}: cannot use offered caps: {reason}")]
    InvalidCaps {
        /// Codec name.
        codec: String,
        /// Detailed explanation.
        reason: String,
    },

    /// The engine refused to open with the requested configuration.
    #[error("{codec}: engine rejected configuration: {reason}")]
    Rejected {
        /// Codec name.
        codec: String,
        /// Engine message.
        reason: String,
    },

    /// The engine opened but silently substituted a different pixel format.
    #[error(
        "{codec}: requested pixel format {requested} but engine chose {}",
        .chosen.map(|p| p.name()).unwrap_or("none")
    )]
    FormatMismatch {
        /// Codec name.
        codec: String,
        /// Pixel format from the offered caps.
        requested: PixelFormat,
        /// Pixel format the engine settled on.
        chosen: Option<PixelFormat>,
    },

    /// No output caps can be derived for this codec.
    #[error("{codec}: no output caps mapping for codec")]
    UnsupportedCodec {
        /// Codec name.
        codec: String,
    },

    /// Downstream accepts none of the formats the encoder can produce.
    #[error(
        "{codec}: no common output format\n  downstream accepts: {allowed}\
         \n  encoder produces: {derived}"
    )]
    NoCommonFormat {
        /// Codec name.
        codec: String,
        /// Caps downstream advertised.
        allowed: String,
        /// Caps derived from the open engine.
        derived: String,
    },

    /// Downstream refused the fixated output format.
    #[error("{codec}: downstream rejected output format {format}")]
    DownstreamRejected {
        /// Codec name.
        codec: String,
        /// Fixated output format.
        format: String,
    },
}

impl NegotiationError {
    /// Create an "invalid caps" error.
    pub fn invalid_caps(codec: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCaps {
            codec: codec.into(),
            reason: reason.into(),
        }
    }

    /// Create a "no common format" error from both sides' caps.
    pub fn no_common_format(
        codec: impl Into<String>,
        allowed: &impl std::fmt::Display,
        derived: &impl std::fmt::Display,
    ) -> Self {
        Self::NoCommonFormat {
            codec: codec.into(),
            allowed: allowed.to_string(),
            derived: derived.to_string(),
        }
    }

    /// Codec name this error refers to.
    pub fn codec(&self) -> &str {
        match self {
            Self::InvalidCaps { codec, .. }
            | Self::Rejected { codec, .. }
            | Self::FormatMismatch { codec, .. }
            | Self::UnsupportedCodec { codec }
            | Self::NoCommonFormat { codec, .. }
            | Self::DownstreamRejected { codec, .. } => codec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mismatch_message() {
        let err = NegotiationError::FormatMismatch {
            codec: "mpeg4".into(),
            requested: PixelFormat::Rgb24,
            chosen: Some(PixelFormat::I420),
        };
        assert_eq!(
            err.to_string(),
            "mpeg4: requested pixel format rgb24 but engine chose i420"
        );
    }

    #[test]
    fn test_no_common_format_message() {
        let err = NegotiationError::no_common_format("mp2", &"EMPTY", &"audio/mp2");
        let msg = err.to_string();
        assert!(msg.contains("downstream accepts: EMPTY"));
        assert!(msg.contains("encoder produces: audio/mp2"));
        assert_eq!(err.codec(), "mp2");
    }
}
