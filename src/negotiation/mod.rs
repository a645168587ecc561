//! Caps negotiation for encoder elements.
//!
//! Negotiation runs once per format change, never per buffer. It has two
//! halves:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ FormatProbe (once per variant, cached)                           │
//! │   trial-open every pixel format -> accepted sink caps            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │ CapabilityNegotiator (once per set_caps)                         │
//! │   1. close the current session                                   │
//! │   2. reset context, apply settings                               │
//! │   3. map offered caps into the context                           │
//! │   4. open, check the pixel format survived                       │
//! │   5. intersect downstream caps with the derived src caps         │
//! │   6. fixate the first candidate, let downstream accept it        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use avenc::config::EncoderSettings;
//! use avenc::engine::EngineFactory;
//! use avenc::engine::testing::ScriptedFactory;
//! use avenc::format::{
//!     Caps, EncodedVideoCaps, MediaKind, PixelFormat, VideoCodec, VideoFormatCaps,
//! };
//! use avenc::negotiation::CapabilityNegotiator;
//! use avenc::session::EncoderSession;
//!
//! let factory = ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4);
//! let template = Caps::new(EncodedVideoCaps::any(VideoCodec::Mpeg4));
//! let mut session = EncoderSession::new(factory.create(), "mpeg4", MediaKind::Video);
//!
//! let offered = Caps::new(
//!     VideoFormatCaps::any().with_pixel_format(PixelFormat::I420).with_size(320, 240),
//! );
//! let negotiated = CapabilityNegotiator::new(factory.descriptor(), &template)
//!     .negotiate(&mut session, &offered, &EncoderSettings::video(), None)
//!     .unwrap();
//!
//! assert!(session.is_open());
//! assert_eq!(negotiated.input.buffer_size(), Some(320 * 240 * 3 / 2));
//! ```

mod error;
mod negotiator;
mod probe;

pub use error::NegotiationError;
pub use negotiator::{
    CapabilityNegotiator, DEFAULT_TIME_BASE, MAX_QDIFF, Negotiated, QMAX, QMIN,
};
pub use probe::{
    CapabilityCache, FormatProbe, PROBE_HEIGHT, PROBE_TIME_BASE, PROBE_WIDTH,
};
