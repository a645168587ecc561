//! # avenc
//!
//! Pipeline encoder elements backed by an external codec engine.
//!
//! Every codec the engine can encode is exposed as one encoder element type
//! (`avenc_<codec>`). An element takes raw video pictures or interleaved
//! 16-bit audio on its `sink` pad and pushes encoded units on its `src` pad.
//!
//! ## Features
//!
//! - **Capability probing**: input formats are discovered by trial-opening
//!   the engine once per element type, then cached
//! - **Caps negotiation**: input format in, downstream-acceptable output out
//! - **Audio reassembly**: arbitrarily sized audio buffers are re-cut into
//!   exact codec frames with proportional timestamps
//! - **Pluggable engines**: FFmpeg behind the `ffmpeg` feature, a scripted
//!   engine for tests
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use avenc::prelude::*;
//! use avenc::engine::testing::ScriptedFactory;
//! use avenc::format::{AudioCodec, AudioFormatCaps};
//!
//! let mut registry = EncoderRegistry::new();
//! registry.register(Arc::new(ScriptedFactory::audio("mp2", AudioCodec::Mp2)));
//!
//! let mut encoder = registry.make("avenc_mp2")?;
//! let sink = AppSink::new();
//! let output = sink.handle();
//! encoder.link(Box::new(sink));
//! encoder.set_state(ElementState::Paused);
//!
//! assert!(encoder.set_caps(&Caps::new(AudioFormatCaps::s16().with_rate(44100).with_channels(2))));
//! encoder.chain(Buffer::from_vec(vec![0u8; 4608], Metadata::new()))?;
//! assert_eq!(output.queue_len(), 1);
//! # Ok::<(), avenc::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod buffer;
pub mod clock;
pub mod codecmap;
pub mod config;
pub mod element;
pub mod engine;
pub mod error;
pub mod flow;
pub mod format;
pub mod metadata;
pub mod negotiation;
pub mod reassembly;
pub mod registry;
pub mod session;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::Buffer;
    pub use crate::clock::ClockTime;
    pub use crate::config::{EncoderSettings, MotionEstimation, PropertyValue};
    pub use crate::element::{AppSink, Downstream, ElementState, EncoderElement, StateChange};
    pub use crate::engine::{CodecEngine, EngineFactory};
    pub use crate::error::{Error, Result};
    pub use crate::flow::FlowReturn;
    pub use crate::format::{Caps, MediaFormat, MediaKind, PixelFormat};
    pub use crate::metadata::Metadata;
    pub use crate::registry::{EncoderRegistry, EncoderVariant};
}

pub use error::{Error, Result};
