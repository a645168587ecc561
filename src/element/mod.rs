//! Pipeline-facing encoder element.
//!
//! This module defines the element side of the crate:
//!
//! - [`EncoderElement`]: raw media in on `sink`, encoded media out on `src`
//! - [`Downstream`]: whatever consumes the element's output
//! - [`AppSink`]: a [`Downstream`] that collects buffers for application code
//! - [`Pad`] / [`PadTemplate`]: connection points and their caps bounds
//! - [`ElementState`] / [`StateChange`]: the lifecycle the pipeline drives
//!
//! # Design
//!
//! Everything is synchronous and single-threaded per element: every data
//! and control call takes `&mut self`, so negotiation can never re-enter and
//! a buffer can never race a state change. The pipeline decides which thread
//! calls in; the element is `Send` so it can be moved there.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use avenc::buffer::Buffer;
//! use avenc::element::{AppSink, EncoderElement};
//! use avenc::engine::testing::ScriptedFactory;
//! use avenc::flow::FlowReturn;
//! use avenc::format::{Caps, PixelFormat, VideoCodec, VideoFormatCaps};
//! use avenc::metadata::Metadata;
//! use avenc::registry::EncoderVariant;
//!
//! let factory = ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4);
//! let variant = EncoderVariant::from_factory(Arc::new(factory)).unwrap();
//! let mut encoder = EncoderElement::new(Arc::new(variant));
//! let sink = AppSink::new();
//! let output = sink.handle();
//! encoder.link(Box::new(sink));
//!
//! let caps = Caps::new(
//!     VideoFormatCaps::any()
//!         .with_pixel_format(PixelFormat::I420)
//!         .with_size(16, 16),
//! );
//! assert!(encoder.set_caps(&caps));
//!
//! let picture = Buffer::from_vec(vec![0u8; 16 * 16 * 3 / 2], Metadata::new());
//! assert_eq!(encoder.chain(picture).unwrap(), FlowReturn::Ok);
//! assert_eq!(output.queue_len(), 1);
//! ```

mod appsink;
mod encoder;
mod pad;
mod state;

pub use appsink::{AppSink, AppSinkHandle};
pub use encoder::EncoderElement;
pub use pad::{Pad, PadDirection, PadPresence, PadTemplate};
pub use state::{ElementState, StateChange};

use crate::buffer::Buffer;
use crate::flow::FlowReturn;
use crate::format::{Caps, MediaFormat};

/// Consumer of an element's output.
///
/// Only [`push`](Self::push) is required. The other methods default to a
/// consumer that takes any format.
pub trait Downstream: Send {
    /// Hand over one buffer.
    fn push(&mut self, buffer: Buffer) -> FlowReturn;

    /// Formats this consumer accepts, in preference order.
    ///
    /// `None` means the consumer does not say; the encoder then uses its src
    /// template caps. An empty [`Caps`] means nothing is accepted.
    fn allowed_caps(&self) -> Option<Caps> {
        None
    }

    /// Accept or refuse the format the encoder settled on.
    fn accept_caps(&mut self, format: &MediaFormat) -> bool {
        let _ = format;
        true
    }

    /// No more buffers will follow.
    fn end_of_stream(&mut self) {}
}
