//! Codec engine abstraction.
//!
//! The element never encodes anything itself. It drives an external engine
//! through two traits:
//!
//! - [`EngineFactory`] - one per encoder variant; describes the codec and
//!   creates engine instances (including throwaway instances for probing)
//! - [`CodecEngine`] - one opened (or openable) encoder instance
//!
//! The engine is configured through an [`EngineContext`], a plain struct of
//! engine-native fields. Opening may rewrite some of them: an engine that
//! cannot use the requested pixel format may substitute another one, and
//! audio engines report how many samples they consume per frame.
//!
//! # Example: Implementing CodecEngine
//!
//! ```rust,ignore
//! impl CodecEngine for MyEngine {
//!     fn open(&mut self, ctx: &mut EngineContext, quiet: bool) -> Result<(), EngineError> {
//!         // Validate and apply ctx, set ctx.frame_size for audio
//!     }
//!
//!     fn encode_video(&mut self, picture: &Picture<'_>, out: &mut [u8])
//!         -> Result<Option<EncodedUnit>, EngineError> {
//!         // Write at most out.len() bytes, report the size
//!     }
//!     // ...
//! }
//! ```

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod testing;

use crate::clock::TimeBase;
use crate::config::MotionEstimation;
use crate::format::{AudioCodec, MediaKind, PixelFormat, SampleFormat, VideoCodec};
use thiserror::Error;

/// Error reported by a codec engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine refused to open with the given configuration.
    #[error("failed to open encoder: {0}")]
    Open(String),

    /// A requested parameter is not supported by this engine.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// An encode call was made on an engine that is not open.
    #[error("engine is not open")]
    NotOpen,

    /// The engine failed to encode one unit.
    #[error("encode failed with code {code}")]
    Encode {
        /// Engine-specific error code.
        code: i32,
    },

    /// The encoded unit does not fit into the output buffer.
    #[error("encoded unit of {needed} bytes exceeds output capacity of {capacity} bytes")]
    OutputTooSmall {
        /// Bytes the engine produced.
        needed: usize,
        /// Bytes available.
        capacity: usize,
    },

    /// Backend-specific failure.
    #[error("{0}")]
    Backend(String),
}

// ============================================================================
// Codec identity
// ============================================================================

/// Codec identity as reported by an engine.
///
/// Besides real codecs, engines expose pseudo-codecs (raw video, zlib,
/// PCM) that are not worth wrapping in an encoder element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CodecId {
    /// A video codec with a caps mapping.
    Video(VideoCodec),
    /// An audio codec with a caps mapping.
    Audio(AudioCodec),
    /// Uncompressed video passthrough.
    RawVideo,
    /// Generic zlib compression.
    Zlib,
    /// Any PCM sample layout.
    Pcm,
    /// A real codec that has no caps mapping.
    Unmapped(MediaKind),
}

impl CodecId {
    /// Media kind this codec consumes.
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Video(_) | Self::RawVideo | Self::Zlib => MediaKind::Video,
            Self::Audio(_) | Self::Pcm => MediaKind::Audio,
            Self::Unmapped(kind) => *kind,
        }
    }

    /// Whether this is a pseudo-codec.
    pub fn is_quasi(&self) -> bool {
        matches!(self, Self::RawVideo | Self::Zlib | Self::Pcm)
    }
}

/// Static description of an engine's codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecDescriptor {
    /// Short codec name, used in element names (`avenc_<name>`).
    pub name: String,
    /// Human-readable codec name.
    pub long_name: String,
    /// Codec identity.
    pub id: CodecId,
    /// Whether the engine can encode with this codec.
    pub can_encode: bool,
}

impl CodecDescriptor {
    /// Describe an encodable codec.
    pub fn new(name: impl Into<String>, id: CodecId) -> Self {
        let name = name.into();
        Self {
            long_name: name.clone(),
            name,
            id,
            can_encode: true,
        }
    }

    /// Set the human-readable name.
    pub fn with_long_name(mut self, long_name: impl Into<String>) -> Self {
        self.long_name = long_name.into();
        self
    }

    /// Mark as decode-only.
    pub fn decode_only(mut self) -> Self {
        self.can_encode = false;
        self
    }

    /// Media kind this codec consumes.
    pub fn kind(&self) -> MediaKind {
        self.id.kind()
    }
}

// ============================================================================
// EngineContext
// ============================================================================

/// Engine-native configuration.
///
/// `Default` yields the engine defaults that every negotiation starts from.
/// Fields the negotiator does not set keep these values.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineContext {
    /// Target bitrate in bits per second.
    pub bit_rate: u64,
    /// Allowed deviation from the target bitrate.
    pub bit_rate_tolerance: u64,
    /// Frames between key frames.
    pub gop_size: u32,
    /// Motion-estimation method.
    pub me_method: MotionEstimation,
    /// Payload-segmented output mode.
    pub rtp_mode: bool,
    /// Packet size for payload-segmented mode.
    pub rtp_payload_size: u32,
    /// Minimum quantizer.
    pub qmin: u32,
    /// Maximum quantizer.
    pub qmax: u32,
    /// Maximum quantizer difference between frames.
    pub max_qdiff: u32,
    /// Standards compliance level; negative values allow experimental features.
    pub strict_std_compliance: i32,
    /// Picture width.
    pub width: u32,
    /// Picture height.
    pub height: u32,
    /// Input pixel format.
    pub pix_fmt: Option<PixelFormat>,
    /// Tick unit for timestamps (`1/fps` for video).
    pub time_base: Option<TimeBase>,
    /// Audio sample rate.
    pub sample_rate: u32,
    /// Audio channel count.
    pub channels: u16,
    /// Audio sample format.
    pub sample_fmt: SampleFormat,
    /// Samples per channel in one audio frame; set by the engine on open.
    pub frame_size: usize,
}

impl Default for EngineContext {
    fn default() -> Self {
        Self {
            bit_rate: 200_000,
            bit_rate_tolerance: 4_000_000,
            gop_size: 12,
            me_method: MotionEstimation::Epzs,
            rtp_mode: false,
            rtp_payload_size: 0,
            qmin: 2,
            qmax: 31,
            max_qdiff: 3,
            strict_std_compliance: 0,
            width: 0,
            height: 0,
            pix_fmt: None,
            time_base: None,
            sample_rate: 0,
            channels: 0,
            sample_fmt: SampleFormat::S16,
            frame_size: 0,
        }
    }
}

impl EngineContext {
    /// Compliance level that allows experimental and non-standard features.
    pub const STRICT_EXPERIMENTAL: i32 = -1;

    /// Reset every field to engine defaults.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Size in bytes of one input picture, if the video fields are set.
    pub fn picture_size(&self) -> Option<usize> {
        let format = self.pix_fmt?;
        (self.width > 0 && self.height > 0).then(|| format.picture_size(self.width, self.height))
    }

    /// Size in bytes of one interleaved 16-bit audio frame.
    pub fn audio_frame_bytes(&self) -> usize {
        self.frame_size * self.channels as usize * 2
    }

    /// Bytes per second of 16-bit interleaved input audio.
    pub fn audio_byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64 * 2
    }
}

// ============================================================================
// Engine traits
// ============================================================================

/// One raw picture handed to the engine.
#[derive(Clone, Copy, Debug)]
pub struct Picture<'a> {
    /// Tightly packed planes, in [`PixelFormat::planes`] order.
    pub data: &'a [u8],
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: PixelFormat,
    /// Presentation time in context time-base ticks.
    pub pts: Option<i64>,
}

/// One frame of interleaved 16-bit samples handed to the engine.
#[derive(Clone, Copy, Debug)]
pub struct AudioSamples<'a> {
    /// Interleaved sample bytes.
    pub data: &'a [u8],
    /// Channel count.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Presentation time in samples.
    pub pts: Option<i64>,
}

impl AudioSamples<'_> {
    /// Samples per channel.
    pub fn samples(&self) -> usize {
        self.data.len() / (self.channels.max(1) as usize * 2)
    }
}

/// Result of one successful encode call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodedUnit {
    /// Bytes written to the output buffer.
    pub size: usize,
    /// Whether the unit can be decoded on its own.
    pub key_frame: bool,
}

/// An encoder instance.
///
/// Calls are synchronous. An engine is opened at most once at a time;
/// [`close`](Self::close) must tolerate being called on a closed engine.
pub trait CodecEngine: Send {
    /// Open the engine with the given configuration.
    ///
    /// The engine may rewrite fields of `context` to the values it actually
    /// uses. With `quiet` set the engine must not emit its own diagnostics.
    fn open(&mut self, context: &mut EngineContext, quiet: bool) -> Result<(), EngineError>;

    /// Release the opened configuration.
    fn close(&mut self);

    /// Encode one picture into `output`.
    ///
    /// Returns `Ok(None)` when the engine holds the picture back (delay).
    /// At most one unit is returned per call and the caller stamps it with
    /// this picture's timing. Units produced beyond that stay queued in the
    /// engine for later calls and [`flush`](Self::flush).
    fn encode_video(
        &mut self,
        picture: &Picture<'_>,
        output: &mut [u8],
    ) -> Result<Option<EncodedUnit>, EngineError>;

    /// Encode one audio frame into `output`.
    fn encode_audio(
        &mut self,
        samples: &AudioSamples<'_>,
        output: &mut [u8],
    ) -> Result<Option<EncodedUnit>, EngineError>;

    /// Retrieve one delayed unit at end of stream.
    ///
    /// Returns `Ok(None)` once nothing is left.
    fn flush(&mut self, output: &mut [u8]) -> Result<Option<EncodedUnit>, EngineError> {
        let _ = output;
        Ok(None)
    }
}

/// Creates engines for one codec.
pub trait EngineFactory: Send + Sync {
    /// The codec this factory encodes.
    fn descriptor(&self) -> &CodecDescriptor;

    /// Create a new, closed engine.
    fn create(&self) -> Box<dyn CodecEngine>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_id_kind() {
        assert_eq!(CodecId::Video(VideoCodec::Mpeg4).kind(), MediaKind::Video);
        assert_eq!(CodecId::Pcm.kind(), MediaKind::Audio);
        assert_eq!(CodecId::Zlib.kind(), MediaKind::Video);
        assert!(CodecId::RawVideo.is_quasi());
        assert!(!CodecId::Unmapped(MediaKind::Audio).is_quasi());
    }

    #[test]
    fn test_context_reset() {
        let mut ctx = EngineContext {
            width: 640,
            height: 480,
            pix_fmt: Some(PixelFormat::Rgb24),
            ..Default::default()
        };
        ctx.reset();
        assert_eq!(ctx, EngineContext::default());
    }

    #[test]
    fn test_context_sizes() {
        let ctx = EngineContext {
            width: 352,
            height: 288,
            pix_fmt: Some(PixelFormat::I420),
            ..Default::default()
        };
        assert_eq!(ctx.picture_size(), Some(152_064));
        assert_eq!(EngineContext::default().picture_size(), None);

        let audio = EngineContext {
            sample_rate: 44100,
            channels: 2,
            frame_size: 1152,
            ..Default::default()
        };
        assert_eq!(audio.audio_frame_bytes(), 4608);
        assert_eq!(audio.audio_byte_rate(), 176_400);
    }

    #[test]
    fn test_audio_samples_count() {
        let data = [0u8; 16];
        let samples = AudioSamples {
            data: &data,
            channels: 2,
            sample_rate: 8000,
            pts: None,
        };
        assert_eq!(samples.samples(), 4);
    }
}
