//! Media format and capabilities types.
//!
//! This module provides type-safe media format descriptions for buffers
//! and element capabilities (caps) for format negotiation.
//!
//! # Caps Negotiation
//!
//! The caps system supports constraint-based negotiation:
//!
//! - [`CapsValue<T>`]: A value that can be fixed, range, list, or any
//! - [`VideoFormatCaps`] / [`AudioFormatCaps`]: raw formats with constraints
//! - [`EncodedVideoCaps`] / [`EncodedAudioCaps`]: compressed streams with constraints
//! - [`Caps`]: an ordered list of structures, first is preferred
//!
//! ```rust,ignore
//! use avenc::format::{Caps, CapsValue, VideoFormatCaps, PixelFormat};
//!
//! // Element accepts I420 at any size up to 1080p
//! let caps = Caps::new(VideoFormatCaps {
//!     pixel_format: CapsValue::Fixed(PixelFormat::I420),
//!     ..VideoFormatCaps::any()
//! }.with_size_range(16, 1920, 16, 1080));
//!
//! // Find common ground with another element, keeping our preference order
//! let common = caps.intersect(&other_caps);
//! let fixed = common.fixate();
//! ```

use smallvec::SmallVec;
use std::fmt;

// ============================================================================
// CapsValue - constraint value for negotiation
// ============================================================================

/// A value that can be fixed, range, list, or any.
///
/// Used in caps negotiation to express constraints on format parameters.
/// Supports intersection (finding common ground) and fixation (choosing a value).
///
/// # Examples
///
/// ```rust
/// use avenc::format::CapsValue;
///
/// let fixed: CapsValue<u32> = CapsValue::Fixed(352);
/// let range: CapsValue<u32> = CapsValue::Range { min: 16, max: 4096 };
/// let list: CapsValue<u32> = CapsValue::List(vec![1920, 1280, 720]);
///
/// assert_eq!(fixed.intersect(&range), Some(CapsValue::Fixed(352)));
/// assert_eq!(list.intersect(&CapsValue::Any), Some(list.clone()));
/// ```
#[derive(Clone, Debug, PartialEq, Default)]
pub enum CapsValue<T> {
    /// Exact value (fully constrained).
    Fixed(T),
    /// Range of acceptable values (inclusive).
    Range {
        /// Minimum acceptable value.
        min: T,
        /// Maximum acceptable value.
        max: T,
    },
    /// List of acceptable values (ordered by preference, first is best).
    List(Vec<T>),
    /// Any value accepted (unconstrained).
    #[default]
    Any,
}

impl<T: Clone + Ord> CapsValue<T> {
    /// Check if a value is accepted by this constraint.
    pub fn accepts(&self, value: &T) -> bool {
        match self {
            Self::Fixed(v) => v == value,
            Self::Range { min, max } => value >= min && value <= max,
            Self::List(values) => values.contains(value),
            Self::Any => true,
        }
    }

    /// Intersect two constraints, finding common values.
    ///
    /// Lists keep the order of `self`. Returns `None` if there's no overlap.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Any, other) => Some(other.clone()),
            (this, Self::Any) => Some(this.clone()),

            (Self::Fixed(v), constraint) | (constraint, Self::Fixed(v)) => {
                constraint.accepts(v).then(|| Self::Fixed(v.clone()))
            }

            (
                Self::Range {
                    min: min1,
                    max: max1,
                },
                Self::Range {
                    min: min2,
                    max: max2,
                },
            ) => {
                let lo = min1.max(min2);
                let hi = max1.min(max2);
                if lo > hi {
                    None
                } else if lo == hi {
                    Some(Self::Fixed(lo.clone()))
                } else {
                    Some(Self::Range {
                        min: lo.clone(),
                        max: hi.clone(),
                    })
                }
            }

            (Self::List(list), constraint @ Self::Range { .. })
            | (constraint @ Self::Range { .. }, Self::List(list))
            | (Self::List(list), constraint @ Self::List(_)) => {
                Self::from_candidates(list.iter().filter(|v| constraint.accepts(v)).cloned())
            }
        }
    }

    fn from_candidates(candidates: impl Iterator<Item = T>) -> Option<Self> {
        let mut values: Vec<T> = candidates.collect();
        match values.len() {
            0 => None,
            1 => values.pop().map(Self::Fixed),
            _ => Some(Self::List(values)),
        }
    }

    /// Fixate: choose a single value from the constraint.
    ///
    /// Returns the preferred value (first in list, min in range).
    /// Returns `None` for `Any` (cannot fixate without default).
    pub fn fixate(&self) -> Option<T> {
        match self {
            Self::Fixed(v) => Some(v.clone()),
            Self::Range { min, .. } => Some(min.clone()),
            Self::List(values) => values.first().cloned(),
            Self::Any => None,
        }
    }

    /// Fixate with a default value for `Any`.
    ///
    /// A default outside a range or list is clamped to the nearest accepted
    /// value rather than ignored.
    pub fn fixate_with_default(&self, default: T) -> T {
        match self {
            Self::Any => default,
            Self::Range { min, max } => default.max(min.clone()).min(max.clone()),
            Self::List(values) if values.contains(&default) => default,
            _ => self.fixate().unwrap_or(default),
        }
    }

    /// Check if this is a fixed value.
    #[inline]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }

    /// Check if this accepts any value.
    #[inline]
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }

    /// Get the fixed value if this is fixed.
    #[inline]
    pub fn as_fixed(&self) -> Option<&T> {
        match self {
            Self::Fixed(v) => Some(v),
            _ => None,
        }
    }
}

impl<T: Clone + Ord> From<T> for CapsValue<T> {
    fn from(value: T) -> Self {
        Self::Fixed(value)
    }
}

impl<T: Clone + Ord> From<std::ops::RangeInclusive<T>> for CapsValue<T> {
    fn from(range: std::ops::RangeInclusive<T>) -> Self {
        let (min, max) = range.into_inner();
        Self::Range { min, max }
    }
}

impl<T: fmt::Debug> fmt::Display for CapsValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(v) => write!(f, "{:?}", v),
            Self::Range { min, max } => write!(f, "[ {:?}, {:?} ]", min, max),
            Self::List(values) => write!(f, "{{ {:?} }}", values),
            Self::Any => write!(f, "ANY"),
        }
    }
}

// ============================================================================
// Media Formats
// ============================================================================

/// Broad media kind of an encoder variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Video frames.
    Video,
    /// Audio samples.
    Audio,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// Media format - describes buffer contents.
///
/// A fixed (fully concrete) format. Produced by fixating [`Caps`], consumed by
/// the encoder session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaFormat {
    /// Raw video frames (uncompressed).
    VideoRaw(VideoFormat),
    /// Encoded video (compressed).
    Video(EncodedVideoFormat),
    /// Raw audio samples (uncompressed).
    AudioRaw(AudioFormat),
    /// Encoded audio (compressed).
    Audio(EncodedAudioFormat),
}

impl MediaFormat {
    /// The media kind of this format.
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::VideoRaw(_) | Self::Video(_) => MediaKind::Video,
            Self::AudioRaw(_) | Self::Audio(_) => MediaKind::Audio,
        }
    }

    /// Whether this format describes uncompressed data.
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::VideoRaw(_) | Self::AudioRaw(_))
    }

    /// Get the buffer size in bytes for one raw video frame.
    ///
    /// Returns `None` for audio and for encoded formats.
    pub fn buffer_size(&self) -> Option<usize> {
        match self {
            Self::VideoRaw(vf) => Some(vf.frame_size()),
            _ => None,
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VideoRaw(v) => write!(
                f,
                "video/raw {} {}x{} @ {}",
                v.pixel_format, v.width, v.height, v.framerate
            ),
            Self::Video(v) => write!(
                f,
                "video/{} {}x{} @ {}",
                v.codec, v.width, v.height, v.framerate
            ),
            Self::AudioRaw(a) => write!(
                f,
                "audio/raw {:?} {} Hz x{}",
                a.sample_format, a.sample_rate, a.channels
            ),
            Self::Audio(a) => write!(f, "audio/{} {} Hz x{}", a.codec, a.sample_rate, a.channels),
        }
    }
}

impl From<VideoFormat> for MediaFormat {
    fn from(format: VideoFormat) -> Self {
        Self::VideoRaw(format)
    }
}

impl From<AudioFormat> for MediaFormat {
    fn from(format: AudioFormat) -> Self {
        Self::AudioRaw(format)
    }
}

// ============================================================================
// Video Formats
// ============================================================================

/// Raw video format (16 bytes, Copy).
///
/// Describes uncompressed video frames with resolution, pixel format, and framerate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct VideoFormat {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format (color space and layout).
    pub pixel_format: PixelFormat,
    /// Frame rate.
    pub framerate: Framerate,
}

impl VideoFormat {
    /// Create a new video format.
    pub const fn new(
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        framerate: Framerate,
    ) -> Self {
        Self {
            width,
            height,
            pixel_format,
            framerate,
        }
    }

    /// Calculate the frame size in bytes for this format.
    pub fn frame_size(&self) -> usize {
        self.pixel_format.picture_size(self.width, self.height)
    }
}

/// Row layout of one plane in a tightly packed picture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Bytes per row.
    pub row_bytes: usize,
    /// Number of rows.
    pub rows: usize,
}

impl PlaneLayout {
    /// Total bytes in this plane.
    pub const fn size(&self) -> usize {
        self.row_bytes * self.rows
    }
}

/// Pixel formats (color space and memory layout).
///
/// The set is bounded: [`PixelFormat::ALL`] lists every value, in the order
/// format probing tries them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[repr(u8)]
pub enum PixelFormat {
    // ========================================================================
    // YUV 4:2:0 formats (most common)
    // ========================================================================
    /// YUV 4:2:0 planar (Y plane, then U plane, then V plane).
    #[default]
    I420 = 0,
    /// YUV 4:2:0 semi-planar (Y plane, then interleaved UV plane).
    Nv12,
    /// YUV 4:2:0 planar, 10-bit little endian.
    I420_10Le,
    /// YUV 4:2:0 semi-planar, 10-bit.
    P010,

    // ========================================================================
    // YUV 4:2:2 formats
    // ========================================================================
    /// YUV 4:2:2 planar.
    I422,
    /// YUV 4:2:2 packed (Y0 U Y1 V).
    Yuyv,
    /// YUV 4:2:2 packed (U Y0 V Y1).
    Uyvy,

    // ========================================================================
    // YUV 4:4:4 formats
    // ========================================================================
    /// YUV 4:4:4 planar.
    I444,

    // ========================================================================
    // RGB formats
    // ========================================================================
    /// RGB 8-bit per channel, packed (24 bits/pixel).
    Rgb24,
    /// RGBA 8-bit per channel, packed (32 bits/pixel).
    Rgba,
    /// BGR 8-bit per channel, packed (24 bits/pixel).
    Bgr24,
    /// BGRA 8-bit per channel, packed (32 bits/pixel).
    Bgra,
    /// ARGB 8-bit per channel, packed (32 bits/pixel).
    Argb,

    // ========================================================================
    // Grayscale formats
    // ========================================================================
    /// 8-bit grayscale.
    Gray8,
    /// 16-bit grayscale little endian.
    Gray16Le,
}

impl PixelFormat {
    /// Every pixel format, in probing order.
    pub const ALL: [PixelFormat; 15] = [
        Self::I420,
        Self::Nv12,
        Self::I420_10Le,
        Self::P010,
        Self::I422,
        Self::Yuyv,
        Self::Uyvy,
        Self::I444,
        Self::Rgb24,
        Self::Rgba,
        Self::Bgr24,
        Self::Bgra,
        Self::Argb,
        Self::Gray8,
        Self::Gray16Le,
    ];

    /// Short lowercase name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::I420 => "i420",
            Self::Nv12 => "nv12",
            Self::I420_10Le => "i420_10le",
            Self::P010 => "p010",
            Self::I422 => "i422",
            Self::Yuyv => "yuyv",
            Self::Uyvy => "uyvy",
            Self::I444 => "i444",
            Self::Rgb24 => "rgb24",
            Self::Rgba => "rgba",
            Self::Bgr24 => "bgr24",
            Self::Bgra => "bgra",
            Self::Argb => "argb",
            Self::Gray8 => "gray8",
            Self::Gray16Le => "gray16le",
        }
    }

    /// Plane layout of a tightly packed picture (no row padding).
    ///
    /// Subsampled chroma dimensions round up, so odd sizes keep their last
    /// column and row.
    pub fn planes(&self, width: u32, height: u32) -> SmallVec<[PlaneLayout; 3]> {
        let w = width as usize;
        let h = height as usize;
        let half_w = w.div_ceil(2);
        let half_h = h.div_ceil(2);
        let plane = |row_bytes, rows| PlaneLayout { row_bytes, rows };

        match self {
            Self::I420 => {
                smallvec::smallvec![plane(w, h), plane(half_w, half_h), plane(half_w, half_h)]
            }
            Self::I420_10Le => smallvec::smallvec![
                plane(w * 2, h),
                plane(half_w * 2, half_h),
                plane(half_w * 2, half_h)
            ],
            Self::Nv12 => smallvec::smallvec![plane(w, h), plane(half_w * 2, half_h)],
            Self::P010 => smallvec::smallvec![plane(w * 2, h), plane(half_w * 4, half_h)],
            Self::I422 => smallvec::smallvec![plane(w, h), plane(half_w, h), plane(half_w, h)],
            Self::Yuyv | Self::Uyvy => smallvec::smallvec![plane(half_w * 4, h)],
            Self::I444 => smallvec::smallvec![plane(w, h), plane(w, h), plane(w, h)],
            Self::Rgb24 | Self::Bgr24 => smallvec::smallvec![plane(w * 3, h)],
            Self::Rgba | Self::Bgra | Self::Argb => smallvec::smallvec![plane(w * 4, h)],
            Self::Gray8 => smallvec::smallvec![plane(w, h)],
            Self::Gray16Le => smallvec::smallvec![plane(w * 2, h)],
        }
    }

    /// Size in bytes of one tightly packed picture.
    pub fn picture_size(&self, width: u32, height: u32) -> usize {
        self.planes(width, height).iter().map(PlaneLayout::size).sum()
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Frame rate as numerator/denominator (8 bytes, Copy).
///
/// Using a fraction allows exact representation of common framerates
/// like 29.97 fps (30000/1001) and 23.976 fps (24000/1001).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Framerate {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (time units).
    pub den: u32,
}

impl Framerate {
    /// Create a new framerate.
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// 25 fps (PAL).
    pub const FPS_25: Self = Self::new(25, 1);
    /// 30 fps.
    pub const FPS_30: Self = Self::new(30, 1);
    /// 29.97 fps (NTSC).
    pub const FPS_29_97: Self = Self::new(30000, 1001);

    /// Get the framerate as a floating-point value.
    #[inline]
    pub fn fps(&self) -> f64 {
        self.num as f64 / self.den.max(1) as f64
    }

    /// Get frame duration in nanoseconds.
    #[inline]
    pub const fn frame_duration_ns(&self) -> u64 {
        if self.num == 0 {
            return 0;
        }
        (self.den as u64 * 1_000_000_000) / self.num as u64
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self::FPS_25
    }
}

impl PartialOrd for Framerate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Framerate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Compare as fractions: a/b vs c/d => a*d vs c*b
        let lhs = (self.num as u64) * (other.den as u64);
        let rhs = (other.num as u64) * (self.den as u64);
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for Framerate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Video codecs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum VideoCodec {
    /// MPEG-1 video.
    Mpeg1,
    /// MPEG-2 video.
    Mpeg2,
    /// MPEG-4 part 2.
    Mpeg4,
    /// Microsoft MPEG-4 variant.
    MsMpeg4,
    /// H.263.
    H263,
    /// H.263+ (1998).
    H263p,
    /// Sorenson Spark / FLV.
    Flv1,
    /// Windows Media Video 2.
    Wmv2,
    /// Motion JPEG.
    Mjpeg,
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    H265,
    /// VP8.
    Vp8,
    /// VP9.
    Vp9,
    /// AV1.
    Av1,
    /// Theora.
    Theora,
}

impl VideoCodec {
    /// Short lowercase name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Mpeg1 => "mpeg1",
            Self::Mpeg2 => "mpeg2",
            Self::Mpeg4 => "mpeg4",
            Self::MsMpeg4 => "msmpeg4",
            Self::H263 => "h263",
            Self::H263p => "h263p",
            Self::Flv1 => "flv1",
            Self::Wmv2 => "wmv2",
            Self::Mjpeg => "mjpeg",
            Self::H264 => "h264",
            Self::H265 => "h265",
            Self::Vp8 => "vp8",
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
            Self::Theora => "theora",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Encoded video stream format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EncodedVideoFormat {
    /// Codec identity.
    pub codec: VideoCodec,
    /// Coded width in pixels.
    pub width: u32,
    /// Coded height in pixels.
    pub height: u32,
    /// Frame rate.
    pub framerate: Framerate,
}

// ============================================================================
// Audio Formats
// ============================================================================

/// Raw audio format (8 bytes, Copy).
///
/// Describes uncompressed interleaved audio samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct AudioFormat {
    /// Sample rate in Hz (e.g., 44100, 48000).
    pub sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo).
    pub channels: u16,
    /// Sample format (bit depth and type).
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    /// Create a new audio format.
    pub const fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
        }
    }

    /// CD quality: 44100 Hz, stereo, 16-bit signed.
    pub const CD_QUALITY: Self = Self::new(44100, 2, SampleFormat::S16);

    /// Get bytes per sample (for one channel).
    pub const fn bytes_per_sample(&self) -> usize {
        self.sample_format.bytes()
    }

    /// Get bytes per frame (all channels for one sample time).
    pub const fn bytes_per_frame(&self) -> usize {
        self.sample_format.bytes() * self.channels as usize
    }

    /// Bytes per second of audio in this format.
    pub const fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.bytes_per_frame() as u64
    }
}

/// Audio sample formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[repr(u8)]
pub enum SampleFormat {
    /// Signed 16-bit integer, native endian.
    #[default]
    S16 = 0,
    /// Signed 32-bit integer.
    S32,
    /// 32-bit floating point.
    F32,
    /// Unsigned 8-bit integer.
    U8,
}

impl SampleFormat {
    /// Get bytes per sample.
    pub const fn bytes(&self) -> usize {
        match self {
            Self::S16 => 2,
            Self::S32 | Self::F32 => 4,
            Self::U8 => 1,
        }
    }
}

/// Audio codecs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum AudioCodec {
    /// MPEG-1 layer II.
    Mp2,
    /// MPEG-1 layer III.
    Mp3,
    /// AAC.
    Aac,
    /// Dolby AC-3.
    Ac3,
    /// Vorbis.
    Vorbis,
    /// Opus.
    Opus,
    /// FLAC.
    Flac,
    /// AMR narrowband.
    AmrNb,
}

impl AudioCodec {
    /// Short lowercase name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Mp2 => "mp2",
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Ac3 => "ac3",
            Self::Vorbis => "vorbis",
            Self::Opus => "opus",
            Self::Flac => "flac",
            Self::AmrNb => "amr-nb",
        }
    }
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Encoded audio stream format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EncodedAudioFormat {
    /// Codec identity.
    pub codec: AudioCodec,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels.
    pub channels: u16,
}

// ============================================================================
// Format Caps - constraint-based format negotiation
// ============================================================================

/// Video format with constraints for negotiation.
///
/// Each field can be fixed, a range, a list of options, or any value.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoFormatCaps {
    /// Width constraint.
    pub width: CapsValue<u32>,
    /// Height constraint.
    pub height: CapsValue<u32>,
    /// Pixel format constraint.
    pub pixel_format: CapsValue<PixelFormat>,
    /// Framerate constraint.
    pub framerate: CapsValue<Framerate>,
}

impl VideoFormatCaps {
    /// Create caps that accept any video format.
    pub fn any() -> Self {
        Self {
            width: CapsValue::Any,
            height: CapsValue::Any,
            pixel_format: CapsValue::Any,
            framerate: CapsValue::Any,
        }
    }

    /// Create caps for a fixed video format.
    pub fn fixed(format: VideoFormat) -> Self {
        Self {
            width: CapsValue::Fixed(format.width),
            height: CapsValue::Fixed(format.height),
            pixel_format: CapsValue::Fixed(format.pixel_format),
            framerate: CapsValue::Fixed(format.framerate),
        }
    }

    /// Restrict to a single pixel format.
    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = CapsValue::Fixed(pixel_format);
        self
    }

    /// Create caps with a specific size constraint.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = CapsValue::Fixed(width);
        self.height = CapsValue::Fixed(height);
        self
    }

    /// Create caps with a size range.
    pub fn with_size_range(mut self, min_w: u32, max_w: u32, min_h: u32, max_h: u32) -> Self {
        self.width = CapsValue::Range {
            min: min_w,
            max: max_w,
        };
        self.height = CapsValue::Range {
            min: min_h,
            max: max_h,
        };
        self
    }

    /// Create caps with a specific framerate.
    pub fn with_framerate(mut self, framerate: Framerate) -> Self {
        self.framerate = CapsValue::Fixed(framerate);
        self
    }

    /// Intersect with another video caps.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        Some(Self {
            width: self.width.intersect(&other.width)?,
            height: self.height.intersect(&other.height)?,
            pixel_format: self.pixel_format.intersect(&other.pixel_format)?,
            framerate: self.framerate.intersect(&other.framerate)?,
        })
    }

    /// Fixate to a concrete video format.
    pub fn fixate(&self) -> Option<VideoFormat> {
        Some(VideoFormat {
            width: self.width.fixate()?,
            height: self.height.fixate()?,
            pixel_format: self.pixel_format.fixate()?,
            framerate: self.framerate.fixate()?,
        })
    }

    /// Fixate with defaults for unconstrained values: 352x288, I420, 25fps.
    pub fn fixate_with_defaults(&self) -> VideoFormat {
        VideoFormat {
            width: self.width.fixate_with_default(352),
            height: self.height.fixate_with_default(288),
            pixel_format: self.pixel_format.fixate_with_default(PixelFormat::I420),
            framerate: self.framerate.fixate_with_default(Framerate::FPS_25),
        }
    }

    /// Check if fully fixed.
    pub fn is_fixed(&self) -> bool {
        self.width.is_fixed()
            && self.height.is_fixed()
            && self.pixel_format.is_fixed()
            && self.framerate.is_fixed()
    }
}

impl Default for VideoFormatCaps {
    fn default() -> Self {
        Self::any()
    }
}

impl From<VideoFormat> for VideoFormatCaps {
    fn from(format: VideoFormat) -> Self {
        Self::fixed(format)
    }
}

/// Audio format with constraints for negotiation.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFormatCaps {
    /// Sample rate constraint.
    pub sample_rate: CapsValue<u32>,
    /// Number of channels constraint.
    pub channels: CapsValue<u16>,
    /// Sample format constraint.
    pub sample_format: CapsValue<SampleFormat>,
}

impl AudioFormatCaps {
    /// Create caps that accept any audio format.
    pub fn any() -> Self {
        Self {
            sample_rate: CapsValue::Any,
            channels: CapsValue::Any,
            sample_format: CapsValue::Any,
        }
    }

    /// Create caps for a fixed audio format.
    pub fn fixed(format: AudioFormat) -> Self {
        Self {
            sample_rate: CapsValue::Fixed(format.sample_rate),
            channels: CapsValue::Fixed(format.channels),
            sample_format: CapsValue::Fixed(format.sample_format),
        }
    }

    /// Create caps for S16 audio.
    pub fn s16() -> Self {
        Self {
            sample_format: CapsValue::Fixed(SampleFormat::S16),
            ..Self::any()
        }
    }

    /// Create caps with a specific sample rate.
    pub fn with_rate(mut self, rate: u32) -> Self {
        self.sample_rate = CapsValue::Fixed(rate);
        self
    }

    /// Create caps with a specific channel count.
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = CapsValue::Fixed(channels);
        self
    }

    /// Intersect with another audio caps.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        Some(Self {
            sample_rate: self.sample_rate.intersect(&other.sample_rate)?,
            channels: self.channels.intersect(&other.channels)?,
            sample_format: self.sample_format.intersect(&other.sample_format)?,
        })
    }

    /// Fixate to a concrete audio format.
    pub fn fixate(&self) -> Option<AudioFormat> {
        Some(AudioFormat {
            sample_rate: self.sample_rate.fixate()?,
            channels: self.channels.fixate()?,
            sample_format: self.sample_format.fixate()?,
        })
    }

    /// Fixate with defaults for unconstrained values: 44100 Hz, stereo, S16.
    pub fn fixate_with_defaults(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate.fixate_with_default(44100),
            channels: self.channels.fixate_with_default(2),
            sample_format: self.sample_format.fixate_with_default(SampleFormat::S16),
        }
    }

    /// Check if fully fixed.
    pub fn is_fixed(&self) -> bool {
        self.sample_rate.is_fixed() && self.channels.is_fixed() && self.sample_format.is_fixed()
    }
}

impl Default for AudioFormatCaps {
    fn default() -> Self {
        Self::any()
    }
}

impl From<AudioFormat> for AudioFormatCaps {
    fn from(format: AudioFormat) -> Self {
        Self::fixed(format)
    }
}

/// Encoded video stream with constraints. The codec itself is always fixed.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedVideoCaps {
    /// Codec identity.
    pub codec: VideoCodec,
    /// Width constraint.
    pub width: CapsValue<u32>,
    /// Height constraint.
    pub height: CapsValue<u32>,
    /// Framerate constraint.
    pub framerate: CapsValue<Framerate>,
}

impl EncodedVideoCaps {
    /// Caps for a codec with unconstrained stream parameters.
    pub fn any(codec: VideoCodec) -> Self {
        Self {
            codec,
            width: CapsValue::Any,
            height: CapsValue::Any,
            framerate: CapsValue::Any,
        }
    }

    /// Intersect with another encoded video caps.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        if self.codec != other.codec {
            return None;
        }
        Some(Self {
            codec: self.codec,
            width: self.width.intersect(&other.width)?,
            height: self.height.intersect(&other.height)?,
            framerate: self.framerate.intersect(&other.framerate)?,
        })
    }

    /// Fixate with defaults for unconstrained values.
    pub fn fixate_with_defaults(&self) -> EncodedVideoFormat {
        EncodedVideoFormat {
            codec: self.codec,
            width: self.width.fixate_with_default(352),
            height: self.height.fixate_with_default(288),
            framerate: self.framerate.fixate_with_default(Framerate::FPS_25),
        }
    }

    /// Check if fully fixed.
    pub fn is_fixed(&self) -> bool {
        self.width.is_fixed() && self.height.is_fixed() && self.framerate.is_fixed()
    }
}

/// Encoded audio stream with constraints. The codec itself is always fixed.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedAudioCaps {
    /// Codec identity.
    pub codec: AudioCodec,
    /// Sample rate constraint.
    pub sample_rate: CapsValue<u32>,
    /// Number of channels constraint.
    pub channels: CapsValue<u16>,
}

impl EncodedAudioCaps {
    /// Caps for a codec with unconstrained stream parameters.
    pub fn any(codec: AudioCodec) -> Self {
        Self {
            codec,
            sample_rate: CapsValue::Any,
            channels: CapsValue::Any,
        }
    }

    /// Intersect with another encoded audio caps.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        if self.codec != other.codec {
            return None;
        }
        Some(Self {
            codec: self.codec,
            sample_rate: self.sample_rate.intersect(&other.sample_rate)?,
            channels: self.channels.intersect(&other.channels)?,
        })
    }

    /// Fixate with defaults for unconstrained values.
    pub fn fixate_with_defaults(&self) -> EncodedAudioFormat {
        EncodedAudioFormat {
            codec: self.codec,
            sample_rate: self.sample_rate.fixate_with_default(44100),
            channels: self.channels.fixate_with_default(2),
        }
    }

    /// Check if fully fixed.
    pub fn is_fixed(&self) -> bool {
        self.sample_rate.is_fixed() && self.channels.is_fixed()
    }
}

/// Format caps - constraints for any format type.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum FormatCaps {
    /// Raw video with constraints.
    VideoRaw(VideoFormatCaps),
    /// Encoded video with constraints.
    Video(EncodedVideoCaps),
    /// Raw audio with constraints.
    AudioRaw(AudioFormatCaps),
    /// Encoded audio with constraints.
    Audio(EncodedAudioCaps),
    /// Any format.
    #[default]
    Any,
}

impl FormatCaps {
    /// Intersect with another format caps.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Any, other) => Some(other.clone()),
            (this, Self::Any) => Some(this.clone()),
            (Self::VideoRaw(a), Self::VideoRaw(b)) => Some(Self::VideoRaw(a.intersect(b)?)),
            (Self::Video(a), Self::Video(b)) => Some(Self::Video(a.intersect(b)?)),
            (Self::AudioRaw(a), Self::AudioRaw(b)) => Some(Self::AudioRaw(a.intersect(b)?)),
            (Self::Audio(a), Self::Audio(b)) => Some(Self::Audio(a.intersect(b)?)),
            _ => None,
        }
    }

    /// Fixate to a concrete media format.
    ///
    /// Returns `None` when any field is unconstrained.
    pub fn fixate(&self) -> Option<MediaFormat> {
        match self {
            Self::VideoRaw(caps) => Some(MediaFormat::VideoRaw(caps.fixate()?)),
            Self::AudioRaw(caps) => Some(MediaFormat::AudioRaw(caps.fixate()?)),
            Self::Video(caps) if caps.is_fixed() => {
                Some(MediaFormat::Video(caps.fixate_with_defaults()))
            }
            Self::Audio(caps) if caps.is_fixed() => {
                Some(MediaFormat::Audio(caps.fixate_with_defaults()))
            }
            _ => None,
        }
    }

    /// Fixate with defaults for unconstrained values.
    ///
    /// Unlike `fixate()`, this only fails for `Any`, which names no media type.
    pub fn fixate_with_defaults(&self) -> Option<MediaFormat> {
        match self {
            Self::VideoRaw(caps) => Some(MediaFormat::VideoRaw(caps.fixate_with_defaults())),
            Self::Video(caps) => Some(MediaFormat::Video(caps.fixate_with_defaults())),
            Self::AudioRaw(caps) => Some(MediaFormat::AudioRaw(caps.fixate_with_defaults())),
            Self::Audio(caps) => Some(MediaFormat::Audio(caps.fixate_with_defaults())),
            Self::Any => None,
        }
    }

    /// Check if fully fixed.
    pub fn is_fixed(&self) -> bool {
        match self {
            Self::VideoRaw(caps) => caps.is_fixed(),
            Self::Video(caps) => caps.is_fixed(),
            Self::AudioRaw(caps) => caps.is_fixed(),
            Self::Audio(caps) => caps.is_fixed(),
            Self::Any => false,
        }
    }

    /// Media kind, `None` for `Any`.
    pub fn kind(&self) -> Option<MediaKind> {
        match self {
            Self::VideoRaw(_) | Self::Video(_) => Some(MediaKind::Video),
            Self::AudioRaw(_) | Self::Audio(_) => Some(MediaKind::Audio),
            Self::Any => None,
        }
    }
}

impl From<MediaFormat> for FormatCaps {
    fn from(format: MediaFormat) -> Self {
        match format {
            MediaFormat::VideoRaw(v) => Self::VideoRaw(v.into()),
            MediaFormat::Video(v) => Self::Video(EncodedVideoCaps {
                codec: v.codec,
                width: CapsValue::Fixed(v.width),
                height: CapsValue::Fixed(v.height),
                framerate: CapsValue::Fixed(v.framerate),
            }),
            MediaFormat::AudioRaw(a) => Self::AudioRaw(a.into()),
            MediaFormat::Audio(a) => Self::Audio(EncodedAudioCaps {
                codec: a.codec,
                sample_rate: CapsValue::Fixed(a.sample_rate),
                channels: CapsValue::Fixed(a.channels),
            }),
        }
    }
}

impl From<VideoFormatCaps> for FormatCaps {
    fn from(caps: VideoFormatCaps) -> Self {
        Self::VideoRaw(caps)
    }
}

impl From<AudioFormatCaps> for FormatCaps {
    fn from(caps: AudioFormatCaps) -> Self {
        Self::AudioRaw(caps)
    }
}

impl From<EncodedVideoCaps> for FormatCaps {
    fn from(caps: EncodedVideoCaps) -> Self {
        Self::Video(caps)
    }
}

impl From<EncodedAudioCaps> for FormatCaps {
    fn from(caps: EncodedAudioCaps) -> Self {
        Self::Audio(caps)
    }
}

impl fmt::Display for FormatCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VideoRaw(c) => write!(
                f,
                "video/raw, format={}, width={}, height={}, framerate={}",
                c.pixel_format, c.width, c.height, c.framerate
            ),
            Self::Video(c) => write!(
                f,
                "video/{}, width={}, height={}, framerate={}",
                c.codec, c.width, c.height, c.framerate
            ),
            Self::AudioRaw(c) => write!(
                f,
                "audio/raw, format={}, rate={}, channels={}",
                c.sample_format, c.sample_rate, c.channels
            ),
            Self::Audio(c) => write!(
                f,
                "audio/{}, rate={}, channels={}",
                c.codec, c.sample_rate, c.channels
            ),
            Self::Any => write!(f, "ANY"),
        }
    }
}

// ============================================================================
// Caps - ordered list of format structures
// ============================================================================

/// Capabilities: an ordered list of acceptable format structures.
///
/// Order expresses preference; the first structure is the most preferred.
/// An empty list accepts nothing, `Caps::any()` accepts everything.
///
/// # Example
///
/// ```rust
/// use avenc::format::{Caps, VideoFormatCaps, PixelFormat};
///
/// let ours = Caps::many([
///     VideoFormatCaps::any().with_pixel_format(PixelFormat::I420).into(),
///     VideoFormatCaps::any().with_pixel_format(PixelFormat::Nv12).into(),
/// ]);
/// let theirs = Caps::new(VideoFormatCaps::any().with_pixel_format(PixelFormat::Nv12));
///
/// assert_eq!(ours.intersect(&theirs).len(), 1);
/// assert!(ours.intersect(&Caps::empty()).is_empty());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Caps(SmallVec<[FormatCaps; 2]>);

impl Caps {
    /// Caps accepting any format.
    pub fn any() -> Self {
        Self(smallvec::smallvec![FormatCaps::Any])
    }

    /// Caps accepting nothing.
    pub fn empty() -> Self {
        Self(SmallVec::new())
    }

    /// Caps with a single structure.
    pub fn new(structure: impl Into<FormatCaps>) -> Self {
        Self(smallvec::smallvec![structure.into()])
    }

    /// Caps from several structures, in preference order.
    pub fn many(structures: impl IntoIterator<Item = FormatCaps>) -> Self {
        Self(structures.into_iter().collect())
    }

    /// Whether any structure is unconstrained.
    pub fn is_any(&self) -> bool {
        self.0.iter().any(|s| matches!(s, FormatCaps::Any))
    }

    /// Whether no format is accepted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this is a single, fully fixed structure.
    pub fn is_fixed(&self) -> bool {
        self.0.len() == 1 && self.0[0].is_fixed()
    }

    /// Number of structures.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// All structures, in preference order.
    pub fn structures(&self) -> &[FormatCaps] {
        &self.0
    }

    /// Iterate over structures, in preference order.
    pub fn iter(&self) -> impl Iterator<Item = &FormatCaps> {
        self.0.iter()
    }

    /// The preferred structure.
    pub fn first(&self) -> Option<&FormatCaps> {
        self.0.first()
    }

    /// Append a structure, skipping exact duplicates.
    pub fn push(&mut self, structure: impl Into<FormatCaps>) {
        let structure = structure.into();
        if !self.0.contains(&structure) {
            self.0.push(structure);
        }
    }

    /// Append every structure of `other`, skipping exact duplicates.
    pub fn append(&mut self, other: Caps) {
        for structure in other.0 {
            self.push(structure);
        }
    }

    /// Intersect two caps.
    ///
    /// The result keeps the order of `self`: for every structure of `self`,
    /// in order, its intersections with the structures of `other` are
    /// appended.
    pub fn intersect(&self, other: &Caps) -> Caps {
        let mut result = Caps::empty();
        for ours in &self.0 {
            for theirs in &other.0 {
                if let Some(common) = ours.intersect(theirs) {
                    result.push(common);
                }
            }
        }
        result
    }

    /// Whether the intersection with `other` is non-empty.
    pub fn can_intersect(&self, other: &Caps) -> bool {
        self.0
            .iter()
            .any(|ours| other.0.iter().any(|theirs| ours.intersect(theirs).is_some()))
    }

    /// Keep only the first structure.
    pub fn truncate(mut self) -> Caps {
        self.0.truncate(1);
        self
    }

    /// Fixate the first structure, choosing defaults for open fields.
    pub fn fixate(&self) -> Option<MediaFormat> {
        self.first()?.fixate_with_defaults()
    }

    /// Whether a fixed format is accepted by some structure.
    pub fn accepts(&self, format: &MediaFormat) -> bool {
        let candidate = FormatCaps::from(*format);
        self.0.iter().any(|s| s.intersect(&candidate).is_some())
    }
}

impl Default for Caps {
    fn default() -> Self {
        Self::any()
    }
}

impl From<MediaFormat> for Caps {
    fn from(format: MediaFormat) -> Self {
        Self::new(FormatCaps::from(format))
    }
}

impl From<FormatCaps> for Caps {
    fn from(structure: FormatCaps) -> Self {
        Self::new(structure)
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "EMPTY");
        }
        for (i, structure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", structure)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_value_intersect() {
        let range = CapsValue::Range { min: 16u32, max: 4096 };
        assert_eq!(
            range.intersect(&CapsValue::Fixed(352)),
            Some(CapsValue::Fixed(352))
        );
        assert_eq!(range.intersect(&CapsValue::Fixed(8)), None);
        assert_eq!(
            range.intersect(&CapsValue::Range { min: 4096, max: 8192 }),
            Some(CapsValue::Fixed(4096))
        );
        assert_eq!(
            CapsValue::List(vec![720u32, 1080, 5000]).intersect(&range),
            Some(CapsValue::List(vec![720, 1080]))
        );
    }

    #[test]
    fn test_caps_value_list_order() {
        let a = CapsValue::List(vec![3u32, 1, 2]);
        let b = CapsValue::List(vec![2u32, 3]);
        assert_eq!(a.intersect(&b), Some(CapsValue::List(vec![3, 2])));
        assert_eq!(b.intersect(&a), Some(CapsValue::List(vec![2, 3])));
    }

    #[test]
    fn test_fixate_with_default_clamps() {
        let range = CapsValue::Range { min: 8000u32, max: 22050 };
        assert_eq!(range.fixate_with_default(44100), 22050);
        assert_eq!(CapsValue::<u32>::Any.fixate_with_default(44100), 44100);
        assert_eq!(CapsValue::List(vec![1u16, 2]).fixate_with_default(2), 2);
    }

    #[test]
    fn test_picture_size() {
        assert_eq!(PixelFormat::I420.picture_size(352, 288), 352 * 288 * 3 / 2);
        assert_eq!(PixelFormat::Rgba.picture_size(4, 4), 64);
        assert_eq!(PixelFormat::Yuyv.picture_size(4, 2), 16);
        // Odd dimensions round chroma up
        assert_eq!(PixelFormat::I420.picture_size(3, 3), 9 + 2 * 4);
        assert_eq!(PixelFormat::Nv12.planes(3, 3).len(), 2);
    }

    #[test]
    fn test_all_pixel_formats_distinct() {
        let mut seen = std::collections::HashSet::new();
        for format in PixelFormat::ALL {
            assert!(seen.insert(format));
        }
    }

    #[test]
    fn test_format_caps_kind_mismatch() {
        let video = FormatCaps::from(VideoFormatCaps::any());
        let audio = FormatCaps::from(AudioFormatCaps::any());
        assert!(video.intersect(&audio).is_none());
        assert_eq!(video.intersect(&FormatCaps::Any), Some(video.clone()));
    }

    #[test]
    fn test_encoded_caps_codec_must_match() {
        let a = EncodedVideoCaps::any(VideoCodec::Mpeg4);
        let b = EncodedVideoCaps::any(VideoCodec::H263);
        assert!(a.intersect(&b).is_none());
        assert!(a.intersect(&a).is_some());
    }

    #[test]
    fn test_caps_intersect_keeps_first_operand_order() {
        let downstream = Caps::many([
            EncodedVideoCaps::any(VideoCodec::H263).into(),
            EncodedVideoCaps::any(VideoCodec::Mpeg4).into(),
        ]);
        let derived = Caps::many([
            EncodedVideoCaps::any(VideoCodec::Mpeg4).into(),
            EncodedVideoCaps::any(VideoCodec::H263).into(),
        ]);

        let common = downstream.intersect(&derived);
        assert_eq!(common.len(), 2);
        assert!(matches!(
            common.first(),
            Some(FormatCaps::Video(c)) if c.codec == VideoCodec::H263
        ));
    }

    #[test]
    fn test_caps_any_and_empty() {
        let caps = Caps::new(AudioFormatCaps::s16());
        assert_eq!(Caps::any().intersect(&caps), caps);
        assert!(caps.intersect(&Caps::empty()).is_empty());
        assert!(Caps::empty().fixate().is_none());
        assert!(Caps::any().fixate().is_none());
    }

    #[test]
    fn test_caps_fixate_first() {
        let caps = Caps::many([
            VideoFormatCaps::any()
                .with_pixel_format(PixelFormat::Nv12)
                .with_size_range(16, 4096, 16, 4096)
                .into(),
            VideoFormatCaps::any().with_pixel_format(PixelFormat::I420).into(),
        ]);

        match caps.fixate() {
            Some(MediaFormat::VideoRaw(v)) => {
                assert_eq!(v.pixel_format, PixelFormat::Nv12);
                assert_eq!((v.width, v.height), (352, 288));
            }
            other => panic!("unexpected fixation: {:?}", other),
        }
    }

    #[test]
    fn test_caps_accepts() {
        let caps = Caps::new(EncodedAudioCaps::any(AudioCodec::Mp2));
        let ok = MediaFormat::Audio(EncodedAudioFormat {
            codec: AudioCodec::Mp2,
            sample_rate: 44100,
            channels: 2,
        });
        let wrong = MediaFormat::Audio(EncodedAudioFormat {
            codec: AudioCodec::Aac,
            sample_rate: 44100,
            channels: 2,
        });
        assert!(caps.accepts(&ok));
        assert!(!caps.accepts(&wrong));
    }

    #[test]
    fn test_media_format_round_trip_through_caps() {
        let format = MediaFormat::VideoRaw(VideoFormat::new(
            320,
            240,
            PixelFormat::I420,
            Framerate::FPS_30,
        ));
        let caps = Caps::from(format);
        assert!(caps.is_fixed());
        assert_eq!(caps.fixate(), Some(format));
    }
}
