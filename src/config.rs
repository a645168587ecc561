//! Encoder settings and the string-keyed property layer.
//!
//! [`EncoderSettings`] is the attribute bag each element instance owns. It is
//! created with per-kind defaults, may be changed at any time, and is read
//! when a format is negotiated; changes made while a session is open take
//! effect at the next negotiation.
//!
//! # Properties
//!
//! | name               | kinds        | type                  | default     |
//! |--------------------|--------------|-----------------------|-------------|
//! | `bitrate`          | video, audio | integer (bits/s)      | 300000 / 128000 |
//! | `gop-size`         | video        | integer (frames)      | 15          |
//! | `me-method`        | video        | enum name or number   | `log`       |
//! | `buffer-size`      | video        | integer (bytes)       | 524288      |
//! | `rtp-payload-size` | video        | integer (bytes, 0=off)| 0           |
//!
//! # Example
//!
//! ```rust
//! use avenc::config::{EncoderSettings, MotionEstimation, PropertyValue};
//! use avenc::format::MediaKind;
//!
//! let mut settings = EncoderSettings::for_kind(MediaKind::Video);
//! settings.set_property("me-method", &PropertyValue::String("epzs".into())).unwrap();
//! settings.set_property("gop-size", &PropertyValue::Integer(30)).unwrap();
//!
//! assert_eq!(settings.me_method, MotionEstimation::Epzs);
//! assert_eq!(settings.gop_size, 30);
//! ```

use crate::error::{Error, Result};
use crate::format::MediaKind;
use std::fmt;
use std::str::FromStr;

/// Default target bitrate for video encoders (bits per second).
pub const DEFAULT_VIDEO_BITRATE: u64 = 300_000;

/// Default target bitrate for audio encoders (bits per second).
pub const DEFAULT_AUDIO_BITRATE: u64 = 128_000;

/// Default group-of-pictures size.
pub const DEFAULT_VIDEO_GOP_SIZE: u32 = 15;

/// Default capacity of one encoded video output buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 512 * 1024;

const VIDEO_PROPERTIES: &[&str] = &[
    "bitrate",
    "gop-size",
    "me-method",
    "buffer-size",
    "rtp-payload-size",
];

const AUDIO_PROPERTIES: &[&str] = &["bitrate"];

// ============================================================================
// PropertyValue
// ============================================================================

/// A property value as written by an application or a pipeline description.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// A string value.
    String(String),
    /// An integer value.
    Integer(i64),
    /// A floating-point value.
    Float(f64),
    /// A boolean value.
    Bool(bool),
}

impl PropertyValue {
    /// Get as a string, converting if necessary.
    pub fn as_string(&self) -> String {
        match self {
            PropertyValue::String(s) => s.clone(),
            PropertyValue::Integer(i) => i.to_string(),
            PropertyValue::Float(f) => f.to_string(),
            PropertyValue::Bool(b) => b.to_string(),
        }
    }

    /// Try to get as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            PropertyValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to get as a u64.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().and_then(|i| u64::try_from(i).ok())
    }

    /// Try to get as a u32.
    pub fn as_u32(&self) -> Option<u32> {
        self.as_i64().and_then(|i| u32::try_from(i).ok())
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

// ============================================================================
// MotionEstimation
// ============================================================================

/// Motion-estimation search method (video only).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum MotionEstimation {
    /// No motion estimation.
    Zero,
    /// Full search.
    Full,
    /// Logarithmic search.
    #[default]
    Log,
    /// Parallel hierarchical one-dimensional search.
    Phods,
    /// Enhanced predictive zonal search.
    Epzs,
    /// Reserved experimental method.
    X1,
}

impl MotionEstimation {
    /// All methods, indexed by their numeric nick.
    pub const ALL: [MotionEstimation; 6] = [
        Self::Zero,
        Self::Full,
        Self::Log,
        Self::Phods,
        Self::Epzs,
        Self::X1,
    ];

    /// Numeric nick.
    pub const fn index(&self) -> u32 {
        match self {
            Self::Zero => 0,
            Self::Full => 1,
            Self::Log => 2,
            Self::Phods => 3,
            Self::Epzs => 4,
            Self::X1 => 5,
        }
    }

    /// Name nick.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Zero => "zero",
            Self::Full => "full",
            Self::Log => "log",
            Self::Phods => "phods",
            Self::Epzs => "epzs",
            Self::X1 => "x1",
        }
    }
}

impl FromStr for MotionEstimation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(index) = s.parse::<usize>() {
            return Self::ALL
                .get(index)
                .copied()
                .ok_or_else(|| Error::Property(format!("me-method index {} out of range", index)));
        }
        Self::ALL
            .iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| Error::Property(format!("unknown me-method '{}'", s)))
    }
}

impl fmt::Display for MotionEstimation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// EncoderSettings
// ============================================================================

/// Encoder attribute bag owned by one element instance.
#[derive(Clone, Debug, PartialEq)]
pub struct EncoderSettings {
    /// Media kind these settings apply to; decides which properties exist.
    pub kind: MediaKind,
    /// Target bitrate in bits per second.
    pub bitrate: u64,
    /// Frames between key frames.
    pub gop_size: u32,
    /// Motion-estimation method.
    pub me_method: MotionEstimation,
    /// Capacity of one encoded video output buffer in bytes.
    pub buffer_size: usize,
    /// Payload-segmented mode packet size in bytes, 0 disables it.
    pub rtp_payload_size: u32,
}

impl EncoderSettings {
    /// Defaults for a video encoder.
    pub fn video() -> Self {
        Self {
            kind: MediaKind::Video,
            bitrate: DEFAULT_VIDEO_BITRATE,
            gop_size: DEFAULT_VIDEO_GOP_SIZE,
            me_method: MotionEstimation::Log,
            buffer_size: DEFAULT_BUFFER_SIZE,
            rtp_payload_size: 0,
        }
    }

    /// Defaults for an audio encoder.
    pub fn audio() -> Self {
        Self {
            kind: MediaKind::Audio,
            bitrate: DEFAULT_AUDIO_BITRATE,
            ..Self::video()
        }
    }

    /// Defaults for the given media kind.
    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Video => Self::video(),
            MediaKind::Audio => Self::audio(),
        }
    }

    /// Set the target bitrate.
    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Set the GOP size.
    pub fn with_gop_size(mut self, gop_size: u32) -> Self {
        self.gop_size = gop_size;
        self
    }

    /// Set the motion-estimation method.
    pub fn with_me_method(mut self, me_method: MotionEstimation) -> Self {
        self.me_method = me_method;
        self
    }

    /// Set the output buffer capacity.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Set the payload-segmented mode packet size.
    pub fn with_rtp_payload_size(mut self, size: u32) -> Self {
        self.rtp_payload_size = size;
        self
    }

    /// Property names available for a media kind.
    pub fn property_names(kind: MediaKind) -> &'static [&'static str] {
        match kind {
            MediaKind::Video => VIDEO_PROPERTIES,
            MediaKind::Audio => AUDIO_PROPERTIES,
        }
    }

    fn check_property(&self, name: &str) -> Result<()> {
        if Self::property_names(self.kind).contains(&name) {
            Ok(())
        } else {
            Err(Error::Property(format!(
                "unknown property '{}' for {} encoder",
                name, self.kind
            )))
        }
    }

    /// Set a property by name.
    pub fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        self.check_property(name)?;
        let invalid = || Error::Property(format!("invalid value '{}' for '{}'", value, name));

        match name {
            "bitrate" => self.bitrate = value.as_u64().ok_or_else(invalid)?,
            "gop-size" => self.gop_size = value.as_u32().ok_or_else(invalid)?,
            "me-method" => {
                self.me_method = match value {
                    PropertyValue::Integer(i) => i.to_string().parse()?,
                    other => other.as_string().parse()?,
                }
            }
            "buffer-size" => {
                self.buffer_size = value
                    .as_u64()
                    .and_then(|v| usize::try_from(v).ok())
                    .filter(|v| *v > 0)
                    .ok_or_else(invalid)?
            }
            "rtp-payload-size" => self.rtp_payload_size = value.as_u32().ok_or_else(invalid)?,
            _ => return Err(invalid()),
        }

        tracing::debug!(property = name, value = %value, "encoder property set");
        Ok(())
    }

    /// Get a property by name.
    pub fn property(&self, name: &str) -> Result<PropertyValue> {
        self.check_property(name)?;
        let value = match name {
            "bitrate" => PropertyValue::Integer(self.bitrate as i64),
            "gop-size" => PropertyValue::Integer(self.gop_size as i64),
            "me-method" => PropertyValue::String(self.me_method.name().to_string()),
            "buffer-size" => PropertyValue::Integer(self.buffer_size as i64),
            "rtp-payload-size" => PropertyValue::Integer(self.rtp_payload_size as i64),
            _ => return Err(Error::Property(format!("unknown property '{}'", name))),
        };
        Ok(value)
    }
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self::video()
    }
}
