//! Buffer metadata types.

use crate::clock::ClockTime;

/// Flags indicating buffer properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    /// Buffer marks end of stream.
    pub eos: bool,
    /// Buffer contains a sync point (keyframe equivalent).
    pub sync_point: bool,
    /// Buffer can only be decoded with reference to earlier buffers.
    pub delta_unit: bool,
    /// Buffer starts after a discontinuity in the stream.
    pub discont: bool,
    /// Buffer is a gap marker without meaningful content.
    pub gap: bool,
}

impl BufferFlags {
    /// Set the delta-unit flag.
    pub fn set_delta_unit(&mut self, value: bool) {
        self.delta_unit = value;
    }

    /// Check if delta-unit flag is set.
    pub fn is_delta_unit(&self) -> bool {
        self.delta_unit
    }

    /// Set the discont flag.
    pub fn set_discont(&mut self, value: bool) {
        self.discont = value;
    }

    /// Check if discont flag is set.
    pub fn is_discont(&self) -> bool {
        self.discont
    }
}

/// Metadata associated with a buffer.
///
/// Timing fields use [`ClockTime::NONE`] when unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Presentation timestamp.
    pub pts: ClockTime,

    /// Duration of this buffer's content.
    pub duration: ClockTime,

    /// Monotonic sequence number within a stream.
    pub sequence: u64,

    /// Byte offset in the original stream.
    pub offset: Option<u64>,

    /// Buffer flags.
    pub flags: BufferFlags,
}

impl Metadata {
    /// Create new metadata with unknown timing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create metadata with a sequence number.
    pub fn from_sequence(sequence: u64) -> Self {
        Self {
            sequence,
            ..Default::default()
        }
    }

    /// Create metadata with a presentation timestamp.
    pub fn from_pts(pts: ClockTime) -> Self {
        Self {
            pts,
            ..Default::default()
        }
    }

    /// Set the presentation timestamp.
    pub fn with_pts(mut self, pts: ClockTime) -> Self {
        self.pts = pts;
        self
    }

    /// Set the duration.
    pub fn with_duration(mut self, duration: ClockTime) -> Self {
        self.duration = duration;
        self
    }

    /// Set the sequence number.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Set the byte offset.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Mark as end-of-stream.
    pub fn with_eos(mut self) -> Self {
        self.flags.eos = true;
        self
    }

    /// Mark as discontinuous.
    pub fn with_discont(mut self) -> Self {
        self.flags.discont = true;
        self
    }

    /// Check if this buffer marks end of stream.
    pub fn is_eos(&self) -> bool {
        self.flags.eos
    }

    /// End time (`pts + duration`), NONE when either is unknown.
    pub fn end(&self) -> ClockTime {
        self.pts + self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_defaults() {
        let meta = Metadata::new();
        assert!(meta.pts.is_none());
        assert!(meta.duration.is_none());
        assert_eq!(meta.sequence, 0);
        assert!(!meta.flags.delta_unit);
    }

    #[test]
    fn test_metadata_builder() {
        let meta = Metadata::from_sequence(7)
            .with_pts(ClockTime::from_millis(40))
            .with_duration(ClockTime::from_millis(20))
            .with_discont();

        assert_eq!(meta.sequence, 7);
        assert_eq!(meta.end(), ClockTime::from_millis(60));
        assert!(meta.flags.is_discont());
    }

    #[test]
    fn test_end_unknown() {
        let meta = Metadata::from_pts(ClockTime::ZERO);
        assert!(meta.end().is_none());
    }
}
