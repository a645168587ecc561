//! Encoder session lifecycle.
//!
//! An [`EncoderSession`] owns one engine instance and the context it is
//! configured with. It moves between two states:
//!
//! ```text
//!   Closed --open()--> Open --close()--> Closed
//! ```
//!
//! Only [`open`](EncoderSession::open) enters `Open`; a failed open leaves the
//! session closed. [`close`](EncoderSession::close) is idempotent and also
//! runs on drop.
//!
//! Encoding is soft-failing: when the engine reports an error for one unit,
//! the unit is logged and dropped and the stream continues.

use crate::buffer::Buffer;
use crate::clock::{ClockTime, TimeBase};
use crate::engine::{AudioSamples, CodecEngine, EncodedUnit, EngineContext, EngineError, Picture};
use crate::error::{Error, Result};
use crate::format::MediaKind;
use crate::metadata::Metadata;

/// One engine instance bound to one negotiated configuration.
pub struct EncoderSession {
    engine: Box<dyn CodecEngine>,
    context: EngineContext,
    codec: String,
    kind: MediaKind,
    open: bool,
    buffer_size: usize,
    /// Timing of the most recent input, used to stamp drained units.
    last_input: Option<Metadata>,
    units_in: u64,
    units_out: u64,
    units_dropped: u64,
}

impl EncoderSession {
    /// Create a closed session around an engine.
    pub fn new(engine: Box<dyn CodecEngine>, codec: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            engine,
            context: EngineContext::default(),
            codec: codec.into(),
            kind,
            open: false,
            buffer_size: crate::config::DEFAULT_BUFFER_SIZE,
            last_input: None,
            units_in: 0,
            units_out: 0,
            units_dropped: 0,
        }
    }

    /// Codec name, for diagnostics.
    pub fn codec(&self) -> &str {
        &self.codec
    }

    /// Media kind this session encodes.
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Whether the session is open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The engine context.
    ///
    /// While open, this reflects what the engine actually uses.
    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    /// Mutable engine context, applied at the next [`open`](Self::open).
    pub fn context_mut(&mut self) -> &mut EngineContext {
        &mut self.context
    }

    /// Capacity of one encoded video output buffer.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Set the capacity of encoded video output buffers.
    pub fn set_buffer_size(&mut self, size: usize) {
        self.buffer_size = size.max(1);
    }

    /// Bytes of input the engine consumes per audio frame.
    pub fn frame_bytes(&self) -> usize {
        self.context.audio_frame_bytes()
    }

    /// Units handed to the engine.
    pub fn units_in(&self) -> u64 {
        self.units_in
    }

    /// Units produced by the engine.
    pub fn units_out(&self) -> u64 {
        self.units_out
    }

    /// Units dropped because the engine failed.
    pub fn units_dropped(&self) -> u64 {
        self.units_dropped
    }

    /// Open the engine with the current context.
    ///
    /// An already open session is closed first. On failure the engine is
    /// released and the session stays closed.
    pub fn open(&mut self) -> std::result::Result<(), EngineError> {
        self.open_with(false)
    }

    /// Open with engine diagnostics optionally suppressed.
    pub fn open_with(&mut self, quiet: bool) -> std::result::Result<(), EngineError> {
        self.close();

        match self.engine.open(&mut self.context, quiet) {
            Ok(()) => {
                self.open = true;
                self.last_input = None;
                tracing::debug!(codec = %self.codec, kind = %self.kind, "encoder session opened");
                Ok(())
            }
            Err(err) => {
                self.engine.close();
                tracing::debug!(
                    codec = %self.codec,
                    error = %err,
                    "encoder session failed to open"
                );
                Err(err)
            }
        }
    }

    /// Close the session. Safe to call when already closed.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.engine.close();
        self.open = false;
        tracing::debug!(
            codec = %self.codec,
            units_in = self.units_in,
            units_out = self.units_out,
            units_dropped = self.units_dropped,
            "encoder session closed"
        );
    }

    /// Encode one raw picture.
    ///
    /// The buffer must hold exactly one picture of the negotiated size.
    /// Returns `Ok(None)` when the engine failed (the unit is dropped) or
    /// held the picture back.
    pub fn encode_video(&mut self, input: Buffer) -> Result<Option<Buffer>> {
        if !self.open {
            return Err(Error::NotNegotiated);
        }
        let (expected, format) = match (self.context.picture_size(), self.context.pix_fmt) {
            (Some(size), Some(format)) => (size, format),
            _ => return Err(Error::NotNegotiated),
        };
        if input.len() != expected {
            return Err(Error::Precondition(format!(
                "video buffer is {} bytes but a {}x{} {} picture is {} bytes",
                input.len(),
                self.context.width,
                self.context.height,
                format,
                expected
            )));
        }

        let metadata = *input.metadata();
        let picture = Picture {
            data: input.as_bytes(),
            width: self.context.width,
            height: self.context.height,
            format,
            pts: self
                .context
                .time_base
                .and_then(|tb| tb.to_ticks(metadata.pts)),
        };

        let mut output = vec![0u8; self.buffer_size];
        self.units_in += 1;
        self.last_input = Some(metadata);
        let result = self.engine.encode_video(&picture, &mut output);
        Ok(self.finish(result, output, metadata))
    }

    /// Encode one audio frame.
    ///
    /// The unit must be exactly [`frame_bytes`](Self::frame_bytes) long.
    pub fn encode_audio(&mut self, unit: Buffer) -> Result<Option<Buffer>> {
        if !self.open {
            return Err(Error::NotNegotiated);
        }
        let expected = self.frame_bytes();
        if unit.len() != expected {
            return Err(Error::Precondition(format!(
                "audio unit is {} bytes, engine frame is {} bytes",
                unit.len(),
                expected
            )));
        }

        let metadata = *unit.metadata();
        let samples = AudioSamples {
            data: unit.as_bytes(),
            channels: self.context.channels,
            sample_rate: self.context.sample_rate,
            pts: TimeBase::new(1, self.context.sample_rate).to_ticks(metadata.pts),
        };

        let mut output = vec![0u8; unit.len()];
        self.units_in += 1;
        self.last_input = Some(metadata);
        let result = self.engine.encode_audio(&samples, &mut output);
        Ok(self.finish(result, output, metadata))
    }

    /// Retrieve every unit the engine still holds.
    ///
    /// Drained units are stamped one input duration apart, starting after the
    /// last encoded input. Does nothing on a closed session.
    pub fn drain(&mut self) -> Vec<Buffer> {
        let mut drained = Vec::new();
        if !self.open {
            return drained;
        }

        let last = self.last_input.unwrap_or_default();
        let mut next_pts = last.end();
        let capacity = match self.kind {
            MediaKind::Video => self.buffer_size,
            MediaKind::Audio => self.frame_bytes().max(1),
        };

        loop {
            let mut output = vec![0u8; capacity];
            let unit = match self.engine.flush(&mut output) {
                Ok(Some(unit)) => unit,
                Ok(None) => break,
                Err(err) => {
                    tracing::error!(codec = %self.codec, error = %err, "flushing encoder failed");
                    break;
                }
            };

            let metadata = Metadata::from_pts(next_pts).with_duration(last.duration);
            next_pts = next_pts + last.duration;
            self.units_out += 1;
            drained.push(self.output_buffer(output, unit, metadata));
        }

        if !drained.is_empty() {
            tracing::debug!(codec = %self.codec, units = drained.len(), "drained delayed units");
        }
        drained
    }

    fn finish(
        &mut self,
        result: std::result::Result<Option<EncodedUnit>, EngineError>,
        output: Vec<u8>,
        metadata: Metadata,
    ) -> Option<Buffer> {
        match result {
            Ok(Some(unit)) => {
                self.units_out += 1;
                Some(self.output_buffer(output, unit, metadata))
            }
            Ok(None) => {
                tracing::trace!(codec = %self.codec, pts = %metadata.pts, "engine delayed unit");
                None
            }
            Err(err) => {
                self.units_dropped += 1;
                tracing::error!(
                    codec = %self.codec,
                    pts = %metadata.pts,
                    error = %err,
                    "encoding failed, dropping unit"
                );
                None
            }
        }
    }

    fn output_buffer(&self, mut output: Vec<u8>, unit: EncodedUnit, input: Metadata) -> Buffer {
        output.truncate(unit.size);

        let mut metadata = Metadata::from_pts(input.pts)
            .with_duration(input.duration)
            .with_sequence(input.sequence);
        if self.kind == MediaKind::Video {
            metadata.flags.delta_unit = !unit.key_frame;
            metadata.flags.sync_point = unit.key_frame;
        }
        metadata.flags.discont = input.flags.discont;

        Buffer::from_vec(output, metadata)
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for EncoderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderSession")
            .field("codec", &self.codec)
            .field("kind", &self.kind)
            .field("open", &self.open)
            .field("units_in", &self.units_in)
            .field("units_out", &self.units_out)
            .field("units_dropped", &self.units_dropped)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineFactory;
    use crate::engine::testing::{EngineScript, ScriptedFactory};
    use crate::format::{AudioCodec, PixelFormat, VideoCodec};

    fn video_session(script: EngineScript) -> (EncoderSession, ScriptedFactory) {
        let factory = ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4).with_script(script);
        let mut session = EncoderSession::new(factory.create(), "mpeg4", MediaKind::Video);
        let ctx = session.context_mut();
        ctx.width = 4;
        ctx.height = 4;
        ctx.pix_fmt = Some(PixelFormat::I420);
        ctx.time_base = Some(TimeBase::new(1, 25));
        ctx.gop_size = 2;
        session.set_buffer_size(64);
        (session, factory)
    }

    fn picture(pts_ms: u64) -> Buffer {
        Buffer::from_vec(
            vec![1u8; 24],
            Metadata::from_pts(ClockTime::from_millis(pts_ms))
                .with_duration(ClockTime::from_millis(40)),
        )
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut session, factory) = video_session(EngineScript::default());
        session.close();
        assert!(!session.is_open());

        session.open().unwrap();
        session.close();
        session.close();
        assert_eq!(factory.stats().closes(), 1);
    }

    #[test]
    fn test_reopen_closes_first() {
        let (mut session, factory) = video_session(EngineScript::default());
        session.open().unwrap();
        session.open().unwrap();
        assert_eq!(factory.stats().open_sessions(), 1);
    }

    #[test]
    fn test_failed_open_stays_closed() {
        let (mut session, factory) = video_session(EngineScript::default().reject_open());
        assert!(session.open().is_err());
        assert!(!session.is_open());
        assert_eq!(factory.stats().open_sessions(), 0);
    }

    #[test]
    fn test_encode_requires_open() {
        let (mut session, _factory) = video_session(EngineScript::default());
        assert!(matches!(
            session.encode_video(picture(0)),
            Err(Error::NotNegotiated)
        ));
    }

    #[test]
    fn test_video_size_precondition() {
        let (mut session, factory) = video_session(EngineScript::default());
        session.open().unwrap();

        let short = Buffer::from_vec(vec![0u8; 23], Metadata::new());
        assert!(matches!(
            session.encode_video(short),
            Err(Error::Precondition(_))
        ));
        assert!(session.is_open());
        assert_eq!(factory.stats().encodes(), 0);
    }

    #[test]
    fn test_video_output_timing_and_flags() {
        let (mut session, _factory) = video_session(EngineScript::default());
        session.open().unwrap();

        let first = session.encode_video(picture(0)).unwrap().unwrap();
        assert_eq!(first.metadata().pts, ClockTime::ZERO);
        assert_eq!(first.metadata().duration, ClockTime::from_millis(40));
        assert!(first.metadata().flags.sync_point);
        assert!(!first.metadata().flags.delta_unit);

        let second = session.encode_video(picture(40)).unwrap().unwrap();
        assert_eq!(second.metadata().pts, ClockTime::from_millis(40));
        assert!(second.metadata().flags.delta_unit);
        assert_eq!(second.len(), 8);
    }

    #[test]
    fn test_engine_error_drops_unit() {
        let (mut session, _factory) = video_session(EngineScript::default().fail_call(0));
        session.open().unwrap();

        assert!(session.encode_video(picture(0)).unwrap().is_none());
        assert_eq!(session.units_dropped(), 1);
        assert!(session.encode_video(picture(40)).unwrap().is_some());
    }

    #[test]
    fn test_delayed_units_take_current_input_timing() {
        let (mut session, factory) = video_session(EngineScript::default().with_delay(1));
        session.open().unwrap();

        assert!(session.encode_video(picture(0)).unwrap().is_none());
        let first = session.encode_video(picture(40)).unwrap().unwrap();
        let second = session.encode_video(picture(80)).unwrap().unwrap();
        assert_eq!(first.metadata().pts, ClockTime::from_millis(40));
        assert_eq!(second.metadata().pts, ClockTime::from_millis(80));

        let drained = session.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].metadata().pts, ClockTime::from_millis(120));
        assert_eq!(factory.stats().encodes(), 3);
    }

    #[test]
    fn test_drain_stamps_after_last_input() {
        let (mut session, _factory) = video_session(EngineScript::default().with_delay(2));
        session.open().unwrap();

        assert!(session.encode_video(picture(0)).unwrap().is_none());
        assert!(session.encode_video(picture(40)).unwrap().is_none());

        let drained = session.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].metadata().pts, ClockTime::from_millis(80));
        assert_eq!(drained[1].metadata().pts, ClockTime::from_millis(120));
        assert!(session.drain().is_empty());
    }

    #[test]
    fn test_audio_unit_size_precondition() {
        let factory = ScriptedFactory::audio("mp2", AudioCodec::Mp2).with_script(
            EngineScript::default()
                .with_frame_size(2)
                .with_output_size(4),
        );
        let mut session = EncoderSession::new(factory.create(), "mp2", MediaKind::Audio);
        session.context_mut().sample_rate = 8000;
        session.context_mut().channels = 1;
        session.open().unwrap();
        assert_eq!(session.frame_bytes(), 4);

        let wrong = Buffer::from_vec(vec![0u8; 6], Metadata::new());
        assert!(matches!(
            session.encode_audio(wrong),
            Err(Error::Precondition(_))
        ));

        let unit = Buffer::from_vec(vec![0u8; 4], Metadata::from_pts(ClockTime::ZERO));
        let out = session.encode_audio(unit).unwrap().unwrap();
        assert_eq!(out.metadata().pts, ClockTime::ZERO);
        assert!(!out.metadata().flags.delta_unit);
    }
}
