//! In-memory engine for tests and benchmarks.
//!
//! [`ScriptedFactory`] builds [`ScriptedEngine`]s that follow an
//! [`EngineScript`]: which pixel formats open, which ones get substituted,
//! which encode calls fail, how many units are held back until flush. Every
//! engine created by one factory reports into the same [`EngineStats`].
//!
//! Each encoded unit starts with the zero-based encode-call index as a
//! little-endian `u32`, followed by the first input bytes.
//!
//! # Example
//!
//! ```rust
//! use avenc::engine::testing::{EngineScript, ScriptedFactory};
//! use avenc::engine::{EngineContext, EngineFactory};
//! use avenc::format::{PixelFormat, VideoCodec};
//!
//! let factory = ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4)
//!     .with_script(EngineScript::default().accept_only(&[PixelFormat::I420]));
//!
//! let mut engine = factory.create();
//! let mut ctx = EngineContext {
//!     width: 16,
//!     height: 16,
//!     pix_fmt: Some(PixelFormat::Rgb24),
//!     ..Default::default()
//! };
//! assert!(engine.open(&mut ctx, true).is_err());
//! assert_eq!(factory.stats().quiet_opens(), 1);
//! ```

use super::{
    AudioSamples, CodecDescriptor, CodecEngine, CodecId, EncodedUnit, EngineContext, EngineError,
    EngineFactory, Picture,
};
use crate::format::{AudioCodec, MediaKind, PixelFormat, VideoCodec};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Behaviour of scripted engines.
#[derive(Clone, Debug)]
pub struct EngineScript {
    /// Pixel formats that open; `None` accepts all.
    pub accepted_formats: Option<Vec<PixelFormat>>,
    /// Pixel formats silently replaced at open (`requested -> chosen`).
    pub substitutions: Vec<(PixelFormat, PixelFormat)>,
    /// Refuse every open.
    pub reject_open: bool,
    /// Samples per channel reported for audio.
    pub frame_size: usize,
    /// Zero-based encode-call indexes that fail.
    pub failing_calls: Vec<u64>,
    /// Units held back until flush.
    pub delay: usize,
    /// Encoded unit size in bytes.
    pub output_size: usize,
}

impl Default for EngineScript {
    fn default() -> Self {
        Self {
            accepted_formats: None,
            substitutions: Vec::new(),
            reject_open: false,
            frame_size: 1152,
            failing_calls: Vec::new(),
            delay: 0,
            output_size: 8,
        }
    }
}

impl EngineScript {
    /// Only open with the given pixel formats.
    pub fn accept_only(mut self, formats: &[PixelFormat]) -> Self {
        self.accepted_formats = Some(formats.to_vec());
        self
    }

    /// Open with `requested` but report `chosen`.
    pub fn substitute(mut self, requested: PixelFormat, chosen: PixelFormat) -> Self {
        self.substitutions.push((requested, chosen));
        self
    }

    /// Refuse every open.
    pub fn reject_open(mut self) -> Self {
        self.reject_open = true;
        self
    }

    /// Report this many samples per channel per audio frame.
    pub fn with_frame_size(mut self, frame_size: usize) -> Self {
        self.frame_size = frame_size;
        self
    }

    /// Fail the encode call with this zero-based index.
    pub fn fail_call(mut self, index: u64) -> Self {
        self.failing_calls.push(index);
        self
    }

    /// Hold back this many units until flush.
    pub fn with_delay(mut self, delay: usize) -> Self {
        self.delay = delay;
        self
    }

    /// Produce units of this many bytes.
    pub fn with_output_size(mut self, size: usize) -> Self {
        self.output_size = size.max(4);
        self
    }
}

/// Counters shared by every engine of one factory.
#[derive(Debug, Default)]
pub struct EngineStats {
    created: AtomicUsize,
    opens: AtomicUsize,
    succeeded: AtomicUsize,
    quiet_opens: AtomicUsize,
    closes: AtomicUsize,
    encodes: AtomicUsize,
    last_context: Mutex<Option<EngineContext>>,
}

impl EngineStats {
    /// Engines created.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Open attempts, successful or not.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Open attempts made with diagnostics suppressed.
    pub fn quiet_opens(&self) -> usize {
        self.quiet_opens.load(Ordering::SeqCst)
    }

    /// Close calls that released an open engine.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Encode calls.
    pub fn encodes(&self) -> usize {
        self.encodes.load(Ordering::SeqCst)
    }

    /// Successful opens.
    pub fn successful_opens(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    /// Engines currently open.
    pub fn open_sessions(&self) -> usize {
        self.successful_opens().saturating_sub(self.closes())
    }

    /// Context passed to the most recent successful open.
    pub fn last_context(&self) -> Option<EngineContext> {
        self.last_context.lock().ok().and_then(|ctx| ctx.clone())
    }
}

/// Factory for [`ScriptedEngine`]s.
pub struct ScriptedFactory {
    descriptor: CodecDescriptor,
    script: EngineScript,
    stats: Arc<EngineStats>,
}

impl ScriptedFactory {
    /// Factory for an arbitrary codec descriptor.
    pub fn new(descriptor: CodecDescriptor) -> Self {
        Self {
            descriptor,
            script: EngineScript::default(),
            stats: Arc::new(EngineStats::default()),
        }
    }

    /// Factory for a video codec.
    pub fn video(name: &str, codec: VideoCodec) -> Self {
        Self::new(CodecDescriptor::new(name, CodecId::Video(codec)))
    }

    /// Factory for an audio codec.
    pub fn audio(name: &str, codec: AudioCodec) -> Self {
        Self::new(CodecDescriptor::new(name, CodecId::Audio(codec)))
    }

    /// Replace the script.
    pub fn with_script(mut self, script: EngineScript) -> Self {
        self.script = script;
        self
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }
}

impl EngineFactory for ScriptedFactory {
    fn descriptor(&self) -> &CodecDescriptor {
        &self.descriptor
    }

    fn create(&self) -> Box<dyn CodecEngine> {
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        Box::new(ScriptedEngine {
            kind: self.descriptor.kind(),
            script: self.script.clone(),
            stats: Arc::clone(&self.stats),
            open: false,
            calls: 0,
            pending: VecDeque::new(),
            gop_size: 0,
        })
    }
}

/// An engine following an [`EngineScript`].
pub struct ScriptedEngine {
    kind: MediaKind,
    script: EngineScript,
    stats: Arc<EngineStats>,
    open: bool,
    calls: u64,
    pending: VecDeque<(Vec<u8>, bool)>,
    gop_size: u32,
}

impl ScriptedEngine {
    fn check_video(&self, context: &mut EngineContext) -> Result<(), EngineError> {
        let requested = context
            .pix_fmt
            .ok_or_else(|| EngineError::Open("no pixel format".into()))?;
        if context.width == 0 || context.height == 0 {
            return Err(EngineError::Open("no picture size".into()));
        }
        if let Some((_, chosen)) = self
            .script
            .substitutions
            .iter()
            .find(|(from, _)| *from == requested)
        {
            context.pix_fmt = Some(*chosen);
            return Ok(());
        }
        match &self.script.accepted_formats {
            Some(formats) if !formats.contains(&requested) => Err(EngineError::Unsupported(
                format!("pixel format {}", requested),
            )),
            _ => Ok(()),
        }
    }

    fn encode(
        &mut self,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<Option<EncodedUnit>, EngineError> {
        if !self.open {
            return Err(EngineError::NotOpen);
        }
        let index = self.calls;
        self.calls += 1;
        self.stats.encodes.fetch_add(1, Ordering::SeqCst);

        if self.script.failing_calls.contains(&index) {
            return Err(EngineError::Encode { code: -22 });
        }

        let mut unit = vec![0u8; self.script.output_size];
        let tag = (index as u32).to_le_bytes();
        let head = unit.len().min(tag.len());
        unit[..head].copy_from_slice(&tag[..head]);
        let tail = (unit.len() - head).min(input.len());
        unit[head..head + tail].copy_from_slice(&input[..tail]);

        let key_frame = self.kind == MediaKind::Audio
            || self.gop_size == 0
            || index % self.gop_size as u64 == 0;
        self.pending.push_back((unit, key_frame));

        if self.pending.len() > self.script.delay {
            self.emit(output)
        } else {
            Ok(None)
        }
    }

    fn emit(&mut self, output: &mut [u8]) -> Result<Option<EncodedUnit>, EngineError> {
        let Some((unit, key_frame)) = self.pending.pop_front() else {
            return Ok(None);
        };
        if unit.len() > output.len() {
            return Err(EngineError::OutputTooSmall {
                needed: unit.len(),
                capacity: output.len(),
            });
        }
        output[..unit.len()].copy_from_slice(&unit);
        Ok(Some(EncodedUnit {
            size: unit.len(),
            key_frame,
        }))
    }
}

impl CodecEngine for ScriptedEngine {
    fn open(&mut self, context: &mut EngineContext, quiet: bool) -> Result<(), EngineError> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        if quiet {
            self.stats.quiet_opens.fetch_add(1, Ordering::SeqCst);
        }
        if self.open {
            return Err(EngineError::Open("already open".into()));
        }
        if self.script.reject_open {
            return Err(EngineError::Open("scripted rejection".into()));
        }

        match self.kind {
            MediaKind::Video => self.check_video(context)?,
            MediaKind::Audio => {
                if context.sample_rate == 0 || context.channels == 0 {
                    return Err(EngineError::Open("no audio parameters".into()));
                }
                context.frame_size = self.script.frame_size;
            }
        }

        self.open = true;
        self.calls = 0;
        self.pending.clear();
        self.gop_size = context.gop_size;
        self.stats.succeeded.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.stats.last_context.lock() {
            *last = Some(context.clone());
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.pending.clear();
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn encode_video(
        &mut self,
        picture: &Picture<'_>,
        output: &mut [u8],
    ) -> Result<Option<EncodedUnit>, EngineError> {
        self.encode(picture.data, output)
    }

    fn encode_audio(
        &mut self,
        samples: &AudioSamples<'_>,
        output: &mut [u8],
    ) -> Result<Option<EncodedUnit>, EngineError> {
        self.encode(samples.data, output)
    }

    fn flush(&mut self, output: &mut [u8]) -> Result<Option<EncodedUnit>, EngineError> {
        if !self.open {
            return Ok(None);
        }
        self.emit(output)
    }
}

impl Drop for ScriptedEngine {
    fn drop(&mut self) {
        self.close();
    }
}
