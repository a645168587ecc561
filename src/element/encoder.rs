//! The encoder element.

use std::sync::Arc;

use super::pad::Pad;
use super::state::{ElementState, StateChange};
use super::Downstream;
use crate::buffer::Buffer;
use crate::config::{EncoderSettings, PropertyValue};
use crate::error::{Error, Result};
use crate::flow::{FlowReturn, FlowStats};
use crate::format::{Caps, MediaKind};
use crate::negotiation::{CapabilityNegotiator, Negotiated, NegotiationError};
use crate::reassembly::FrameReassembler;
use crate::registry::EncoderVariant;
use crate::session::EncoderSession;

/// An encoder element for one codec variant.
///
/// Lifecycle:
///
/// ```text
///   new ──set_caps──> negotiated ──chain*──> handle_eos
///            ^             │
///            └─ set_caps ──┘ (renegotiation closes the old session)
///
///   change_state(PausedToReady | ReadyToNull) closes everything
/// ```
///
/// Video is one buffer in, at most one buffer out. Audio goes through a
/// [`FrameReassembler`] so the engine always sees whole frames.
pub struct EncoderElement {
    name: String,
    variant: Arc<EncoderVariant>,
    settings: EncoderSettings,
    session: EncoderSession,
    reassembler: Option<FrameReassembler>,
    sink_pad: Pad,
    src_pad: Pad,
    downstream: Option<Box<dyn Downstream>>,
    state: ElementState,
    negotiated: Option<Negotiated>,
    stats: FlowStats,
}

impl EncoderElement {
    /// Create an element with default settings for the variant's media kind.
    pub fn new(variant: Arc<EncoderVariant>) -> Self {
        let codec = variant.codec();
        let session =
            EncoderSession::new(variant.factory().create(), codec.name.clone(), codec.kind());
        Self {
            name: variant.element_name().to_string(),
            settings: EncoderSettings::for_kind(codec.kind()),
            session,
            reassembler: None,
            sink_pad: Pad::from_template(Arc::clone(variant.sink_template())),
            src_pad: Pad::from_template(Arc::clone(variant.src_template())),
            downstream: None,
            state: ElementState::Null,
            negotiated: None,
            stats: FlowStats::default(),
            variant,
        }
    }

    /// Set the instance name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The variant this element was made from.
    pub fn variant(&self) -> &Arc<EncoderVariant> {
        &self.variant
    }

    /// Media kind this element encodes.
    pub fn kind(&self) -> MediaKind {
        self.variant.codec().kind()
    }

    /// Current state.
    pub fn state(&self) -> ElementState {
        self.state
    }

    /// Current settings.
    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    /// Formats of the last successful negotiation.
    pub fn negotiated(&self) -> Option<&Negotiated> {
        self.negotiated.as_ref()
    }

    /// Whether an encoder session is open.
    pub fn is_negotiated(&self) -> bool {
        self.session.is_open()
    }

    /// The encoder session.
    pub fn session(&self) -> &EncoderSession {
        &self.session
    }

    /// The audio reassembler, present after an audio negotiation.
    pub fn reassembler(&self) -> Option<&FrameReassembler> {
        self.reassembler.as_ref()
    }

    /// Pad counters.
    pub fn stats(&self) -> &FlowStats {
        &self.stats
    }

    /// The sink pad.
    pub fn sink_pad(&self) -> &Pad {
        &self.sink_pad
    }

    /// The src pad.
    pub fn src_pad(&self) -> &Pad {
        &self.src_pad
    }

    /// Connect the src pad to a consumer, replacing any previous one.
    pub fn link(&mut self, downstream: Box<dyn Downstream>) {
        self.downstream = Some(downstream);
    }

    /// Disconnect the src pad.
    pub fn unlink(&mut self) -> Option<Box<dyn Downstream>> {
        self.downstream.take()
    }

    /// Set a property by name. Takes effect at the next negotiation.
    pub fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<()> {
        self.settings.set_property(name, value)
    }

    /// Get a property by name.
    pub fn property(&self, name: &str) -> Result<PropertyValue> {
        self.settings.property(name)
    }

    /// Input formats the engine accepts.
    ///
    /// Probed on first use and shared by every element of this variant.
    pub fn sink_caps(&self) -> Caps {
        self.variant.sink_caps().clone()
    }

    /// Output formats: the negotiated one, or the src template.
    pub fn src_caps(&self) -> Caps {
        match self.src_pad.current_format() {
            Some(format) => Caps::from(*format),
            None => self.variant.src_template().caps.clone(),
        }
    }

    /// Negotiate a new input format.
    ///
    /// Returns `false` when negotiation failed; the element then has no open
    /// session and stays usable for another attempt.
    pub fn set_caps(&mut self, caps: &Caps) -> bool {
        let negotiator =
            CapabilityNegotiator::new(self.variant.codec(), &self.variant.src_template().caps);
        let downstream = self
            .downstream
            .as_mut()
            .map(|d| d.as_mut() as &mut dyn Downstream);

        let result = negotiator
            .negotiate(&mut self.session, caps, &self.settings, downstream)
            .map_err(Error::from)
            .and_then(|negotiated| self.prepare_stream(negotiated));

        match result {
            Ok(negotiated) => {
                self.sink_pad.set_current_format(negotiated.input);
                self.src_pad.set_current_format(negotiated.output);
                self.negotiated = Some(negotiated);
                true
            }
            Err(err) => {
                tracing::warn!(
                    element = %self.name,
                    caps = %caps,
                    error = %err,
                    "caps negotiation failed"
                );
                self.session.close();
                self.reset_stream();
                false
            }
        }
    }

    fn prepare_stream(&mut self, negotiated: Negotiated) -> Result<Negotiated> {
        if let Some(old) = self.reassembler.take() {
            if old.residual_len() > 0 {
                tracing::debug!(
                    element = %self.name,
                    bytes = old.residual_len(),
                    "dropping audio residual on format change"
                );
            }
        }

        match self.kind() {
            MediaKind::Video => self.session.set_buffer_size(self.settings.buffer_size),
            MediaKind::Audio => {
                let frame_bytes = self.session.frame_bytes();
                let reassembler = FrameReassembler::new(frame_bytes)
                    .map_err(|_| NegotiationError::Rejected {
                        codec: self.session.codec().to_string(),
                        reason: "engine reported no audio frame size".into(),
                    })?
                    .with_byte_rate(self.session.context().audio_byte_rate());
                tracing::debug!(element = %self.name, frame_bytes, "audio reassembly ready");
                self.reassembler = Some(reassembler);
            }
        }
        Ok(negotiated)
    }

    fn reset_stream(&mut self) {
        if let Some(reassembler) = self.reassembler.as_mut() {
            reassembler.clear();
        }
        self.negotiated = None;
        self.sink_pad.clear_current_format();
        self.src_pad.clear_current_format();
    }

    /// Encode one incoming buffer and push the results downstream.
    ///
    /// Errors are precondition violations only (not negotiated, wrong video
    /// buffer size); they leave the element untouched. Engine failures drop
    /// the affected unit and return `Ok`. A push that does not return
    /// [`FlowReturn::Ok`] stops the call and its result is returned.
    pub fn chain(&mut self, buffer: Buffer) -> Result<FlowReturn> {
        if !self.session.is_open() {
            return Err(Error::NotNegotiated);
        }
        let len = buffer.len();
        tracing::trace!(element = %self.name, len, pts = %buffer.metadata().pts, "chain");

        match self.kind() {
            MediaKind::Video => {
                let encoded = self.session.encode_video(buffer)?;
                self.stats.record_in(len);
                match encoded {
                    Some(encoded) => {
                        Ok(push_downstream(&mut self.downstream, &mut self.stats, encoded))
                    }
                    None => Ok(FlowReturn::Ok),
                }
            }
            MediaKind::Audio => {
                let Self {
                    session,
                    reassembler,
                    downstream,
                    stats,
                    ..
                } = self;
                let reassembler = reassembler.as_mut().ok_or(Error::NotNegotiated)?;
                stats.record_in(len);

                reassembler.push(buffer, |unit| {
                    Ok(match session.encode_audio(unit)? {
                        Some(encoded) => push_downstream(downstream, stats, encoded),
                        None => FlowReturn::Ok,
                    })
                })
            }
        }
    }

    /// Finish the stream.
    ///
    /// Encodes the zero-padded audio residual, pushes every unit the engine
    /// still holds, then signals end of stream downstream.
    pub fn handle_eos(&mut self) -> Result<FlowReturn> {
        let mut flow = FlowReturn::Ok;

        if self.session.is_open() {
            if let Some(last) = self.reassembler.as_mut().and_then(FrameReassembler::drain_padded) {
                if let Some(encoded) = self.session.encode_audio(last)? {
                    flow = push_downstream(&mut self.downstream, &mut self.stats, encoded);
                }
            }

            if flow.is_ok() {
                for encoded in self.session.drain() {
                    flow = push_downstream(&mut self.downstream, &mut self.stats, encoded);
                    if !flow.is_ok() {
                        break;
                    }
                }
            }
        }

        if let Some(downstream) = self.downstream.as_mut() {
            downstream.end_of_stream();
        }
        tracing::debug!(
            element = %self.name,
            buffers_in = self.stats.buffers_in,
            buffers_out = self.stats.buffers_out,
            flow = %flow,
            "end of stream"
        );
        Ok(flow)
    }

    /// Apply one state transition and return the new state.
    ///
    /// Leaving PAUSED or READY downwards closes the session and drops the
    /// residual. Repeating a transition is harmless.
    pub fn change_state(&mut self, change: StateChange) -> ElementState {
        if matches!(change, StateChange::PausedToReady | StateChange::ReadyToNull) {
            self.session.close();
            self.reset_stream();
        }
        tracing::debug!(element = %self.name, change = %change, "state change");
        self.state = change.target_state();
        self.state
    }

    /// Walk through every intermediate transition up or down to `target`.
    pub fn set_state(&mut self, target: ElementState) -> ElementState {
        while self.state != target {
            let next = if target > self.state {
                step_up(self.state)
            } else {
                step_down(self.state)
            };
            match StateChange::between(self.state, next) {
                Some(change) => {
                    self.change_state(change);
                }
                None => break,
            }
        }
        self.state
    }
}

fn step_up(state: ElementState) -> ElementState {
    match state {
        ElementState::Null => ElementState::Ready,
        ElementState::Ready => ElementState::Paused,
        ElementState::Paused | ElementState::Playing => ElementState::Playing,
    }
}

fn step_down(state: ElementState) -> ElementState {
    match state {
        ElementState::Playing => ElementState::Paused,
        ElementState::Paused => ElementState::Ready,
        ElementState::Ready | ElementState::Null => ElementState::Null,
    }
}

fn push_downstream(
    downstream: &mut Option<Box<dyn Downstream>>,
    stats: &mut FlowStats,
    buffer: Buffer,
) -> FlowReturn {
    let len = buffer.len();
    let flow = match downstream.as_mut() {
        Some(downstream) => downstream.push(buffer),
        None => FlowReturn::NotLinked,
    };
    stats.record_push(len, flow);
    if !flow.is_ok() {
        tracing::debug!(flow = %flow, "downstream did not take buffer");
    }
    flow
}

impl std::fmt::Debug for EncoderElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderElement")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("negotiated", &self.negotiated)
            .field("session", &self.session)
            .field("linked", &self.downstream.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockTime;
    use crate::element::AppSink;
    use crate::engine::testing::{EngineScript, ScriptedFactory};
    use crate::format::{AudioCodec, AudioFormatCaps, PixelFormat, VideoCodec, VideoFormatCaps};
    use crate::metadata::Metadata;

    fn element(factory: ScriptedFactory) -> EncoderElement {
        let variant = EncoderVariant::from_factory(Arc::new(factory)).unwrap();
        EncoderElement::new(Arc::new(variant))
    }

    fn video_caps() -> Caps {
        Caps::new(
            VideoFormatCaps::any()
                .with_pixel_format(PixelFormat::I420)
                .with_size(4, 4),
        )
    }

    fn audio_caps() -> Caps {
        Caps::new(AudioFormatCaps::s16().with_rate(8000).with_channels(1))
    }

    #[test]
    fn test_chain_before_negotiation() {
        let mut enc = element(ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4));
        let err = enc.chain(Buffer::from_vec(vec![0; 24], Metadata::new())).unwrap_err();
        assert!(matches!(err, Error::NotNegotiated));
    }

    #[test]
    fn test_unlinked_push_reports_not_linked() {
        let mut enc = element(ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4));
        assert!(enc.set_caps(&video_caps()));
        let flow = enc.chain(Buffer::from_vec(vec![0; 24], Metadata::new())).unwrap();
        assert_eq!(flow, FlowReturn::NotLinked);
        assert_eq!(enc.stats().push_failures, 1);
    }

    #[test]
    fn test_video_size_precondition_keeps_session() {
        let mut enc = element(ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4));
        enc.link(Box::new(AppSink::new()));
        assert!(enc.set_caps(&video_caps()));

        let err = enc.chain(Buffer::from_vec(vec![0; 10], Metadata::new())).unwrap_err();
        assert!(err.is_precondition());
        assert!(enc.is_negotiated());
    }

    #[test]
    fn test_audio_reassembly_through_engine() {
        let factory = ScriptedFactory::audio("mp2", AudioCodec::Mp2)
            .with_script(EngineScript::default().with_frame_size(2).with_output_size(4));
        let mut enc = element(factory);
        let sink = AppSink::new();
        let out = sink.handle();
        enc.link(Box::new(sink));
        assert!(enc.set_caps(&audio_caps()));

        let input = Buffer::from_vec(
            vec![1; 10],
            Metadata::from_pts(ClockTime::ZERO).with_duration(ClockTime::from_millis(100)),
        );
        assert_eq!(enc.chain(input).unwrap(), FlowReturn::Ok);

        let pushed = out.drain();
        assert_eq!(pushed.len(), 2);
        assert_eq!(pushed[1].metadata().pts, ClockTime::from_millis(40));
        assert_eq!(enc.reassembler().unwrap().residual_len(), 2);
    }

    #[test]
    fn test_renegotiation_drops_residual() {
        let factory = ScriptedFactory::audio("mp2", AudioCodec::Mp2)
            .with_script(EngineScript::default().with_frame_size(2).with_output_size(4));
        let mut enc = element(factory);
        enc.link(Box::new(AppSink::new()));
        assert!(enc.set_caps(&audio_caps()));
        enc.chain(Buffer::from_vec(vec![0; 3], Metadata::new())).unwrap();
        assert_eq!(enc.reassembler().unwrap().residual_len(), 3);

        assert!(enc.set_caps(&audio_caps()));
        assert_eq!(enc.reassembler().unwrap().residual_len(), 0);
    }

    #[test]
    fn test_zero_frame_size_fails_negotiation() {
        let factory = ScriptedFactory::audio("mp2", AudioCodec::Mp2)
            .with_script(EngineScript::default().with_frame_size(0));
        let stats = factory.stats();
        let mut enc = element(factory);

        assert!(!enc.set_caps(&audio_caps()));
        assert!(!enc.is_negotiated());
        assert_eq!(stats.open_sessions(), 0);
    }

    #[test]
    fn test_set_state_walks_transitions() {
        let mut enc = element(ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4));
        assert_eq!(enc.set_state(ElementState::Playing), ElementState::Playing);
        assert!(enc.set_caps(&video_caps()));

        assert_eq!(enc.set_state(ElementState::Null), ElementState::Null);
        assert!(!enc.is_negotiated());
        assert!(enc.negotiated().is_none());
    }

    #[test]
    fn test_src_caps_follow_negotiation() {
        let mut enc = element(ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4));
        assert!(!enc.src_caps().is_fixed());

        assert!(enc.set_caps(&video_caps()));
        assert!(enc.src_caps().is_fixed());

        enc.change_state(StateChange::PausedToReady);
        assert!(!enc.src_caps().is_fixed());
    }

    #[test]
    fn test_properties() {
        let mut enc = element(ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4));
        enc.set_property("bitrate", &PropertyValue::Integer(1_000_000)).unwrap();
        assert_eq!(enc.property("bitrate").unwrap(), PropertyValue::Integer(1_000_000));
        assert!(enc.set_property("nonexistent", &PropertyValue::Integer(1)).is_err());

        let audio = element(ScriptedFactory::audio("mp2", AudioCodec::Mp2));
        assert!(audio.property("gop-size").is_err());
    }
}
