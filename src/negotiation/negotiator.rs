//! Per-format negotiation of one encoder session.
//!
//! [`CapabilityNegotiator::negotiate`] turns offered input caps plus the
//! element settings into an open engine session and a fixed output format:
//!
//! ```text
//!  offered caps ──> engine context ──> open ──> derived src caps
//!                                                   │
//!  downstream allowed caps ─────────── intersect ◄──┘
//!                                         │
//!                          first structure, fixate ──> accept_caps
//! ```
//!
//! Any failure closes the session again, so a failed negotiation never leaves
//! an engine open.

use super::error::NegotiationError;
use crate::clock::TimeBase;
use crate::codecmap;
use crate::config::EncoderSettings;
use crate::element::Downstream;
use crate::engine::{CodecDescriptor, EngineContext};
use crate::format::{Caps, MediaFormat, MediaKind};
use crate::session::EncoderSession;

/// Time base used when the offered caps carry no framerate.
pub const DEFAULT_TIME_BASE: TimeBase = TimeBase::new(1, 25);

/// Lowest quantizer the encoder may use.
pub const QMIN: u32 = 1;

/// Highest quantizer the encoder may use.
pub const QMAX: u32 = 31;

/// Largest quantizer step between consecutive frames.
pub const MAX_QDIFF: u32 = 15;

/// Input and output formats of a successful negotiation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Negotiated {
    /// Raw format accepted on the sink pad.
    pub input: MediaFormat,
    /// Encoded format produced on the src pad.
    pub output: MediaFormat,
}

/// Negotiates formats for one codec.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityNegotiator<'a> {
    codec: &'a CodecDescriptor,
    src_template: &'a Caps,
}

impl<'a> CapabilityNegotiator<'a> {
    /// Create a negotiator for a codec.
    ///
    /// `src_template` stands in for downstream's caps when nothing is linked
    /// or downstream does not advertise any.
    pub fn new(codec: &'a CodecDescriptor, src_template: &'a Caps) -> Self {
        Self {
            codec,
            src_template,
        }
    }

    /// Configure and open `session` for `offered`, and pick the output format.
    ///
    /// When two candidate output structures remain, the first one (in
    /// downstream's order) wins.
    pub fn negotiate(
        &self,
        session: &mut EncoderSession,
        offered: &Caps,
        settings: &EncoderSettings,
        mut downstream: Option<&mut dyn Downstream>,
    ) -> Result<Negotiated, NegotiationError> {
        let codec = self.codec.name.as_str();
        let kind = self.codec.kind();

        session.close();
        let ctx = session.context_mut();
        Self::configure(ctx, kind, settings);

        let input = codecmap::caps_to_context(kind, offered, ctx)
            .map_err(|reason| NegotiationError::invalid_caps(codec, reason))?;
        if ctx.time_base.is_none() {
            ctx.time_base = Some(DEFAULT_TIME_BASE);
        }
        let requested = ctx.pix_fmt;

        session
            .open()
            .map_err(|err| NegotiationError::Rejected {
                codec: codec.to_string(),
                reason: err.to_string(),
            })?;

        if kind == MediaKind::Video && session.context().pix_fmt != requested {
            let chosen = session.context().pix_fmt;
            session.close();
            return match requested {
                Some(requested) => Err(NegotiationError::FormatMismatch {
                    codec: codec.to_string(),
                    requested,
                    chosen,
                }),
                None => Err(NegotiationError::invalid_caps(codec, "no pixel format")),
            };
        }

        let output = match self.select_output(session.context(), downstream.as_deref()) {
            Ok(output) => output,
            Err(err) => {
                session.close();
                return Err(err);
            }
        };

        if let Some(downstream) = downstream.as_deref_mut() {
            if !downstream.accept_caps(&output) {
                session.close();
                return Err(NegotiationError::DownstreamRejected {
                    codec: codec.to_string(),
                    format: output.to_string(),
                });
            }
        }

        tracing::info!(codec, input = %input, output = %output, "negotiated encoder formats");
        Ok(Negotiated { input, output })
    }

    /// Caps the open engine can produce, restricted to what downstream takes.
    fn select_output(
        &self,
        ctx: &EngineContext,
        downstream: Option<&dyn Downstream>,
    ) -> Result<MediaFormat, NegotiationError> {
        let codec = self.codec.name.as_str();

        let derived = codecmap::codec_to_caps(self.codec.id, Some(ctx)).ok_or_else(|| {
            NegotiationError::UnsupportedCodec {
                codec: codec.to_string(),
            }
        })?;
        let allowed = downstream
            .and_then(|d| d.allowed_caps())
            .unwrap_or_else(|| self.src_template.clone());

        let candidates = allowed.intersect(&derived);
        if candidates.len() > 1 {
            tracing::debug!(
                codec,
                candidates = %candidates,
                "several output formats possible, taking the first"
            );
        }

        candidates
            .truncate()
            .fixate()
            .ok_or_else(|| NegotiationError::no_common_format(codec, &allowed, &derived))
    }

    fn configure(ctx: &mut EngineContext, kind: MediaKind, settings: &EncoderSettings) {
        ctx.reset();
        ctx.strict_std_compliance = EngineContext::STRICT_EXPERIMENTAL;

        ctx.bit_rate = settings.bitrate;
        ctx.bit_rate_tolerance = settings.bitrate;
        if kind == MediaKind::Video {
            ctx.gop_size = settings.gop_size;
            ctx.me_method = settings.me_method;
            if settings.rtp_payload_size > 0 {
                ctx.rtp_mode = true;
                ctx.rtp_payload_size = settings.rtp_payload_size;
            }
        }

        ctx.qmin = QMIN;
        ctx.qmax = QMAX;
        ctx.max_qdiff = MAX_QDIFF;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::AppSink;
    use crate::engine::EngineFactory;
    use crate::engine::testing::{EngineScript, ScriptedFactory};
    use crate::format::{
        AudioCodec, AudioFormatCaps, EncodedVideoCaps, Framerate, PixelFormat, VideoCodec,
        VideoFormatCaps,
    };

    fn video_caps(format: PixelFormat) -> Caps {
        Caps::new(
            VideoFormatCaps::any()
                .with_pixel_format(format)
                .with_size(64, 48)
                .with_framerate(Framerate::FPS_30),
        )
    }

    fn setup(script: EngineScript) -> (ScriptedFactory, EncoderSession, Caps) {
        let factory = ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4).with_script(script);
        let session = EncoderSession::new(factory.create(), "mpeg4", MediaKind::Video);
        let template = Caps::new(EncodedVideoCaps::any(VideoCodec::Mpeg4));
        (factory, session, template)
    }

    #[test]
    fn test_negotiate_without_downstream() {
        let (factory, mut session, template) = setup(EngineScript::default());
        let negotiator = CapabilityNegotiator::new(factory.descriptor(), &template);

        let result = negotiator
            .negotiate(
                &mut session,
                &video_caps(PixelFormat::I420),
                &EncoderSettings::video().with_rtp_payload_size(1200),
                None,
            )
            .unwrap();

        assert!(session.is_open());
        match result.output {
            MediaFormat::Video(v) => {
                assert_eq!((v.width, v.height), (64, 48));
                assert_eq!(v.framerate, Framerate::FPS_30);
            }
            other => panic!("unexpected output {other}"),
        }

        let ctx = factory.stats().last_context().unwrap();
        assert_eq!(ctx.bit_rate, 300_000);
        assert_eq!(ctx.bit_rate_tolerance, 300_000);
        assert_eq!(ctx.gop_size, 15);
        assert!(ctx.rtp_mode);
        assert_eq!(ctx.rtp_payload_size, 1200);
        assert_eq!((ctx.qmin, ctx.qmax, ctx.max_qdiff), (1, 31, 15));
        assert_eq!(ctx.strict_std_compliance, -1);
        assert_eq!(ctx.time_base, Some(TimeBase::new(1, 30)));
    }

    #[test]
    fn test_default_time_base() {
        let (factory, mut session, template) = setup(EngineScript::default());
        let offered = Caps::new(
            VideoFormatCaps::any()
                .with_pixel_format(PixelFormat::I420)
                .with_size(64, 48),
        );
        CapabilityNegotiator::new(factory.descriptor(), &template)
            .negotiate(&mut session, &offered, &EncoderSettings::video(), None)
            .unwrap();
        assert_eq!(session.context().time_base, Some(DEFAULT_TIME_BASE));
        assert!(!session.context().rtp_mode);
    }

    #[test]
    fn test_rejected_open_leaves_session_closed() {
        let (factory, mut session, template) =
            setup(EngineScript::default().accept_only(&[PixelFormat::I420]));
        let err = CapabilityNegotiator::new(factory.descriptor(), &template)
            .negotiate(
                &mut session,
                &video_caps(PixelFormat::Rgb24),
                &EncoderSettings::video(),
                None,
            )
            .unwrap_err();

        assert!(matches!(err, NegotiationError::Rejected { .. }));
        assert!(!session.is_open());
        assert_eq!(factory.stats().open_sessions(), 0);
    }

    #[test]
    fn test_format_mismatch() {
        let (factory, mut session, template) = setup(
            EngineScript::default().substitute(PixelFormat::Rgb24, PixelFormat::I420),
        );
        let err = CapabilityNegotiator::new(factory.descriptor(), &template)
            .negotiate(
                &mut session,
                &video_caps(PixelFormat::Rgb24),
                &EncoderSettings::video(),
                None,
            )
            .unwrap_err();

        assert!(matches!(
            err,
            NegotiationError::FormatMismatch {
                requested: PixelFormat::Rgb24,
                chosen: Some(PixelFormat::I420),
                ..
            }
        ));
        assert!(!session.is_open());
        assert_eq!(factory.stats().open_sessions(), 0);
    }

    #[test]
    fn test_empty_downstream_caps() {
        let (factory, mut session, template) = setup(EngineScript::default());
        let mut sink = AppSink::new().with_allowed_caps(Caps::empty());

        let err = CapabilityNegotiator::new(factory.descriptor(), &template)
            .negotiate(
                &mut session,
                &video_caps(PixelFormat::I420),
                &EncoderSettings::video(),
                Some(&mut sink),
            )
            .unwrap_err();

        assert!(matches!(err, NegotiationError::NoCommonFormat { .. }));
        assert!(!session.is_open());
        assert_eq!(factory.stats().open_sessions(), 0);
    }

    #[test]
    fn test_downstream_rejects_output() {
        let (factory, mut session, template) = setup(EngineScript::default());
        let mut sink = AppSink::new().rejecting_caps();

        let err = CapabilityNegotiator::new(factory.descriptor(), &template)
            .negotiate(
                &mut session,
                &video_caps(PixelFormat::I420),
                &EncoderSettings::video(),
                Some(&mut sink),
            )
            .unwrap_err();

        assert!(matches!(err, NegotiationError::DownstreamRejected { .. }));
        assert!(!session.is_open());
    }

    #[test]
    fn test_renegotiation_closes_previous_session() {
        let (factory, mut session, template) = setup(EngineScript::default());
        let negotiator = CapabilityNegotiator::new(factory.descriptor(), &template);
        let settings = EncoderSettings::video();

        negotiator
            .negotiate(&mut session, &video_caps(PixelFormat::I420), &settings, None)
            .unwrap();
        negotiator
            .negotiate(&mut session, &video_caps(PixelFormat::Nv12), &settings, None)
            .unwrap();

        let stats = factory.stats();
        assert_eq!(stats.successful_opens(), 2);
        assert_eq!(stats.open_sessions(), 1);
    }

    #[test]
    fn test_negotiation_is_deterministic() {
        let (factory, mut session, template) = setup(EngineScript::default());
        let negotiator = CapabilityNegotiator::new(factory.descriptor(), &template);
        let settings = EncoderSettings::video();
        let offered = video_caps(PixelFormat::I420);

        let first = negotiator
            .negotiate(&mut session, &offered, &settings, None)
            .unwrap();
        let second = negotiator
            .negotiate(&mut session, &offered, &settings, None)
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_audio_settings_skip_video_fields() {
        let factory = ScriptedFactory::audio("mp2", AudioCodec::Mp2);
        let mut session = EncoderSession::new(factory.create(), "mp2", MediaKind::Audio);
        let template = Caps::any();
        let offered = Caps::new(AudioFormatCaps::s16().with_rate(44100).with_channels(2));

        let result = CapabilityNegotiator::new(factory.descriptor(), &template)
            .negotiate(&mut session, &offered, &EncoderSettings::audio(), None)
            .unwrap();

        assert!(matches!(result.output, MediaFormat::Audio(a) if a.sample_rate == 44100));
        let ctx = session.context();
        assert_eq!(ctx.bit_rate, 128_000);
        assert_eq!(ctx.gop_size, EngineContext::default().gop_size);
        assert_eq!(ctx.frame_size, 1152);
    }
}
