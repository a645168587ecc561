//! Discovery of the input formats an engine accepts.
//!
//! Engines rarely advertise which pixel formats they take. [`FormatProbe`]
//! finds out by opening a throwaway session per candidate format and keeping
//! the ones that open cleanly. The result is memoized per encoder variant in a
//! [`CapabilityCache`].

use std::sync::OnceLock;

use crate::clock::TimeBase;
use crate::codecmap::{raw_video_caps, template_sink_caps};
use crate::config::DEFAULT_VIDEO_BITRATE;
use crate::engine::{EngineContext, EngineFactory};
use crate::format::{Caps, MediaKind, PixelFormat};

/// Picture width used for trial sessions.
pub const PROBE_WIDTH: u32 = 352;

/// Picture height used for trial sessions.
pub const PROBE_HEIGHT: u32 = 288;

/// Time base used for trial sessions (25 fps).
pub const PROBE_TIME_BASE: TimeBase = TimeBase::new(1, 25);

/// Opens trial sessions to find the accepted input formats.
pub struct FormatProbe<'a> {
    factory: &'a dyn EngineFactory,
    quiet: bool,
}

impl<'a> FormatProbe<'a> {
    /// Create a probe for one codec. Engine diagnostics are suppressed.
    pub fn new(factory: &'a dyn EngineFactory) -> Self {
        Self {
            factory,
            quiet: true,
        }
    }

    /// Whether trial opens suppress engine diagnostics.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Caps of every accepted input format, in enumeration order.
    ///
    /// Video codecs are probed once per pixel format; audio codecs take the
    /// full template without probing. The result may be empty.
    pub fn discover(&self) -> Caps {
        let descriptor = self.factory.descriptor();
        match descriptor.kind() {
            MediaKind::Audio => template_sink_caps(MediaKind::Audio),
            MediaKind::Video => {
                let mut caps = Caps::empty();
                for pixel_format in PixelFormat::ALL {
                    if self.accepts(pixel_format) {
                        caps.push(raw_video_caps(pixel_format));
                    }
                }
                tracing::debug!(
                    codec = %descriptor.name,
                    formats = caps.len(),
                    "pixel format probe finished"
                );
                caps
            }
        }
    }

    /// Whether the engine opens with `pixel_format` without substituting it.
    ///
    /// The trial session is always closed before returning.
    pub fn accepts(&self, pixel_format: PixelFormat) -> bool {
        let mut engine = self.factory.create();
        let mut ctx = Self::trial_context(pixel_format);

        let accepted = match engine.open(&mut ctx, self.quiet) {
            Ok(()) => ctx.pix_fmt == Some(pixel_format),
            Err(err) => {
                tracing::trace!(format = %pixel_format, error = %err, "probe open failed");
                false
            }
        };
        engine.close();

        tracing::trace!(
            codec = %self.factory.descriptor().name,
            format = %pixel_format,
            accepted,
            "probed pixel format"
        );
        accepted
    }

    fn trial_context(pixel_format: PixelFormat) -> EngineContext {
        EngineContext {
            width: PROBE_WIDTH,
            height: PROBE_HEIGHT,
            pix_fmt: Some(pixel_format),
            time_base: Some(PROBE_TIME_BASE),
            bit_rate: DEFAULT_VIDEO_BITRATE,
            strict_std_compliance: EngineContext::STRICT_EXPERIMENTAL,
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for FormatProbe<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatProbe")
            .field("codec", &self.factory.descriptor().name)
            .field("quiet", &self.quiet)
            .finish()
    }
}

/// Memoized probe result for one encoder variant.
///
/// Populated at most once, even when several elements of the same variant
/// query it concurrently. Never invalidated.
#[derive(Debug, Default)]
pub struct CapabilityCache {
    caps: OnceLock<Caps>,
}

impl CapabilityCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached caps, if a probe already ran.
    pub fn get(&self) -> Option<&Caps> {
        self.caps.get()
    }

    /// Whether a probe already ran.
    pub fn is_populated(&self) -> bool {
        self.caps.get().is_some()
    }

    /// The cached caps, probing first if needed.
    ///
    /// An empty probe result is replaced by `template`, and that is what gets
    /// cached.
    pub fn get_or_probe(&self, probe: &FormatProbe<'_>, template: &Caps) -> &Caps {
        self.caps.get_or_init(|| {
            let discovered = probe.discover();
            if discovered.is_empty() {
                tracing::warn!(
                    codec = %probe.factory.descriptor().name,
                    "no input format opened, using template caps"
                );
                template.clone()
            } else {
                discovered
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{EngineScript, ScriptedFactory};
    use crate::format::{AudioCodec, FormatCaps, VideoCodec};

    fn pixel_formats(caps: &Caps) -> Vec<PixelFormat> {
        caps.iter()
            .filter_map(|s| match s {
                FormatCaps::VideoRaw(v) => v.pixel_format.as_fixed().copied(),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_probe_keeps_accepted_formats_in_order() {
        let factory = ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4).with_script(
            EngineScript::default().accept_only(&[PixelFormat::Rgb24, PixelFormat::I420]),
        );
        let caps = FormatProbe::new(&factory).discover();

        assert_eq!(pixel_formats(&caps), vec![PixelFormat::I420, PixelFormat::Rgb24]);

        let stats = factory.stats();
        assert_eq!(stats.opens(), PixelFormat::ALL.len());
        assert_eq!(stats.quiet_opens(), PixelFormat::ALL.len());
        assert_eq!(stats.open_sessions(), 0);
    }

    #[test]
    fn test_probe_rejects_substituted_format() {
        let factory = ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4).with_script(
            EngineScript::default()
                .accept_only(&[PixelFormat::I420])
                .substitute(PixelFormat::Nv12, PixelFormat::I420),
        );
        let probe = FormatProbe::new(&factory);
        assert!(probe.accepts(PixelFormat::I420));
        assert!(!probe.accepts(PixelFormat::Nv12));
        assert_eq!(factory.stats().open_sessions(), 0);
    }

    #[test]
    fn test_trial_context() {
        let factory = ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4);
        FormatProbe::new(&factory).quiet(false).accepts(PixelFormat::I420);

        let stats = factory.stats();
        assert_eq!(stats.quiet_opens(), 0);
        let ctx = stats.last_context().unwrap();
        assert_eq!((ctx.width, ctx.height), (PROBE_WIDTH, PROBE_HEIGHT));
        assert_eq!(ctx.time_base, Some(PROBE_TIME_BASE));
        assert_eq!(ctx.bit_rate, DEFAULT_VIDEO_BITRATE);
        assert_eq!(ctx.strict_std_compliance, -1);
    }

    #[test]
    fn test_audio_skips_probing() {
        let factory = ScriptedFactory::audio("mp2", AudioCodec::Mp2);
        let caps = FormatProbe::new(&factory).discover();

        assert_eq!(caps, template_sink_caps(MediaKind::Audio));
        assert_eq!(factory.stats().created(), 0);
    }

    #[test]
    fn test_cache_probes_once() {
        let factory = ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4)
            .with_script(EngineScript::default().accept_only(&[PixelFormat::Yuyv]));
        let cache = CapabilityCache::new();
        let template = template_sink_caps(MediaKind::Video);
        assert!(!cache.is_populated());

        let probe = FormatProbe::new(&factory);
        let first = cache.get_or_probe(&probe, &template).clone();
        let second = cache.get_or_probe(&probe, &template).clone();

        assert_eq!(first, second);
        assert_eq!(pixel_formats(&first), vec![PixelFormat::Yuyv]);
        assert_eq!(factory.stats().created(), PixelFormat::ALL.len());
    }

    #[test]
    fn test_cache_falls_back_to_template() {
        let factory = ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4)
            .with_script(EngineScript::default().reject_open());
        let cache = CapabilityCache::new();
        let template = template_sink_caps(MediaKind::Video);

        let caps = cache.get_or_probe(&FormatProbe::new(&factory), &template);
        assert_eq!(caps, &template);
        assert_eq!(cache.get(), Some(&template));
    }
}
