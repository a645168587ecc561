//! Mapping between caps and engine configuration.
//!
//! Three directions are covered:
//!
//! - caps offered on the sink pad become engine context fields
//!   ([`caps_to_context`]);
//! - an open engine context plus a codec identity become the caps the encoder
//!   can produce ([`codec_to_caps`]);
//! - an engine context becomes the raw format it consumes
//!   ([`context_to_format`]).
//!
//! Template caps per media kind live here as well.

use crate::clock::TimeBase;
use crate::engine::{CodecId, EngineContext};
use crate::format::{
    AudioCodec, AudioFormat, AudioFormatCaps, Caps, CapsValue, EncodedAudioCaps,
    EncodedVideoCaps, FormatCaps, Framerate, MediaFormat, MediaKind, PixelFormat, SampleFormat,
    VideoCodec, VideoFormat, VideoFormatCaps,
};

/// Smallest picture dimension accepted on the sink pad.
pub const MIN_DIMENSION: u32 = 16;

/// Largest picture dimension accepted on the sink pad.
pub const MAX_DIMENSION: u32 = 4096;

/// Lowest audio sample rate accepted on the sink pad.
pub const MIN_SAMPLE_RATE: u32 = 8000;

/// Highest audio sample rate accepted on the sink pad.
pub const MAX_SAMPLE_RATE: u32 = 96000;

/// Frame sizes defined by the H.263 picture formats (sub-QCIF to 16CIF).
const H263_SIZES: [(u32, u32); 5] = [
    (128, 96),
    (176, 144),
    (352, 288),
    (704, 576),
    (1408, 1152),
];

/// Raw video caps for one pixel format with the sink-pad size bounds.
pub fn raw_video_caps(pixel_format: PixelFormat) -> VideoFormatCaps {
    VideoFormatCaps::any()
        .with_pixel_format(pixel_format)
        .with_size_range(MIN_DIMENSION, MAX_DIMENSION, MIN_DIMENSION, MAX_DIMENSION)
}

/// Sink-pad template caps for a media kind.
///
/// Video accepts every pixel format within the size bounds; audio accepts
/// interleaved 16-bit samples, mono or stereo.
pub fn template_sink_caps(kind: MediaKind) -> Caps {
    match kind {
        MediaKind::Video => Caps::new(
            VideoFormatCaps::any()
                .with_size_range(MIN_DIMENSION, MAX_DIMENSION, MIN_DIMENSION, MAX_DIMENSION),
        ),
        MediaKind::Audio => Caps::new(AudioFormatCaps {
            sample_rate: CapsValue::Range {
                min: MIN_SAMPLE_RATE,
                max: MAX_SAMPLE_RATE,
            },
            channels: CapsValue::Range { min: 1, max: 2 },
            sample_format: CapsValue::Fixed(SampleFormat::S16),
        }),
    }
}

/// Caps a codec can produce.
///
/// Without a context, the result is the codec's template: stream parameters
/// are open except where the codec itself restricts them. With a context,
/// every parameter the context has set is fixed to its value.
///
/// Returns `None` for codecs without a caps mapping.
pub fn codec_to_caps(codec: CodecId, ctx: Option<&EngineContext>) -> Option<Caps> {
    match codec {
        CodecId::Video(codec) => {
            let mut caps = video_template(codec);
            if let Some(ctx) = ctx {
                if ctx.width > 0 && ctx.height > 0 {
                    caps.width = CapsValue::Fixed(ctx.width);
                    caps.height = CapsValue::Fixed(ctx.height);
                }
                if let Some(tb) = ctx.time_base.filter(TimeBase::is_valid) {
                    caps.framerate = CapsValue::Fixed(Framerate::new(tb.den, tb.num));
                }
            }
            Some(Caps::new(caps))
        }
        CodecId::Audio(codec) => {
            let mut caps = audio_template(codec);
            if let Some(ctx) = ctx {
                if ctx.sample_rate > 0 {
                    caps.sample_rate = CapsValue::Fixed(ctx.sample_rate);
                }
                if ctx.channels > 0 {
                    caps.channels = CapsValue::Fixed(ctx.channels);
                }
            }
            Some(Caps::new(caps))
        }
        CodecId::RawVideo | CodecId::Zlib | CodecId::Pcm | CodecId::Unmapped(_) => None,
    }
}

fn video_template(codec: VideoCodec) -> EncodedVideoCaps {
    let mut caps = EncodedVideoCaps::any(codec);
    if codec == VideoCodec::H263 {
        caps.width = CapsValue::List(H263_SIZES.iter().map(|&(w, _)| w).collect());
        caps.height = CapsValue::List(H263_SIZES.iter().map(|&(_, h)| h).collect());
    }
    caps
}

fn audio_template(codec: AudioCodec) -> EncodedAudioCaps {
    let mut caps = EncodedAudioCaps::any(codec);
    if codec == AudioCodec::AmrNb {
        caps.sample_rate = CapsValue::Fixed(8000);
        caps.channels = CapsValue::Fixed(1);
    }
    caps
}

/// Apply the preferred structure of `caps` to the engine context.
///
/// Video needs a fixed size and pixel format; a fixed framerate sets the
/// time base, otherwise it is left for the caller to default. Audio needs a
/// fixed rate and channel count in 16-bit samples.
///
/// Returns the raw format the context now describes, or a reason why the
/// caps cannot be used.
pub fn caps_to_context(
    kind: MediaKind,
    caps: &Caps,
    ctx: &mut EngineContext,
) -> std::result::Result<MediaFormat, String> {
    let structure = caps.first().ok_or_else(|| "caps are empty".to_string())?;

    match (kind, structure) {
        (MediaKind::Video, FormatCaps::VideoRaw(video)) => {
            let width = fixed(&video.width, "width")?;
            let height = fixed(&video.height, "height")?;
            let pixel_format = fixed(&video.pixel_format, "pixel format")?;
            if width == 0 || height == 0 {
                return Err(format!("invalid picture size {width}x{height}"));
            }

            ctx.width = width;
            ctx.height = height;
            ctx.pix_fmt = Some(pixel_format);

            let framerate = match video.framerate.as_fixed() {
                Some(fr) if fr.num > 0 && fr.den > 0 => {
                    ctx.time_base = Some(TimeBase::new(fr.den, fr.num));
                    *fr
                }
                _ => Framerate::default(),
            };

            Ok(MediaFormat::VideoRaw(VideoFormat::new(
                width,
                height,
                pixel_format,
                framerate,
            )))
        }
        (MediaKind::Audio, FormatCaps::AudioRaw(audio)) => {
            let sample_rate = fixed(&audio.sample_rate, "rate")?;
            let channels = fixed(&audio.channels, "channels")?;
            let sample_format = audio.sample_format.fixate_with_default(SampleFormat::S16);
            if sample_format != SampleFormat::S16 {
                return Err(format!("unsupported sample format {sample_format:?}"));
            }
            if sample_rate == 0 || channels == 0 {
                return Err(format!("invalid audio layout {sample_rate} Hz x {channels}"));
            }

            ctx.sample_rate = sample_rate;
            ctx.channels = channels;
            ctx.sample_fmt = sample_format;
            ctx.time_base = Some(TimeBase::new(1, sample_rate));

            Ok(MediaFormat::AudioRaw(AudioFormat::new(
                sample_rate,
                channels,
                sample_format,
            )))
        }
        (kind, other) => Err(format!("expected raw {kind} caps, got {other}")),
    }
}

/// Raw input format described by an engine context, if complete.
pub fn context_to_format(kind: MediaKind, ctx: &EngineContext) -> Option<MediaFormat> {
    match kind {
        MediaKind::Video => {
            let pixel_format = ctx.pix_fmt?;
            if ctx.width == 0 || ctx.height == 0 {
                return None;
            }
            let framerate = ctx
                .time_base
                .filter(TimeBase::is_valid)
                .map(|tb| Framerate::new(tb.den, tb.num))
                .unwrap_or_default();
            Some(MediaFormat::VideoRaw(VideoFormat::new(
                ctx.width,
                ctx.height,
                pixel_format,
                framerate,
            )))
        }
        MediaKind::Audio => (ctx.sample_rate > 0 && ctx.channels > 0).then(|| {
            MediaFormat::AudioRaw(AudioFormat::new(ctx.sample_rate, ctx.channels, ctx.sample_fmt))
        }),
    }
}

/// Caps for the raw format of an engine context.
pub fn context_to_caps(kind: MediaKind, ctx: &EngineContext) -> Option<Caps> {
    context_to_format(kind, ctx).map(Caps::from)
}

fn fixed<T: Clone + Ord>(value: &CapsValue<T>, field: &str) -> std::result::Result<T, String> {
    value
        .as_fixed()
        .cloned()
        .ok_or_else(|| format!("{field} is not fixed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offered_video() -> Caps {
        Caps::new(
            VideoFormatCaps::any()
                .with_pixel_format(PixelFormat::I420)
                .with_size(320, 240)
                .with_framerate(Framerate::FPS_30),
        )
    }

    #[test]
    fn test_video_caps_to_context() {
        let mut ctx = EngineContext::default();
        let format = caps_to_context(MediaKind::Video, &offered_video(), &mut ctx).unwrap();

        assert_eq!(ctx.width, 320);
        assert_eq!(ctx.height, 240);
        assert_eq!(ctx.pix_fmt, Some(PixelFormat::I420));
        assert_eq!(ctx.time_base, Some(TimeBase::new(1, 30)));
        assert_eq!(format.buffer_size(), Some(320 * 240 * 3 / 2));
    }

    #[test]
    fn test_video_without_framerate_leaves_time_base() {
        let caps = Caps::new(
            VideoFormatCaps::any()
                .with_pixel_format(PixelFormat::Rgb24)
                .with_size(64, 64),
        );
        let mut ctx = EngineContext::default();
        caps_to_context(MediaKind::Video, &caps, &mut ctx).unwrap();
        assert_eq!(ctx.time_base, None);
    }

    #[test]
    fn test_unfixed_size_rejected() {
        let caps = Caps::new(raw_video_caps(PixelFormat::I420));
        let mut ctx = EngineContext::default();
        let err = caps_to_context(MediaKind::Video, &caps, &mut ctx).unwrap_err();
        assert!(err.contains("width"));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let mut ctx = EngineContext::default();
        assert!(caps_to_context(MediaKind::Audio, &offered_video(), &mut ctx).is_err());
        assert!(caps_to_context(MediaKind::Video, &Caps::empty(), &mut ctx).is_err());
    }

    #[test]
    fn test_audio_caps_to_context() {
        let caps = Caps::new(AudioFormatCaps::s16().with_rate(48000).with_channels(2));
        let mut ctx = EngineContext::default();
        caps_to_context(MediaKind::Audio, &caps, &mut ctx).unwrap();

        assert_eq!(ctx.sample_rate, 48000);
        assert_eq!(ctx.channels, 2);
        assert_eq!(ctx.audio_byte_rate(), 192_000);
    }

    #[test]
    fn test_float_audio_rejected() {
        let caps = Caps::new(AudioFormatCaps::fixed(AudioFormat::new(
            44100,
            2,
            SampleFormat::F32,
        )));
        let mut ctx = EngineContext::default();
        assert!(caps_to_context(MediaKind::Audio, &caps, &mut ctx).is_err());
    }

    #[test]
    fn test_codec_caps_from_context() {
        let mut ctx = EngineContext::default();
        caps_to_context(MediaKind::Video, &offered_video(), &mut ctx).unwrap();

        let caps = codec_to_caps(CodecId::Video(VideoCodec::Mpeg4), Some(&ctx)).unwrap();
        assert!(caps.is_fixed());
        match caps.fixate() {
            Some(MediaFormat::Video(v)) => {
                assert_eq!((v.width, v.height), (320, 240));
                assert_eq!(v.framerate, Framerate::FPS_30);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_codec_templates() {
        let h263 = codec_to_caps(CodecId::Video(VideoCodec::H263), None).unwrap();
        match h263.first() {
            Some(FormatCaps::Video(c)) => assert!(c.width.accepts(&176)),
            other => panic!("unexpected {other:?}"),
        }

        let amr = codec_to_caps(CodecId::Audio(AudioCodec::AmrNb), None).unwrap();
        assert!(amr.is_fixed());

        assert!(codec_to_caps(CodecId::Pcm, None).is_none());
        assert!(codec_to_caps(CodecId::Unmapped(MediaKind::Video), None).is_none());
    }

    #[test]
    fn test_context_to_format() {
        let mut ctx = EngineContext::default();
        assert!(context_to_format(MediaKind::Video, &ctx).is_none());

        caps_to_context(MediaKind::Video, &offered_video(), &mut ctx).unwrap();
        let caps = context_to_caps(MediaKind::Video, &ctx).unwrap();
        assert!(caps.is_fixed());
        assert!(template_sink_caps(MediaKind::Video).can_intersect(&caps));
    }
}
