//! FFmpeg-backed codec engine.
//!
//! Wraps libavcodec encoders through `ffmpeg-next`. Each [`FfmpegFactory`]
//! stands for one encoder found in the linked FFmpeg build, and each
//! [`FfmpegEngine`] owns at most one opened encoder context.
//!
//! libavcodec works with a send/receive model: a frame may yield zero or
//! more packets. The engine queues received packets and hands out one per
//! encode call; the rest come out of later calls and [`CodecEngine::flush`].

use std::collections::VecDeque;
use std::sync::Arc;

use ffmpeg_next::{
    ChannelLayout as FFmpegChannelLayout, Dictionary, Rational as FFmpegRational,
    codec::{self, Id as CodecIdFFmpeg},
    encoder::{audio::Encoder as AudioEncoderFFmpeg, video::Encoder as VideoEncoderFFmpeg},
    ffi,
    format::{Pixel, Sample, sample::Type as SampleType},
    util::frame::{audio::Audio as AudioFrameFFmpeg, video::Video as VideoFrameFFmpeg},
};

use super::{
    AudioSamples, CodecDescriptor, CodecEngine, CodecId, EncodedUnit, EngineContext, EngineError,
    EngineFactory, Picture,
};
use crate::config::MotionEstimation;
use crate::format::{AudioCodec, MediaKind, PixelFormat, VideoCodec};

/// Samples per channel handed to encoders that accept any frame size.
pub const VARIABLE_FRAME_SIZE: usize = 1024;

/// Added to the context log level so that errors fall below the default
/// log threshold while probing.
const QUIET_LOG_OFFSET: i32 = 64;

const VIDEO_CODECS: [(VideoCodec, CodecIdFFmpeg); 15] = [
    (VideoCodec::Mpeg1, CodecIdFFmpeg::MPEG1VIDEO),
    (VideoCodec::Mpeg2, CodecIdFFmpeg::MPEG2VIDEO),
    (VideoCodec::Mpeg4, CodecIdFFmpeg::MPEG4),
    (VideoCodec::MsMpeg4, CodecIdFFmpeg::MSMPEG4V3),
    (VideoCodec::H263, CodecIdFFmpeg::H263),
    (VideoCodec::H263p, CodecIdFFmpeg::H263P),
    (VideoCodec::Flv1, CodecIdFFmpeg::FLV1),
    (VideoCodec::Wmv2, CodecIdFFmpeg::WMV2),
    (VideoCodec::Mjpeg, CodecIdFFmpeg::MJPEG),
    (VideoCodec::H264, CodecIdFFmpeg::H264),
    (VideoCodec::H265, CodecIdFFmpeg::HEVC),
    (VideoCodec::Vp8, CodecIdFFmpeg::VP8),
    (VideoCodec::Vp9, CodecIdFFmpeg::VP9),
    (VideoCodec::Av1, CodecIdFFmpeg::AV1),
    (VideoCodec::Theora, CodecIdFFmpeg::THEORA),
];

const AUDIO_CODECS: [(AudioCodec, CodecIdFFmpeg); 8] = [
    (AudioCodec::Mp2, CodecIdFFmpeg::MP2),
    (AudioCodec::Mp3, CodecIdFFmpeg::MP3),
    (AudioCodec::Aac, CodecIdFFmpeg::AAC),
    (AudioCodec::Ac3, CodecIdFFmpeg::AC3),
    (AudioCodec::Vorbis, CodecIdFFmpeg::VORBIS),
    (AudioCodec::Opus, CodecIdFFmpeg::OPUS),
    (AudioCodec::Flac, CodecIdFFmpeg::FLAC),
    (AudioCodec::AmrNb, CodecIdFFmpeg::AMR_NB),
];

/// Initialize FFmpeg and create a factory for every available encoder.
pub fn encoder_factories() -> Result<Vec<Arc<dyn EngineFactory>>, EngineError> {
    ffmpeg_next::init().map_err(|e| EngineError::Backend(e.to_string()))?;

    let video = VIDEO_CODECS.iter().map(|&(c, id)| (CodecId::Video(c), id));
    let audio = AUDIO_CODECS.iter().map(|&(c, id)| (CodecId::Audio(c), id));

    let factories: Vec<Arc<dyn EngineFactory>> = video
        .chain(audio)
        .filter_map(|(ours, id)| FfmpegFactory::find(ours, id))
        .map(|f| Arc::new(f) as Arc<dyn EngineFactory>)
        .collect();

    tracing::debug!(count = factories.len(), "found ffmpeg encoders");
    Ok(factories)
}

// ============================================================================
// Factory
// ============================================================================

/// Engine factory for one libavcodec encoder.
#[derive(Debug)]
pub struct FfmpegFactory {
    descriptor: CodecDescriptor,
    id: CodecIdFFmpeg,
}

impl FfmpegFactory {
    /// Look up the default encoder for `id`.
    ///
    /// FFmpeg must already be initialized.
    pub fn find(codec: CodecId, id: CodecIdFFmpeg) -> Option<Self> {
        let found = ffmpeg_next::encoder::find(id)?;
        let descriptor =
            CodecDescriptor::new(found.name(), codec).with_long_name(found.description());
        Some(Self { descriptor, id })
    }
}

impl EngineFactory for FfmpegFactory {
    fn descriptor(&self) -> &CodecDescriptor {
        &self.descriptor
    }

    fn create(&self) -> Box<dyn CodecEngine> {
        Box::new(FfmpegEngine::new(self.id, self.descriptor.kind()))
    }
}

// ============================================================================
// Engine
// ============================================================================

enum Opened {
    Video(VideoEncoderFFmpeg),
    Audio(AudioEncoderFFmpeg),
}

struct PendingPacket {
    data: Vec<u8>,
    key: bool,
}

/// One libavcodec encoder context.
pub struct FfmpegEngine {
    id: CodecIdFFmpeg,
    kind: MediaKind,
    opened: Option<Opened>,
    pending: VecDeque<PendingPacket>,
    draining: bool,
}

impl FfmpegEngine {
    fn new(id: CodecIdFFmpeg, kind: MediaKind) -> Self {
        Self {
            id,
            kind,
            opened: None,
            pending: VecDeque::new(),
            draining: false,
        }
    }

    fn open_video(&self, ctx: &mut EngineContext, quiet: bool) -> Result<Opened, EngineError> {
        let codec = ffmpeg_next::encoder::find(self.id)
            .ok_or_else(|| EngineError::Open(format!("encoder {:?} not found", self.id)))?;
        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| EngineError::Open(e.to_string()))?;

        let pix_fmt = ctx
            .pix_fmt
            .ok_or_else(|| EngineError::Open("no pixel format".into()))?;
        encoder.set_width(ctx.width);
        encoder.set_height(ctx.height);
        encoder.set_format(pixel_format_to_ffmpeg(pix_fmt));
        if let Some(tb) = ctx.time_base {
            encoder.set_time_base(rational(tb.num, tb.den));
            encoder.set_frame_rate(Some(rational(tb.den, tb.num)));
        }
        encoder.set_gop(ctx.gop_size);
        encoder.set_bit_rate(ctx.bit_rate as usize);

        // SAFETY: the context is owned by `encoder` and not yet opened.
        unsafe {
            let raw = encoder.as_mut_ptr();
            apply_common(raw, ctx, quiet);
            (*raw).rtp_payload_size = if ctx.rtp_mode { ctx.rtp_payload_size as i32 } else { 0 };
        }

        let mut opts = Dictionary::new();
        if let Some(method) = motion_est_option(ctx.me_method) {
            opts.set("motion_est", method);
        }

        let opened = encoder
            .open_with(opts)
            .map_err(|e| EngineError::Open(e.to_string()))?;

        // Report what the encoder actually uses.
        ctx.pix_fmt = pixel_format_from_ffmpeg(opened.format());
        Ok(Opened::Video(opened))
    }

    fn open_audio(&self, ctx: &mut EngineContext, quiet: bool) -> Result<Opened, EngineError> {
        let codec = ffmpeg_next::encoder::find(self.id)
            .ok_or_else(|| EngineError::Open(format!("encoder {:?} not found", self.id)))?;
        let mut encoder = codec::context::Context::new_with_codec(codec)
            .encoder()
            .audio()
            .map_err(|e| EngineError::Open(e.to_string()))?;

        let layout = channel_layout(ctx.channels)?;
        encoder.set_format(Sample::I16(SampleType::Packed));
        encoder.set_rate(ctx.sample_rate as i32);
        encoder.set_channel_layout(layout);
        encoder.set_time_base(rational(1, ctx.sample_rate));
        encoder.set_bit_rate(ctx.bit_rate as usize);

        // SAFETY: the context is owned by `encoder` and not yet opened.
        unsafe {
            apply_common(encoder.as_mut_ptr(), ctx, quiet);
        }

        let opened = encoder
            .open_with(Dictionary::new())
            .map_err(|e| EngineError::Open(e.to_string()))?;

        ctx.frame_size = match opened.frame_size() as usize {
            0 => VARIABLE_FRAME_SIZE,
            n => n,
        };
        Ok(Opened::Audio(opened))
    }

    /// Move every packet the encoder has ready into the queue.
    fn receive_packets(&mut self) -> Result<(), EngineError> {
        let encoder: &mut ffmpeg_next::encoder::Encoder = match self.opened.as_mut() {
            Some(Opened::Video(e)) => e,
            Some(Opened::Audio(e)) => e,
            None => return Err(EngineError::NotOpen),
        };

        let mut packet = ffmpeg_next::Packet::empty();
        loop {
            match encoder.receive_packet(&mut packet) {
                Ok(()) => self.pending.push_back(PendingPacket {
                    data: packet.data().map(<[u8]>::to_vec).unwrap_or_default(),
                    key: packet.is_key(),
                }),
                Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::AVERROR(ffi::EAGAIN) => {
                    break;
                }
                Err(ffmpeg_next::Error::Eof) => break,
                Err(e) => return Err(encode_error(e)),
            }
        }
        Ok(())
    }

    /// Hand out the oldest queued packet.
    ///
    /// Callers stamp outputs one per input, so packets an encoder emits in
    /// bursts are released on later calls and at flush.
    fn next_unit(&mut self, output: &mut [u8]) -> Result<Option<EncodedUnit>, EngineError> {
        if self.pending.len() > 1 && !self.draining {
            tracing::debug!(queued = self.pending.len(), "encoder emitted more than one packet");
        }
        let Some(packet) = self.pending.pop_front() else {
            return Ok(None);
        };
        if packet.data.len() > output.len() {
            return Err(EngineError::OutputTooSmall {
                needed: packet.data.len(),
                capacity: output.len(),
            });
        }
        output[..packet.data.len()].copy_from_slice(&packet.data);
        Ok(Some(EncodedUnit {
            size: packet.data.len(),
            key_frame: packet.key,
        }))
    }
}

impl CodecEngine for FfmpegEngine {
    fn open(&mut self, context: &mut EngineContext, quiet: bool) -> Result<(), EngineError> {
        self.close();
        let opened = match self.kind {
            MediaKind::Video => self.open_video(context, quiet)?,
            MediaKind::Audio => self.open_audio(context, quiet)?,
        };
        self.opened = Some(opened);
        Ok(())
    }

    fn close(&mut self) {
        self.opened = None;
        self.pending.clear();
        self.draining = false;
    }

    fn encode_video(
        &mut self,
        picture: &Picture<'_>,
        output: &mut [u8],
    ) -> Result<Option<EncodedUnit>, EngineError> {
        let Some(Opened::Video(encoder)) = self.opened.as_mut() else {
            return Err(EngineError::NotOpen);
        };

        let mut frame = VideoFrameFFmpeg::new(
            pixel_format_to_ffmpeg(picture.format),
            picture.width,
            picture.height,
        );
        copy_planes(&mut frame, picture)?;
        frame.set_pts(picture.pts);

        encoder.send_frame(&frame).map_err(encode_error)?;
        self.receive_packets()?;
        self.next_unit(output)
    }

    fn encode_audio(
        &mut self,
        samples: &AudioSamples<'_>,
        output: &mut [u8],
    ) -> Result<Option<EncodedUnit>, EngineError> {
        let Some(Opened::Audio(encoder)) = self.opened.as_mut() else {
            return Err(EngineError::NotOpen);
        };

        let mut frame = AudioFrameFFmpeg::new(
            Sample::I16(SampleType::Packed),
            samples.samples(),
            channel_layout(samples.channels)?,
        );
        frame.set_rate(samples.sample_rate);
        let plane = frame.data_mut(0);
        let len = samples.data.len().min(plane.len());
        plane[..len].copy_from_slice(&samples.data[..len]);
        frame.set_pts(samples.pts);

        encoder.send_frame(&frame).map_err(encode_error)?;
        self.receive_packets()?;
        self.next_unit(output)
    }

    fn flush(&mut self, output: &mut [u8]) -> Result<Option<EncodedUnit>, EngineError> {
        if !self.draining {
            let encoder: &mut ffmpeg_next::encoder::Encoder = match self.opened.as_mut() {
                Some(Opened::Video(e)) => e,
                Some(Opened::Audio(e)) => e,
                None => return Err(EngineError::NotOpen),
            };
            match encoder.send_eof() {
                Ok(()) | Err(ffmpeg_next::Error::Eof) => {}
                Err(e) => return Err(encode_error(e)),
            }
            self.draining = true;
            self.receive_packets()?;
        }
        self.next_unit(output)
    }
}

impl std::fmt::Debug for FfmpegEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegEngine")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("open", &self.opened.is_some())
            .field("pending", &self.pending.len())
            .finish()
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// Apply fields shared by audio and video contexts.
///
/// # Safety
///
/// `raw` must point to a valid, unopened codec context.
unsafe fn apply_common(raw: *mut ffi::AVCodecContext, ctx: &EngineContext, quiet: bool) {
    // SAFETY: guaranteed by the caller.
    unsafe {
        (*raw).bit_rate_tolerance = ctx.bit_rate_tolerance.min(i32::MAX as u64) as i32;
        (*raw).qmin = ctx.qmin as i32;
        (*raw).qmax = ctx.qmax as i32;
        (*raw).max_qdiff = ctx.max_qdiff as i32;
        (*raw).strict_std_compliance = ctx.strict_std_compliance;
        if quiet {
            (*raw).log_level_offset = QUIET_LOG_OFFSET;
        }
    }
}

fn rational(num: u32, den: u32) -> FFmpegRational {
    FFmpegRational::new(num as i32, den as i32)
}

fn encode_error(e: ffmpeg_next::Error) -> EngineError {
    match e {
        ffmpeg_next::Error::Other { errno } => EngineError::Encode { code: errno },
        other => EngineError::Backend(other.to_string()),
    }
}

fn channel_layout(channels: u16) -> Result<FFmpegChannelLayout, EngineError> {
    match channels {
        1 => Ok(FFmpegChannelLayout::MONO),
        2 => Ok(FFmpegChannelLayout::STEREO),
        n => Err(EngineError::Unsupported(format!("{n} channels"))),
    }
}

/// Motion-estimation option for the mpegvideo encoders.
///
/// Current libavcodec only keeps zero, epzs and xone.
fn motion_est_option(method: MotionEstimation) -> Option<&'static str> {
    match method {
        MotionEstimation::Zero => Some("zero"),
        MotionEstimation::Epzs => Some("epzs"),
        MotionEstimation::X1 => Some("xone"),
        MotionEstimation::Full | MotionEstimation::Log | MotionEstimation::Phods => None,
    }
}

fn pixel_format_to_ffmpeg(format: PixelFormat) -> Pixel {
    match format {
        PixelFormat::I420 => Pixel::YUV420P,
        PixelFormat::Nv12 => Pixel::NV12,
        PixelFormat::I420_10Le => Pixel::YUV420P10LE,
        PixelFormat::P010 => Pixel::P010LE,
        PixelFormat::I422 => Pixel::YUV422P,
        PixelFormat::Yuyv => Pixel::YUYV422,
        PixelFormat::Uyvy => Pixel::UYVY422,
        PixelFormat::I444 => Pixel::YUV444P,
        PixelFormat::Rgb24 => Pixel::RGB24,
        PixelFormat::Rgba => Pixel::RGBA,
        PixelFormat::Bgr24 => Pixel::BGR24,
        PixelFormat::Bgra => Pixel::BGRA,
        PixelFormat::Argb => Pixel::ARGB,
        PixelFormat::Gray8 => Pixel::GRAY8,
        PixelFormat::Gray16Le => Pixel::GRAY16LE,
    }
}

fn pixel_format_from_ffmpeg(format: Pixel) -> Option<PixelFormat> {
    PixelFormat::ALL
        .into_iter()
        .find(|&pf| pixel_format_to_ffmpeg(pf) == format)
}

/// Copy tightly packed planes into a frame with padded strides.
fn copy_planes(dst: &mut VideoFrameFFmpeg, picture: &Picture<'_>) -> Result<(), EngineError> {
    let layouts = picture.format.planes(picture.width, picture.height);
    let expected: usize = layouts.iter().map(|p| p.size()).sum();
    if picture.data.len() < expected {
        return Err(EngineError::Backend(format!(
            "picture has {} bytes, expected {expected}",
            picture.data.len()
        )));
    }

    let mut offset = 0;
    for (index, layout) in layouts.iter().enumerate() {
        let stride = dst.stride(index);
        let plane = dst.data_mut(index);
        for row in 0..layout.rows {
            let src = &picture.data[offset + row * layout.row_bytes..][..layout.row_bytes];
            plane[row * stride..][..layout.row_bytes].copy_from_slice(src);
        }
        offset += layout.size();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_mapping_is_bijective() {
        for pf in PixelFormat::ALL {
            assert_eq!(pixel_format_from_ffmpeg(pixel_format_to_ffmpeg(pf)), Some(pf));
        }
        assert_eq!(pixel_format_from_ffmpeg(Pixel::YUV410P), None);
    }

    #[test]
    fn test_motion_estimation_options() {
        assert_eq!(motion_est_option(MotionEstimation::Epzs), Some("epzs"));
        assert_eq!(motion_est_option(MotionEstimation::Log), None);
    }

    #[test]
    fn test_channel_layouts() {
        assert!(channel_layout(1).is_ok());
        assert!(channel_layout(2).is_ok());
        assert!(matches!(channel_layout(6), Err(EngineError::Unsupported(_))));
    }
}
