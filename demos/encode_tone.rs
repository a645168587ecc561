//! # Encode a Tone
//!
//! Generates one second of a 440 Hz stereo tone in odd-sized buffers and
//! pushes it through an MP2 encoder element.
//!
//! ```text
//! [tone generator] → [avenc_mp2] → [AppSink]
//! ```
//!
//! Run: `cargo run --example encode_tone`
//! With FFmpeg: `cargo run --example encode_tone --features ffmpeg`

use std::f32::consts::TAU;

use avenc::format::AudioFormatCaps;
use avenc::prelude::*;

const RATE: u32 = 44100;
const CHANNELS: u16 = 2;
const CHUNK_SAMPLES: usize = 1000;

fn registry() -> Result<EncoderRegistry> {
    #[cfg(feature = "ffmpeg")]
    {
        EncoderRegistry::with_ffmpeg()
    }
    #[cfg(not(feature = "ffmpeg"))]
    {
        use avenc::engine::testing::ScriptedFactory;
        use avenc::format::AudioCodec;
        use std::sync::Arc;

        let mut registry = EncoderRegistry::new();
        registry.register(Arc::new(ScriptedFactory::audio("mp2", AudioCodec::Mp2)));
        Ok(registry)
    }
}

fn tone_chunk(start: usize, samples: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples * CHANNELS as usize * 2);
    for n in start..start + samples {
        let value = ((n as f32 * 440.0 * TAU / RATE as f32).sin() * 8000.0) as i16;
        for _ in 0..CHANNELS {
            data.extend_from_slice(&value.to_le_bytes());
        }
    }
    data
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("avenc=debug")
        .init();

    let registry = registry()?;
    println!("Available encoders: {}", registry.names().join(", "));

    let mut encoder = registry.make("avenc_mp2")?;
    let sink = AppSink::new();
    let output = sink.handle();
    encoder.link(Box::new(sink));
    encoder.set_state(ElementState::Playing);

    let caps = Caps::new(AudioFormatCaps::s16().with_rate(RATE).with_channels(CHANNELS));
    if !encoder.set_caps(&caps) {
        return Err(Error::Config(format!("encoder refused {caps}")));
    }

    let mut position = 0;
    while position < RATE as usize {
        let samples = CHUNK_SAMPLES.min(RATE as usize - position);
        let metadata = Metadata::from_pts(ClockTime::from_nanos(
            position as u64 * 1_000_000_000 / RATE as u64,
        ))
        .with_duration(ClockTime::from_nanos(samples as u64 * 1_000_000_000 / RATE as u64));

        let flow = encoder.chain(Buffer::from_vec(tone_chunk(position, samples), metadata))?;
        if !flow.is_ok() {
            println!("Downstream stopped: {flow}");
            break;
        }
        position += samples;
    }
    encoder.handle_eos()?;

    let units = output.drain();
    let bytes: usize = units.iter().map(Buffer::len).sum();
    println!("Encoded {} units, {} bytes", units.len(), bytes);
    println!(
        "Compression: {:.1}%",
        encoder.stats().compression_ratio()
    );

    encoder.set_state(ElementState::Null);
    Ok(())
}
