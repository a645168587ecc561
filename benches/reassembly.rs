//! Benchmarks for audio frame reassembly and the element data path.

use std::hint::black_box;
use std::sync::Arc;

use avenc::buffer::Buffer;
use avenc::clock::ClockTime;
use avenc::element::{AppSink, ElementState};
use avenc::engine::testing::ScriptedFactory;
use avenc::flow::FlowReturn;
use avenc::format::{AudioCodec, AudioFormatCaps, Caps, PixelFormat, VideoCodec, VideoFormatCaps};
use avenc::metadata::Metadata;
use avenc::reassembly::FrameReassembler;
use avenc::registry::EncoderRegistry;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

/// Stereo 16-bit MP2 frame: 1152 samples.
const FRAME_BYTES: usize = 1152 * 2 * 2;

fn input(len: usize, seq: u64) -> Buffer {
    Buffer::from_vec(
        vec![0u8; len],
        Metadata::from_pts(ClockTime::from_millis(seq * 10))
            .with_duration(ClockTime::from_millis(10))
            .with_sequence(seq),
    )
}

fn bench_reassembler_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("reassembler_push");

    // Smaller than, unaligned to, and larger than one frame.
    for size in [1024, 4096, 4608, 16 * 1024].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut reassembler = FrameReassembler::new(FRAME_BYTES)
                .unwrap()
                .with_byte_rate(44100 * 4);
            let mut seq = 0;

            b.iter(|| {
                seq += 1;
                reassembler
                    .push(input(size, seq), |unit| {
                        black_box(unit);
                        Ok(FlowReturn::Ok)
                    })
                    .unwrap()
            });
        });
    }

    group.finish();
}

fn bench_audio_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("audio_chain");
    group.throughput(Throughput::Bytes(4096));

    let mut registry = EncoderRegistry::new();
    registry.register(Arc::new(ScriptedFactory::audio("mp2", AudioCodec::Mp2)));

    group.bench_function("mp2_4096", |b| {
        let mut encoder = registry.make("avenc_mp2").unwrap();
        let sink = AppSink::new();
        let output = sink.handle();
        encoder.link(Box::new(sink));
        encoder.set_state(ElementState::Playing);
        assert!(encoder.set_caps(&Caps::new(
            AudioFormatCaps::s16().with_rate(44100).with_channels(2)
        )));
        let mut seq = 0;

        b.iter(|| {
            seq += 1;
            black_box(encoder.chain(input(4096, seq)).unwrap());
            output.drain();
        });
    });

    group.finish();
}

fn bench_video_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("video_chain");

    let mut registry = EncoderRegistry::new();
    registry.register(Arc::new(ScriptedFactory::video("mpeg4", VideoCodec::Mpeg4)));

    for (width, height) in [(176u32, 144u32), (352, 288), (1280, 720)].iter() {
        let size = PixelFormat::I420.picture_size(*width, *height);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &(*width, *height),
            |b, &(width, height)| {
                let mut encoder = registry.make("avenc_mpeg4").unwrap();
                let sink = AppSink::new();
                let output = sink.handle();
                encoder.link(Box::new(sink));
                encoder.set_state(ElementState::Playing);
                assert!(encoder.set_caps(&Caps::new(
                    VideoFormatCaps::any()
                        .with_pixel_format(PixelFormat::I420)
                        .with_size(width, height)
                )));
                let mut seq = 0;

                b.iter(|| {
                    seq += 1;
                    black_box(encoder.chain(input(size, seq)).unwrap());
                    output.drain();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_reassembler_push,
    bench_audio_chain,
    bench_video_chain,
);
criterion_main!(benches);
