//! Framing analysis and print preparation benchmarks.
//!
//! Run: cargo bench
//!
//! A framing tick has to finish well inside the 200 ms analysis interval.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::{ImageFormat, Rgba, RgbaImage};
use passport_photo::analysis::{FrameAnalyzer, FrameBuffer};
use passport_photo::capture::{Camera, CaptureConfig, MockCamera, MockScene};
use passport_photo::postprocess::{set_density, AspectPostProcessor, DocumentType, PhysicalDensity};
use std::io::Cursor;

fn bench_framing_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("framing_tick");

    for (width, height) in [(640, 480), (1280, 720), (1920, 1080)] {
        let mut camera = MockCamera::with_scene(MockScene::Face { coverage: 0.5 });
        camera
            .open(&CaptureConfig::with_dimensions(width, height))
            .unwrap();
        let frame = camera.capture().unwrap();
        let mut scratch = FrameBuffer::new();

        group.throughput(Throughput::Elements((width * height) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &frame,
            |b, frame| {
                b.iter(|| black_box(FrameAnalyzer::analyze(Some(frame), &mut scratch)));
            },
        );
    }

    group.finish();
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    });
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn bench_postprocess(c: &mut Criterion) {
    let mut group = c.benchmark_group("postprocess");
    group.sample_size(10);

    let landscape = png(1600, 1200);
    let processor = AspectPostProcessor::new();
    group.bench_function("passport_1600x1200", |b| {
        b.iter(|| black_box(processor.process_blocking(&landscape, DocumentType::Passport)));
    });

    let stamped = processor.process_blocking(&landscape, DocumentType::Passport);
    group.bench_function("density_splice", |b| {
        b.iter(|| black_box(set_density(&stamped, PhysicalDensity::from_dpi(300)).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_framing_tick, bench_postprocess);
criterion_main!(benches);
