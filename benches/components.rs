//! Component-level microbenchmarks for pngine.
//! Focuses on DEFLATE, inflate, filtering, checksums and the PNG codec.

use std::io::Write;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pngine::compress::{adler32, crc32, deflate, deflate_zlib, DeflateStrategy, ZlibEncoder};
use pngine::decode::inflate_zlib;
use pngine::memory::MemoryAllocator;
use pngine::png::filter::RowFilter;
use pngine::png::{FilterStrategy, InterlaceMethod, PngOptions};
use pngine::ColorType;

fn make_pattern(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    while out.len() < len {
        out.extend_from_slice(pattern);
    }
    out.truncate(len);
    out
}

fn make_random(len: usize, mut seed: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
        out.push((seed >> 16) as u8);
    }
    out.truncate(len);
    out
}

fn gradient_image(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let r = ((x * 255) / width) as u8;
            let g = ((y * 255) / height) as u8;
            let b = (((x + y) * 127) / (width + height)) as u8;
            pixels.extend_from_slice(&[r, g, b]);
        }
    }
    pixels
}

fn bench_deflate(c: &mut Criterion) {
    let compressible = make_pattern(1 << 20);
    let random = make_random(1 << 20, 0x1234_5678);

    let mut group = c.benchmark_group("deflate");
    group.throughput(Throughput::Bytes(compressible.len() as u64));

    for level in [1u8, 6, 9] {
        group.bench_with_input(
            BenchmarkId::new("compressible", level),
            &compressible,
            |b, data| b.iter(|| black_box(deflate(black_box(data), level))),
        );
    }
    group.bench_with_input(BenchmarkId::new("random", 6), &random, |b, data| {
        b.iter(|| black_box(deflate(black_box(data), 6)))
    });

    group.bench_with_input(
        BenchmarkId::new("streaming_filtered", 6),
        &compressible,
        |b, data| {
            b.iter(|| {
                let mut encoder =
                    ZlibEncoder::with_strategy(Vec::new(), 6, DeflateStrategy::Filtered).unwrap();
                for piece in data.chunks(4096) {
                    encoder.write_all(piece).unwrap();
                }
                black_box(encoder.finish().unwrap())
            });
        },
    );

    group.finish();
}

fn bench_inflate(c: &mut Criterion) {
    let compressible = deflate_zlib(&make_pattern(1 << 20), 6);
    let random = deflate_zlib(&make_random(1 << 20, 0x9E37_79B9), 6);

    let mut group = c.benchmark_group("inflate");
    group.throughput(Throughput::Bytes(1 << 20));

    group.bench_function("compressible_1mb", |b| {
        b.iter(|| black_box(inflate_zlib(black_box(&compressible)).unwrap()));
    });
    group.bench_function("random_1mb", |b| {
        b.iter(|| black_box(inflate_zlib(black_box(&random)).unwrap()));
    });

    group.finish();
}

fn bench_filters(c: &mut Criterion) {
    let width = 512;
    let height = 512;
    let pixels = gradient_image(width, height);
    let row_len = width as usize * 3;

    let mut group = c.benchmark_group("png_filters");
    group.throughput(Throughput::Bytes(pixels.len() as u64));

    let allocator = MemoryAllocator::new();
    for (name, strategy) in [
        ("sub_512_rgb", FilterStrategy::Sub),
        ("paeth_512_rgb", FilterStrategy::Paeth),
        ("adaptive_512_rgb", FilterStrategy::Adaptive),
    ] {
        group.bench_function(name, |b| {
            let mut filter = RowFilter::new(&allocator, strategy, 3, row_len);
            let zero = vec![0u8; row_len];
            b.iter(|| {
                let mut prev: &[u8] = &zero;
                for row in pixels.chunks_exact(row_len) {
                    black_box(filter.filter(row, prev));
                    prev = row;
                }
            });
        });
    }

    group.finish();
}

fn bench_checksums(c: &mut Criterion) {
    let data = make_random(1 << 20, 0xDEAD_BEEF);

    let mut group = c.benchmark_group("checksums");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("adler32_1mb", |b| {
        b.iter(|| black_box(adler32(black_box(&data))));
    });

    group.bench_function("crc32_1mb", |b| {
        b.iter(|| black_box(crc32(black_box(&data))));
    });

    group.finish();
}

fn bench_png(c: &mut Criterion) {
    let width = 512;
    let height = 512;
    let pixels = gradient_image(width, height);

    let mut group = c.benchmark_group("png_512_rgb");
    group.throughput(Throughput::Bytes(pixels.len() as u64));

    let presets = [
        ("fast", PngOptions::fast(width, height)),
        ("balanced", PngOptions::balanced(width, height)),
        ("max", PngOptions::max_compression(width, height)),
    ];
    for (name, mut options) in presets {
        options.color_type = ColorType::Rgb;
        group.bench_function(format!("encode_{name}"), |b| {
            b.iter(|| black_box(pngine::png::encode(black_box(&pixels), &options).unwrap()));
        });
    }

    let plain = PngOptions::builder(width, height)
        .color_type(ColorType::Rgb)
        .build();
    let interlaced = PngOptions::builder(width, height)
        .color_type(ColorType::Rgb)
        .interlace(InterlaceMethod::Adam7)
        .build();
    let plain = pngine::png::encode(&pixels, &plain).unwrap();
    let interlaced = pngine::png::encode(&pixels, &interlaced).unwrap();

    group.bench_function("decode", |b| {
        b.iter(|| black_box(pngine::decode::decode(black_box(&plain)).unwrap()));
    });
    group.bench_function("decode_adam7", |b| {
        b.iter(|| black_box(pngine::decode::decode(black_box(&interlaced)).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_deflate,
    bench_inflate,
    bench_filters,
    bench_checksums,
    bench_png
);
criterion_main!(benches);
