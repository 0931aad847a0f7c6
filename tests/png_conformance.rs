//! PNG conformance tests.
//!
//! Tests PNG encoding against expected output and validates
//! that encoded images can be decoded correctly, by this crate and by the
//! `image` crate.

use std::io::Cursor;

use pngine::compress::{crc32, deflate_zlib};
use pngine::decode::{decode, decode_with_options, CrcHandling, DecoderOptions};
use pngine::png::filter::{encode_filter, unfilter_row, FilterType};
use pngine::png::{self, FilterStrategy, InterlaceMethod, PngOptions};
use pngine::{BitDepth, ColorType, Error};
use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

const SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

fn options(width: u32, height: u32, color_type: ColorType) -> PngOptions {
    PngOptions::builder(width, height)
        .color_type(color_type)
        .build()
}

fn raw_chunk(out: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(chunk_type);
    out.extend_from_slice(data);
    let mut crc_input = chunk_type.to_vec();
    crc_input.extend_from_slice(data);
    out.extend_from_slice(&crc32(&crc_input).to_be_bytes());
}

fn ihdr(width: u32, height: u32, depth: u8, color: u8) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&[depth, color, 0, 0, 0]);
    data
}

/// Random samples valid for the given color type and depth.
fn random_samples(rng: &mut StdRng, width: u32, height: u32, ct: ColorType, depth: BitDepth) -> Vec<u8> {
    let count = (width * height) as usize * ct.channels() * depth.sample_bytes();
    let max = match depth {
        BitDepth::Eight | BitDepth::Sixteen => 255u8,
        other => other.max_value() as u8,
    };
    (0..count).map(|_| rng.gen_range(0..=max)).collect()
}

/// Test that PNG output has correct header.
#[test]
fn test_png_signature() {
    let result = png::encode(&[255, 0, 0], &options(1, 1, ColorType::Rgb)).unwrap();
    assert_eq!(&result[0..8], &SIGNATURE);
}

/// Test IHDR chunk format.
#[test]
fn test_ihdr_chunk() {
    let pixels = vec![0u8; 100 * 100 * 3];
    let result = png::encode(&pixels, &options(100, 100, ColorType::Rgb)).unwrap();

    assert_eq!(&result[8..12], &[0, 0, 0, 13]);
    assert_eq!(&result[12..16], b"IHDR");
    assert_eq!(&result[16..20], &[0, 0, 0, 100]);
    assert_eq!(&result[20..24], &[0, 0, 0, 100]);
    // Bit depth, color type, compression, filter and interlace method.
    assert_eq!(&result[24..29], &[8, 2, 0, 0, 0]);
    assert_eq!(
        &result[29..33],
        &crc32(&result[12..29]).to_be_bytes(),
        "IHDR CRC"
    );
}

/// Test that IEND chunk is present at end.
#[test]
fn test_iend_chunk() {
    let pixels = vec![128u8; 10 * 10 * 3];
    let result = png::encode(&pixels, &options(10, 10, ColorType::Rgb)).unwrap();

    let iend_start = result.len() - 12;
    assert_eq!(&result[iend_start..iend_start + 4], &[0, 0, 0, 0]);
    assert_eq!(&result[iend_start + 4..iend_start + 8], b"IEND");
    assert_eq!(
        &result[iend_start + 8..iend_start + 12],
        &[0xAE, 0x42, 0x60, 0x82]
    );
}

/// Test encoding different color types.
#[test]
fn test_color_types() {
    let cases = [
        (ColorType::Gray, 0u8),
        (ColorType::GrayAlpha, 4),
        (ColorType::Rgb, 2),
        (ColorType::Rgba, 6),
    ];
    for (ct, code) in cases {
        let pixels = vec![128u8; 4 * 4 * ct.channels()];
        let result = png::encode(&pixels, &options(4, 4, ct)).unwrap();
        assert_eq!(result[25], code, "{ct:?}");
    }
}

/// Encode a 1x1 RGB pixel without filtering and read it back.
#[test]
fn test_single_rgb_pixel() {
    let opts = PngOptions::builder(1, 1)
        .color_type(ColorType::Rgb)
        .filter_strategy(FilterStrategy::None)
        .build();
    let encoded = png::encode(&[10, 20, 30], &opts).unwrap();
    let decoded = decode(&encoded).unwrap();
    assert_eq!(decoded.width(), 1);
    assert_eq!(decoded.height(), 1);
    assert_eq!(decoded.image.pixel(0, 0), &[10, 20, 30]);
}

/// A header followed directly by IEND has no image data.
#[test]
fn test_missing_image_data() {
    let mut png = SIGNATURE.to_vec();
    raw_chunk(&mut png, b"IHDR", &ihdr(4, 4, 8, 2));
    raw_chunk(&mut png, b"IEND", &[]);
    assert!(matches!(decode(&png), Err(Error::NoImageData)));
}

/// 4-bit palette indices survive packing and unpacking.
#[test]
fn test_four_bit_palette_roundtrip() {
    let palette: Vec<[u8; 3]> = (0..16u8).map(|i| [i * 16, 255 - i * 16, i]).collect();
    let indices: Vec<u8> = (0..7 * 5).map(|i| (i * 5 % 16) as u8).collect();
    for interlace in [InterlaceMethod::None, InterlaceMethod::Adam7] {
        let opts = PngOptions::builder(7, 5)
            .bit_depth(BitDepth::Four)
            .interlace(interlace)
            .build();
        let encoded = png::encode_indexed(&indices, &palette, None, &opts).unwrap();
        assert_eq!(&encoded[24..26], &[4, 3]);

        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.header.bit_depth, BitDepth::Four);
        assert_eq!(decoded.image.as_bytes(), &indices[..]);
        assert_eq!(decoded.palette.as_deref(), Some(&palette[..]));
    }
}

/// Every legal color type and depth, both interlace methods, every filter.
#[test]
fn test_roundtrip_all_formats() {
    let mut rng = StdRng::seed_from_u64(7);
    let formats: &[(ColorType, &[BitDepth])] = &[
        (
            ColorType::Gray,
            &[
                BitDepth::One,
                BitDepth::Two,
                BitDepth::Four,
                BitDepth::Eight,
                BitDepth::Sixteen,
            ],
        ),
        (ColorType::GrayAlpha, &[BitDepth::Eight, BitDepth::Sixteen]),
        (ColorType::Rgb, &[BitDepth::Eight, BitDepth::Sixteen]),
        (ColorType::Rgba, &[BitDepth::Eight, BitDepth::Sixteen]),
    ];
    let filters = [
        FilterStrategy::None,
        FilterStrategy::Sub,
        FilterStrategy::Up,
        FilterStrategy::Average,
        FilterStrategy::Paeth,
        FilterStrategy::Adaptive,
    ];

    for &(ct, depths) in formats {
        for &depth in depths {
            for interlace in [InterlaceMethod::None, InterlaceMethod::Adam7] {
                for (i, &filter) in filters.iter().enumerate() {
                    let (w, h) = [(1, 1), (3, 2), (9, 9), (13, 4), (2, 17), (33, 7)][i];
                    let pixels = random_samples(&mut rng, w, h, ct, depth);
                    let opts = PngOptions::builder(w, h)
                        .color_type(ct)
                        .bit_depth(depth)
                        .interlace(interlace)
                        .filter_strategy(filter)
                        .build();
                    let encoded = png::encode(&pixels, &opts).unwrap();
                    let decoded = decode(&encoded).unwrap();
                    assert_eq!(
                        decoded.image.as_bytes(),
                        &pixels[..],
                        "{ct:?} {depth:?} {interlace:?} {filter:?} {w}x{h}"
                    );
                }
            }
        }
    }
}

/// Indexed images at every depth, with and without interlacing.
#[test]
fn test_roundtrip_indexed_depths() {
    let mut rng = StdRng::seed_from_u64(11);
    for depth in [BitDepth::One, BitDepth::Two, BitDepth::Four, BitDepth::Eight] {
        let entries = 1usize << depth.bits();
        let palette: Vec<[u8; 3]> = (0..entries).map(|_| rng.gen()).collect();
        for interlace in [InterlaceMethod::None, InterlaceMethod::Adam7] {
            let (w, h) = (11, 6);
            let indices: Vec<u8> = (0..w * h).map(|_| rng.gen_range(0..entries) as u8).collect();
            let opts = PngOptions::builder(w, h)
                .bit_depth(depth)
                .interlace(interlace)
                .build();
            let encoded = png::encode_indexed(&indices, &palette, None, &opts).unwrap();
            let decoded = decode(&encoded).unwrap();
            assert_eq!(decoded.image.as_bytes(), &indices[..], "{depth:?} {interlace:?}");
        }
    }
}

/// Corrupt CRCs: fatal on critical chunks, tolerated on ancillary ones.
#[test]
fn test_crc_enforcement() {
    let build = |corrupt: &[u8; 4]| {
        let mut png = SIGNATURE.to_vec();
        for (chunk_type, data) in [
            (b"IHDR", ihdr(2, 1, 8, 0)),
            (b"tEXt", b"Comment\0hi".to_vec()),
            (b"PLTE", vec![0, 0, 0]),
            (b"IDAT", deflate_zlib(&[0, 1, 2], 6)),
            (b"IEND", Vec::new()),
        ] {
            raw_chunk(&mut png, chunk_type, &data);
            if chunk_type == corrupt {
                let last = png.len() - 1;
                png[last] ^= 0x5A;
            }
        }
        png
    };

    for critical in [b"IHDR", b"PLTE", b"IDAT"] {
        match decode(&build(critical)) {
            Err(Error::CrcMismatch { chunk_type }) => {
                assert_eq!(chunk_type.as_bytes(), &critical[..])
            }
            other => panic!("{:?}: unexpected {other:?}", std::str::from_utf8(critical)),
        }
    }

    let decoded = decode(&build(b"tEXt")).unwrap();
    assert_eq!(decoded.image.as_bytes(), &[1, 2]);

    let ignore = DecoderOptions {
        crc_handling: CrcHandling::None,
        ..Default::default()
    };
    assert!(decode_with_options(&build(b"IDAT"), ignore).is_ok());
}

/// Ensure encoded PNGs decode correctly via the `image` crate.
#[test]
fn test_image_crate_decodes_our_output() {
    let mut rng = StdRng::seed_from_u64(42);
    let dims = [(1, 1), (2, 3), (3, 2), (4, 4), (8, 5), (31, 17)];
    let color_types = [
        ColorType::Gray,
        ColorType::GrayAlpha,
        ColorType::Rgb,
        ColorType::Rgba,
    ];

    for &(w, h) in &dims {
        for &ct in &color_types {
            for interlace in [InterlaceMethod::None, InterlaceMethod::Adam7] {
                let pixels = random_samples(&mut rng, w, h, ct, BitDepth::Eight);
                let opts = PngOptions::builder(w, h)
                    .color_type(ct)
                    .interlace(interlace)
                    .build();
                let encoded = png::encode(&pixels, &opts).unwrap();

                let theirs = image::load_from_memory(&encoded).expect("decode").to_rgba8();
                let ours = decode(&encoded).unwrap().to_rgba8();
                assert_eq!(theirs.width(), w);
                assert_eq!(theirs.height(), h);
                assert_eq!(theirs.as_raw(), &ours, "{ct:?} {interlace:?} {w}x{h}");
            }
        }
    }
}

/// Decode PNGs written by the `image` crate.
#[test]
fn test_decode_image_crate_output() {
    let mut rng = StdRng::seed_from_u64(3);
    let (w, h) = (40u32, 23u32);
    let raw: Vec<u8> = (0..w * h * 4).map(|_| rng.gen()).collect();
    let rgba = image::RgbaImage::from_raw(w, h, raw.clone()).unwrap();

    let mut encoded = Vec::new();
    image::DynamicImage::ImageRgba8(rgba)
        .write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)
        .unwrap();

    let decoded = decode(&encoded).unwrap();
    assert_eq!(decoded.header.color_type, ColorType::Rgba);
    assert_eq!(decoded.image.as_bytes(), &raw[..]);
}

/// Test compression levels.
#[test]
fn test_compression_levels() {
    let pixels: Vec<u8> = (0..64 * 64 * 3).map(|i| (i % 256) as u8).collect();

    let mut sizes = Vec::new();
    for level in 0..=9 {
        let opts = PngOptions::builder(64, 64)
            .color_type(ColorType::Rgb)
            .compression_level(level)
            .build();
        let result = png::encode(&pixels, &opts).unwrap();
        assert_eq!(decode(&result).unwrap().image.as_bytes(), &pixels[..]);
        sizes.push(result.len());
    }

    assert!(sizes[9] <= sizes[1]);
    assert!(sizes[1] < sizes[0]);
}

/// Test error handling for invalid input.
#[test]
fn test_invalid_input() {
    assert!(png::encode(&[0, 0, 0], &options(0, 1, ColorType::Rgb)).is_err());
    assert!(png::encode(&[0, 0, 0], &options(1, 0, ColorType::Rgb)).is_err());
    assert!(png::encode(&[0, 0], &options(1, 1, ColorType::Rgb)).is_err());
    assert!(png::encode(&[0, 0, 0, 0], &options(1, 1, ColorType::Rgb)).is_err());
}

/// Test large image encoding.
#[test]
fn test_large_image() {
    let pixels: Vec<u8> = (0..600 * 400 * 3).map(|i| (i / 3 % 251) as u8).collect();
    let result = png::encode(&pixels, &options(600, 400, ColorType::Rgb)).unwrap();
    assert_eq!(&result[16..20], &600u32.to_be_bytes());
    assert_eq!(&result[20..24], &400u32.to_be_bytes());
    assert_eq!(decode(&result).unwrap().image.as_bytes(), &pixels[..]);
}

fn filter_case() -> impl Strategy<Value = (Vec<u8>, Vec<u8>, usize)> {
    (1usize..=8, 1usize..64).prop_flat_map(|(bpp, pixels)| {
        let len = bpp * pixels;
        (
            proptest::collection::vec(any::<u8>(), len),
            proptest::collection::vec(any::<u8>(), len),
            Just(bpp),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_filters_are_invertible((row, prev, bpp) in filter_case()) {
        for filter in [
            FilterType::None,
            FilterType::Sub,
            FilterType::Up,
            FilterType::Average,
            FilterType::Paeth,
        ] {
            let mut filtered = vec![0u8; row.len()];
            encode_filter(filter, &row, &prev, bpp, &mut filtered);
            unfilter_row(filter, &mut filtered, &prev, bpp);
            prop_assert_eq!(&filtered, &row);
        }
    }

    #[test]
    fn prop_rgba_roundtrip(
        (w, h, data) in (1u32..24, 1u32..24).prop_flat_map(|(w, h)| {
            (Just(w), Just(h), proptest::collection::vec(any::<u8>(), (w * h * 4) as usize))
        }),
        adam7 in any::<bool>(),
        level in 0u8..=9,
    ) {
        let interlace = if adam7 { InterlaceMethod::Adam7 } else { InterlaceMethod::None };
        let opts = PngOptions::builder(w, h)
            .color_type(ColorType::Rgba)
            .interlace(interlace)
            .compression_level(level)
            .build();
        let encoded = png::encode(&data, &opts).unwrap();
        let decoded = decode(&encoded).unwrap();
        prop_assert_eq!(decoded.image.as_bytes(), &data[..]);
    }
}
