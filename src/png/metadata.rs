//! Ancillary chunk metadata: gamma, physical size, transparency, text and Exif.
//!
//! Malformed ancillary chunks never abort a decode; they are logged and
//! dropped.

use std::io::{Read, Write};

use log::{trace, warn};

use super::chunk::{write_chunk, ChunkType};
use crate::color::ColorType;
use crate::compress::deflate_zlib;
use crate::decode::ZlibDecoder;
use crate::error::Result;

/// Text values longer than this are written compressed.
const TEXT_COMPRESSION_THRESHOLD: usize = 1024;

/// Longest keyword the format allows.
const MAX_KEYWORD_LEN: usize = 79;

/// Compressed text values inflating past this many bytes are dropped.
pub const MAX_TEXT_LEN: usize = 1 << 20;

/// Unit of a [`PhysicalDimensions`] measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhysicalUnit {
    /// Aspect ratio only.
    #[default]
    Unknown,
    /// Pixels per metre.
    Meter,
}

/// Pixel density from a pHYs chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalDimensions {
    /// Pixels per unit, horizontally.
    pub x: u32,
    /// Pixels per unit, vertically.
    pub y: u32,
    /// Unit of `x` and `y`.
    pub unit: PhysicalUnit,
}

/// Transparency information from a tRNS chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transparency {
    /// Alpha for the leading palette entries.
    Palette(Vec<u8>),
    /// Gray sample value that is fully transparent.
    Gray(u16),
    /// RGB sample values that are fully transparent.
    Rgb(u16, u16, u16),
}

/// A tEXt, zTXt or iTXt entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEntry {
    /// Keyword, 1 to 79 Latin-1 characters.
    pub keyword: String,
    /// Text value.
    pub value: String,
    /// Language tag (iTXt only).
    pub language_tag: Option<String>,
    /// Keyword translated into the language (iTXt only).
    pub translated_keyword: Option<String>,
    /// Whether the value is (or should be) stored compressed.
    pub compressed: bool,
}

impl TextEntry {
    /// A plain entry.
    pub fn new(keyword: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            value: value.into(),
            language_tag: None,
            translated_keyword: None,
            compressed: false,
        }
    }

    /// An international entry with a language tag and translated keyword.
    pub fn international(
        keyword: impl Into<String>,
        value: impl Into<String>,
        language_tag: impl Into<String>,
        translated_keyword: impl Into<String>,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            value: value.into(),
            language_tag: Some(language_tag.into()),
            translated_keyword: Some(translated_keyword.into()),
            compressed: false,
        }
    }

    /// Request compressed storage.
    pub fn compressed(mut self) -> Self {
        self.compressed = true;
        self
    }
}

/// Ancillary metadata carried alongside the pixels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PngMetadata {
    /// Image gamma (gAMA value / 100000).
    pub gamma: Option<f64>,
    /// Physical pixel dimensions.
    pub physical: Option<PhysicalDimensions>,
    /// Simple transparency.
    pub transparency: Option<Transparency>,
    /// Text entries in stream order.
    pub text: Vec<TextEntry>,
    /// Raw Exif profile.
    pub exif: Option<Vec<u8>>,
}

impl PngMetadata {
    /// Record the contents of an ancillary chunk.
    ///
    /// Returns `false` for chunk types this struct does not model. Malformed
    /// payloads are logged and ignored.
    pub fn read_chunk(&mut self, chunk_type: ChunkType, data: &[u8], color_type: ColorType) -> bool {
        match chunk_type {
            ChunkType::GAMA => match data {
                [a, b, c, d] => {
                    let value = u32::from_be_bytes([*a, *b, *c, *d]);
                    if value == 0 {
                        warn!("ignoring gAMA with zero gamma");
                    } else {
                        self.gamma = Some(value as f64 / 100_000.0);
                    }
                }
                _ => warn!("ignoring gAMA chunk of length {}", data.len()),
            },
            ChunkType::PHYS => {
                if data.len() != 9 {
                    warn!("ignoring pHYs chunk of length {}", data.len());
                } else {
                    let unit = match data[8] {
                        1 => PhysicalUnit::Meter,
                        _ => PhysicalUnit::Unknown,
                    };
                    self.physical = Some(PhysicalDimensions {
                        x: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
                        y: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
                        unit,
                    });
                }
            }
            ChunkType::TRNS => self.transparency = parse_transparency(data, color_type),
            ChunkType::TEXT => self.push_text(parse_text(data), chunk_type),
            ChunkType::ZTXT => self.push_text(parse_compressed_text(data), chunk_type),
            ChunkType::ITXT => self.push_text(parse_international_text(data), chunk_type),
            ChunkType::EXIF => self.exif = Some(data.to_vec()),
            _ => return false,
        }
        true
    }

    fn push_text(&mut self, entry: Option<TextEntry>, chunk_type: ChunkType) {
        match entry {
            Some(entry) => {
                trace!("{} keyword {:?}", chunk_type, entry.keyword);
                self.text.push(entry);
            }
            None => warn!("ignoring malformed {} chunk", chunk_type),
        }
    }

    /// Write the chunks that must precede PLTE: gAMA and pHYs.
    pub fn write_leading<W: Write>(&self, out: &mut W) -> Result<()> {
        if let Some(gamma) = self.gamma {
            let value = (gamma * 100_000.0).round();
            if value >= 1.0 && value <= u32::MAX as f64 {
                write_chunk(out, ChunkType::GAMA, &(value as u32).to_be_bytes())?;
            } else {
                warn!("not writing out-of-range gamma {gamma}");
            }
        }
        if let Some(phys) = self.physical {
            let mut data = [0u8; 9];
            data[0..4].copy_from_slice(&phys.x.to_be_bytes());
            data[4..8].copy_from_slice(&phys.y.to_be_bytes());
            data[8] = match phys.unit {
                PhysicalUnit::Unknown => 0,
                PhysicalUnit::Meter => 1,
            };
            write_chunk(out, ChunkType::PHYS, &data)?;
        }
        Ok(())
    }

    /// Write the chunks that follow PLTE: tRNS, eXIf and text.
    pub fn write_trailing<W: Write>(
        &self,
        out: &mut W,
        color_type: ColorType,
        level: u8,
    ) -> Result<()> {
        if let Some(trns) = &self.transparency {
            write_transparency(out, trns, color_type)?;
        }
        if let Some(exif) = &self.exif {
            write_chunk(out, ChunkType::EXIF, exif)?;
        }
        for entry in &self.text {
            write_text(out, entry, level)?;
        }
        Ok(())
    }
}

fn parse_transparency(data: &[u8], color_type: ColorType) -> Option<Transparency> {
    let sample = |i: usize| u16::from_be_bytes([data[i], data[i + 1]]);
    match (color_type, data.len()) {
        (ColorType::Indexed, 1..=256) => Some(Transparency::Palette(data.to_vec())),
        (ColorType::Gray, 2) => Some(Transparency::Gray(sample(0))),
        (ColorType::Rgb, 6) => Some(Transparency::Rgb(sample(0), sample(2), sample(4))),
        _ => {
            warn!(
                "ignoring tRNS of length {} for {:?} image",
                data.len(),
                color_type
            );
            None
        }
    }
}

/// Write a tRNS chunk if `trns` suits `color_type`.
pub(crate) fn write_transparency<W: Write>(
    out: &mut W,
    trns: &Transparency,
    color_type: ColorType,
) -> Result<()> {
    match (trns, color_type) {
        (Transparency::Palette(alpha), ColorType::Indexed) => {
            write_chunk(out, ChunkType::TRNS, alpha)?;
        }
        (Transparency::Gray(v), ColorType::Gray) => {
            write_chunk(out, ChunkType::TRNS, &v.to_be_bytes())?;
        }
        (Transparency::Rgb(r, g, b), ColorType::Rgb) => {
            let mut data = [0u8; 6];
            data[0..2].copy_from_slice(&r.to_be_bytes());
            data[2..4].copy_from_slice(&g.to_be_bytes());
            data[4..6].copy_from_slice(&b.to_be_bytes());
            write_chunk(out, ChunkType::TRNS, &data)?;
        }
        _ => warn!("not writing {:?} transparency for {:?} image", trns, color_type),
    }
    Ok(())
}

fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn string_to_latin1(s: &str) -> Option<Vec<u8>> {
    s.chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect()
}

/// Split off a NUL-terminated keyword, validating its length.
fn split_keyword(data: &[u8]) -> Option<(String, &[u8])> {
    let nul = data.iter().position(|&b| b == 0)?;
    if nul == 0 || nul > MAX_KEYWORD_LEN {
        return None;
    }
    Some((latin1_to_string(&data[..nul]), &data[nul + 1..]))
}

fn parse_text(data: &[u8]) -> Option<TextEntry> {
    let (keyword, rest) = split_keyword(data)?;
    Some(TextEntry::new(keyword, latin1_to_string(rest)))
}

fn parse_compressed_text(data: &[u8]) -> Option<TextEntry> {
    let (keyword, rest) = split_keyword(data)?;
    let (&method, compressed) = rest.split_first()?;
    if method != 0 {
        return None;
    }
    let value = inflate_text(&keyword, compressed)?;
    Some(TextEntry::new(keyword, latin1_to_string(&value)).compressed())
}

/// Inflate a compressed text value, giving up once it exceeds [`MAX_TEXT_LEN`].
fn inflate_text(keyword: &str, compressed: &[u8]) -> Option<Vec<u8>> {
    let mut value = Vec::new();
    ZlibDecoder::new(compressed)
        .take(MAX_TEXT_LEN as u64 + 1)
        .read_to_end(&mut value)
        .ok()?;
    if value.len() > MAX_TEXT_LEN {
        warn!("text value for {keyword:?} exceeds {MAX_TEXT_LEN} bytes, dropping it");
        return None;
    }
    Some(value)
}

fn parse_international_text(data: &[u8]) -> Option<TextEntry> {
    let (keyword, rest) = split_keyword(data)?;
    let [flag, method, rest @ ..] = rest else {
        return None;
    };
    let nul = rest.iter().position(|&b| b == 0)?;
    let language_tag = String::from_utf8(rest[..nul].to_vec()).ok()?;
    let rest = &rest[nul + 1..];
    let nul = rest.iter().position(|&b| b == 0)?;
    let translated_keyword = String::from_utf8(rest[..nul].to_vec()).ok()?;
    let text = &rest[nul + 1..];

    let compressed = match (*flag, *method) {
        (0, _) => false,
        (1, 0) => true,
        _ => return None,
    };
    let value = if compressed {
        String::from_utf8(inflate_text(&keyword, text)?).ok()?
    } else {
        String::from_utf8(text.to_vec()).ok()?
    };

    Some(TextEntry {
        keyword,
        value,
        language_tag: Some(language_tag).filter(|s| !s.is_empty()),
        translated_keyword: Some(translated_keyword).filter(|s| !s.is_empty()),
        compressed,
    })
}

fn write_text<W: Write>(out: &mut W, entry: &TextEntry, level: u8) -> Result<()> {
    let keyword = match string_to_latin1(&entry.keyword) {
        Some(k) if !k.is_empty() && k.len() <= MAX_KEYWORD_LEN && !k.contains(&0) => k,
        _ => {
            warn!("not writing text entry with invalid keyword {:?}", entry.keyword);
            return Ok(());
        }
    };
    let compress = entry.compressed || entry.value.len() > TEXT_COMPRESSION_THRESHOLD;
    let international = entry.language_tag.is_some() || entry.translated_keyword.is_some();
    let latin1 = string_to_latin1(&entry.value);

    let mut data = keyword;
    data.push(0);
    match latin1 {
        Some(value) if !international => {
            if compress {
                data.push(0);
                data.extend_from_slice(&deflate_zlib(&value, level));
                write_chunk(out, ChunkType::ZTXT, &data)?;
            } else {
                data.extend_from_slice(&value);
                write_chunk(out, ChunkType::TEXT, &data)?;
            }
        }
        _ => {
            data.push(compress as u8);
            data.push(0);
            data.extend_from_slice(entry.language_tag.as_deref().unwrap_or("").as_bytes());
            data.push(0);
            data.extend_from_slice(entry.translated_keyword.as_deref().unwrap_or("").as_bytes());
            data.push(0);
            if compress {
                data.extend_from_slice(&deflate_zlib(entry.value.as_bytes(), level));
            } else {
                data.extend_from_slice(entry.value.as_bytes());
            }
            write_chunk(out, ChunkType::ITXT, &data)?;
        }
    }
    Ok(())
}
