//! Minimal PNG container reader/writer.
//!
//! Enough of the chunk layout to read chunks, build new ones with a valid
//! CRC and splice a `pHYs` (physical pixel density) chunk directly after
//! `IHDR`, without re-encoding image data.
//!
//! Chunk layout: 4-byte big-endian length, 4-byte type, `length` bytes of
//! data, 4-byte CRC-32 over type + data.

use thiserror::Error;

/// The fixed 8-byte PNG signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub const IHDR: [u8; 4] = *b"IHDR";
pub const PHYS: [u8; 4] = *b"pHYs";
pub const IDAT: [u8; 4] = *b"IDAT";

/// `pHYs` unit code for pixels per meter.
pub const UNIT_METER: u8 = 1;

/// Length + type + CRC around each chunk's data.
const CHUNK_OVERHEAD: usize = 12;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("missing PNG signature")]
    BadSignature,
    #[error("chunk at offset {offset} runs past end of data")]
    Truncated { offset: usize },
    #[error("first chunk is not IHDR")]
    MissingHeader,
    #[error("pHYs chunk has {0} data bytes, expected 9")]
    BadDensityLength(usize),
}

const CRC_TABLE: [u32; 256] = build_crc_table();

const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 {
                0xEDB8_8320 ^ (c >> 1)
            } else {
                c >> 1
            };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

/// Standard CRC-32 (reflected 0xEDB88320, init and final XOR 0xFFFFFFFF).
pub fn crc32(data: &[u8]) -> u32 {
    crc32_parts(&[data])
}

fn crc32_parts(parts: &[&[u8]]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for part in parts {
        for &byte in *part {
            crc = CRC_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
        }
    }
    crc ^ 0xFFFF_FFFF
}

/// One chunk borrowed from a PNG byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Byte offset of the length field.
    pub offset: usize,
    pub chunk_type: [u8; 4],
    pub data: &'a [u8],
    pub crc: u32,
}

impl Chunk<'_> {
    /// Total bytes the chunk occupies in the stream.
    pub fn encoded_len(&self) -> usize {
        self.data.len() + CHUNK_OVERHEAD
    }

    /// Whether the stored CRC matches the type and data.
    pub fn crc_matches(&self) -> bool {
        crc32_parts(&[&self.chunk_type, self.data]) == self.crc
    }
}

/// Iterates the chunks following the signature.
pub struct ChunkReader<'a> {
    bytes: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> ChunkReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self, ChunkError> {
        if bytes.len() < PNG_SIGNATURE.len() || bytes[..PNG_SIGNATURE.len()] != PNG_SIGNATURE {
            return Err(ChunkError::BadSignature);
        }
        Ok(Self {
            bytes,
            offset: PNG_SIGNATURE.len(),
            failed: false,
        })
    }
}

fn be_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

impl<'a> Iterator for ChunkReader<'a> {
    type Item = Result<Chunk<'a>, ChunkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.bytes.len() {
            return None;
        }
        let offset = self.offset;
        let truncated = || Some(Err(ChunkError::Truncated { offset }));

        if self.bytes.len() - offset < CHUNK_OVERHEAD {
            self.failed = true;
            return truncated();
        }
        let length = be_u32(self.bytes, offset) as usize;
        let Some(end) = offset
            .checked_add(CHUNK_OVERHEAD)
            .and_then(|n| n.checked_add(length))
            .filter(|&end| end <= self.bytes.len())
        else {
            self.failed = true;
            return truncated();
        };

        let mut chunk_type = [0u8; 4];
        chunk_type.copy_from_slice(&self.bytes[offset + 4..offset + 8]);
        let data = &self.bytes[offset + 8..offset + 8 + length];
        let crc = be_u32(self.bytes, offset + 8 + length);

        self.offset = end;
        Some(Ok(Chunk {
            offset,
            chunk_type,
            data,
            crc,
        }))
    }
}

/// Serialises one complete chunk with its CRC.
pub fn build_chunk(chunk_type: [u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + CHUNK_OVERHEAD);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(&chunk_type);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc32_parts(&[&chunk_type, data]).to_be_bytes());
    out
}

/// Contents of a `pHYs` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalDensity {
    pub x_ppu: u32,
    pub y_ppu: u32,
    pub unit: u8,
}

impl PhysicalDensity {
    /// Square pixels at `dpi`, stored in pixels per meter.
    pub fn from_dpi(dpi: u32) -> Self {
        let ppm = (dpi as f64 / 0.0254).round() as u32;
        Self {
            x_ppu: ppm,
            y_ppu: ppm,
            unit: UNIT_METER,
        }
    }

    pub fn to_payload(&self) -> [u8; 9] {
        let mut payload = [0u8; 9];
        payload[..4].copy_from_slice(&self.x_ppu.to_be_bytes());
        payload[4..8].copy_from_slice(&self.y_ppu.to_be_bytes());
        payload[8] = self.unit;
        payload
    }

    pub fn from_payload(data: &[u8]) -> Result<Self, ChunkError> {
        if data.len() != 9 {
            return Err(ChunkError::BadDensityLength(data.len()));
        }
        Ok(Self {
            x_ppu: be_u32(data, 0),
            y_ppu: be_u32(data, 4),
            unit: data[8],
        })
    }

    /// The full 21-byte chunk.
    pub fn to_chunk(&self) -> Vec<u8> {
        build_chunk(PHYS, &self.to_payload())
    }
}

/// Rewrites `png` so that a single `pHYs` chunk with `density` sits
/// directly after `IHDR`. Any `pHYs` already placed before the first
/// `IDAT` is dropped; all other chunks are copied byte-for-byte.
pub fn set_density(png: &[u8], density: PhysicalDensity) -> Result<Vec<u8>, ChunkError> {
    let mut chunks = ChunkReader::new(png)?;
    let header = chunks.next().ok_or(ChunkError::MissingHeader)??;
    if header.chunk_type != IHDR {
        return Err(ChunkError::MissingHeader);
    }

    let phys = density.to_chunk();
    let insert_at = header.offset + header.encoded_len();

    let mut out = Vec::with_capacity(png.len() + phys.len());
    out.extend_from_slice(&png[..insert_at]);
    out.extend_from_slice(&phys);

    let mut seen_image_data = false;
    for chunk in chunks {
        let chunk = chunk?;
        seen_image_data |= chunk.chunk_type == IDAT;
        if chunk.chunk_type == PHYS && !seen_image_data {
            tracing::trace!(offset = chunk.offset, "Replacing existing pHYs chunk");
            continue;
        }
        out.extend_from_slice(&png[chunk.offset..chunk.offset + chunk.encoded_len()]);
    }
    Ok(out)
}

/// Reads the first `pHYs` chunk before image data, if any.
pub fn read_density(png: &[u8]) -> Result<Option<PhysicalDensity>, ChunkError> {
    for chunk in ChunkReader::new(png)? {
        let chunk = chunk?;
        match chunk.chunk_type {
            PHYS => return PhysicalDensity::from_payload(chunk.data).map(Some),
            IDAT => break,
            _ => {}
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use proptest::prelude::*;
    use std::io::Cursor;

    fn encode_png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([90, 120, 200, 255]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    /// Bitwise CRC-32 with no lookup table.
    fn reference_crc32(data: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for &byte in data {
            crc ^= byte as u32;
            for _ in 0..8 {
                let mask = (crc & 1).wrapping_neg();
                crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
            }
        }
        !crc
    }

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_300_dpi_density() {
        let density = PhysicalDensity::from_dpi(300);
        assert_eq!(density.x_ppu, 11811);
        assert_eq!(density.y_ppu, 11811);
        assert_eq!(density.unit, UNIT_METER);
    }

    #[test]
    fn test_phys_chunk_layout() {
        let chunk = PhysicalDensity::from_dpi(300).to_chunk();
        assert_eq!(chunk.len(), 21);
        assert_eq!(&chunk[..4], &[0, 0, 0, 9]);
        assert_eq!(&chunk[4..8], b"pHYs");
        assert_eq!(&chunk[8..12], &11811u32.to_be_bytes());
        assert_eq!(&chunk[12..16], &11811u32.to_be_bytes());
        assert_eq!(chunk[16], 1);

        let stored = u32::from_be_bytes([chunk[17], chunk[18], chunk[19], chunk[20]]);
        assert_eq!(stored, reference_crc32(&chunk[4..17]));
    }

    #[test]
    fn test_set_density_splices_after_header() {
        let png = encode_png(4, 4);
        let patched = set_density(&png, PhysicalDensity::from_dpi(300)).unwrap();

        assert_eq!(patched.len(), png.len() + 21);
        assert_eq!(&patched[33 + 4..33 + 8], b"pHYs");
        assert_eq!(
            read_density(&patched).unwrap(),
            Some(PhysicalDensity::from_dpi(300))
        );
        assert!(ChunkReader::new(&patched)
            .unwrap()
            .all(|c| c.unwrap().crc_matches()));

        // Still a decodable PNG (the decoder checks CRCs).
        let decoded = image::load_from_memory(&patched).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
    }

    #[test]
    fn test_set_density_replaces_instead_of_doubling() {
        let png = encode_png(3, 2);
        let once = set_density(&png, PhysicalDensity::from_dpi(72)).unwrap();
        let twice = set_density(&once, PhysicalDensity::from_dpi(300)).unwrap();
        let direct = set_density(&png, PhysicalDensity::from_dpi(300)).unwrap();

        assert_eq!(twice, direct);
        let phys_count = ChunkReader::new(&twice)
            .unwrap()
            .filter(|c| c.as_ref().unwrap().chunk_type == PHYS)
            .count();
        assert_eq!(phys_count, 1);
    }

    #[test]
    fn test_unstamped_png_has_no_density() {
        assert_eq!(read_density(&encode_png(2, 2)).unwrap(), None);
    }

    #[test]
    fn test_rejects_non_png() {
        assert_eq!(
            set_density(b"\xFF\xD8\xFF\xE0 jpeg", PhysicalDensity::from_dpi(300)),
            Err(ChunkError::BadSignature)
        );
    }

    #[test]
    fn test_truncated_stream_reports_offset() {
        let png = encode_png(2, 2);
        let cut = &png[..40];
        let errors: Vec<_> = ChunkReader::new(cut).unwrap().filter_map(Result::err).collect();
        assert_eq!(errors, vec![ChunkError::Truncated { offset: 33 }]);
    }

    proptest! {
        #[test]
        fn prop_crc_matches_reference(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(crc32(&data), reference_crc32(&data));
        }

        #[test]
        fn prop_built_chunks_read_back(
            chunk_type in proptest::array::uniform4(b'a'..=b'z'),
            data in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let mut stream = PNG_SIGNATURE.to_vec();
            stream.extend_from_slice(&build_chunk(chunk_type, &data));

            let chunks: Vec<_> = ChunkReader::new(&stream).unwrap().collect();
            prop_assert_eq!(chunks.len(), 1);
            let chunk = chunks[0].clone().unwrap();
            prop_assert_eq!(chunk.chunk_type, chunk_type);
            prop_assert_eq!(chunk.data, &data[..]);
            prop_assert!(chunk.crc_matches());
        }
    }
}
