//! PNG chunk codec with character card embedding.
//!
//! A PNG file is the 8-byte signature followed by a sequence of chunks:
//!
//! ```text
//! +--------+--------+----------------+--------+
//! | length | type   | data           | crc32  |
//! | 4 (BE) | 4 ASCII| length bytes   | 4 (BE) |
//! +--------+--------+----------------+--------+
//! ```
//!
//! Cards are stored in a `tEXt` chunk keyed `chara` whose text is the
//! base64-encoded card JSON. Older tools also wrote `ccv3`; both are purged
//! on every embed so a file never carries two payloads.

use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;

/// PNG file signature
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Keyword the card payload is written under
pub const CARD_KEYWORD: &str = "chara";

/// Keywords removed before embedding (current and legacy)
pub const RESERVED_KEYWORDS: [&str; 2] = ["chara", "ccv3"];

const TEXT_CHUNK: [u8; 4] = *b"tEXt";
const END_CHUNK: [u8; 4] = *b"IEND";
const MAX_KEYWORD_LEN: usize = 79;

/// Errors produced while reading or writing PNG chunk streams
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PngError {
    #[error("Invalid PNG signature")]
    InvalidSignature,

    #[error("Truncated PNG: chunk at offset {offset} needs {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("CRC mismatch in {chunk} chunk: stored {stored:08x}, computed {computed:08x}")]
    CrcMismatch {
        chunk: String,
        stored: u32,
        computed: u32,
    },

    #[error("Invalid chunk type at offset {offset}")]
    InvalidChunkType { offset: usize },

    #[error("Invalid PNG: missing IEND chunk")]
    MissingIend,

    #[error("Invalid tEXt chunk: {0}")]
    InvalidText(&'static str),

    #[error("No character data")]
    NoCardData,
}

/// A single PNG chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Four-letter chunk type (e.g. `IHDR`, `tEXt`, `IEND`)
    pub kind: [u8; 4],

    /// Raw chunk payload (excluding length, type and CRC)
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn new(kind: [u8; 4], data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// Build a `tEXt` chunk from a keyword and text
    pub fn text(keyword: &str, text: &str) -> Result<Self, PngError> {
        let keyword = latin1_encode(keyword).ok_or(PngError::InvalidText("keyword is not Latin-1"))?;
        if keyword.is_empty() || keyword.len() > MAX_KEYWORD_LEN {
            return Err(PngError::InvalidText("keyword must be 1-79 bytes"));
        }
        if keyword.contains(&0) {
            return Err(PngError::InvalidText("keyword contains NUL"));
        }
        let text = latin1_encode(text).ok_or(PngError::InvalidText("text is not Latin-1"))?;

        let mut data = Vec::with_capacity(keyword.len() + 1 + text.len());
        data.extend_from_slice(&keyword);
        data.push(0);
        data.extend_from_slice(&text);
        Ok(Self::new(TEXT_CHUNK, data))
    }

    /// Chunk type as a string
    pub fn kind_str(&self) -> &str {
        std::str::from_utf8(&self.kind).unwrap_or("????")
    }

    /// Critical chunks have an uppercase first letter
    pub fn is_critical(&self) -> bool {
        self.kind[0].is_ascii_uppercase()
    }

    pub fn is_text(&self) -> bool {
        self.kind == TEXT_CHUNK
    }

    pub fn is_end(&self) -> bool {
        self.kind == END_CHUNK
    }

    /// Decode a `tEXt` chunk into `(keyword, text)`
    pub fn decode_text(&self) -> Result<(String, String), PngError> {
        if !self.is_text() {
            return Err(PngError::InvalidText("not a tEXt chunk"));
        }
        let sep = self
            .data
            .iter()
            .position(|&b| b == 0)
            .ok_or(PngError::InvalidText("missing keyword separator"))?;
        if sep == 0 || sep > MAX_KEYWORD_LEN {
            return Err(PngError::InvalidText("keyword must be 1-79 bytes"));
        }
        Ok((
            latin1_decode(&self.data[..sep]),
            latin1_decode(&self.data[sep + 1..]),
        ))
    }

    /// True if this is a `tEXt` chunk whose keyword matches case-insensitively
    pub fn has_keyword(&self, keyword: &str) -> bool {
        match self.decode_text() {
            Ok((k, _)) => k.eq_ignore_ascii_case(keyword),
            Err(_) => false,
        }
    }

    fn crc(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.kind);
        hasher.update(&self.data);
        hasher.finalize()
    }
}

/// Parse a PNG byte stream into its chunks.
///
/// Verifies the signature, every length field and every CRC. Parsing stops
/// after `IEND`; anything trailing it is ignored.
pub fn parse(bytes: &[u8]) -> Result<Vec<Chunk>, PngError> {
    if bytes.len() < PNG_SIGNATURE.len() || bytes[..PNG_SIGNATURE.len()] != PNG_SIGNATURE {
        return Err(PngError::InvalidSignature);
    }

    let mut chunks = Vec::new();
    let mut offset = PNG_SIGNATURE.len();

    while offset < bytes.len() {
        let header = take(bytes, offset, 8)?;
        let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let kind = [header[4], header[5], header[6], header[7]];
        if !kind.iter().all(u8::is_ascii_alphabetic) {
            return Err(PngError::InvalidChunkType { offset });
        }

        let data = take(bytes, offset + 8, length)?.to_vec();
        let crc_bytes = take(bytes, offset + 8 + length, 4)?;
        let stored = u32::from_be_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

        let chunk = Chunk::new(kind, data);
        let computed = chunk.crc();
        if stored != computed {
            return Err(PngError::CrcMismatch {
                chunk: chunk.kind_str().to_string(),
                stored,
                computed,
            });
        }

        offset += 12 + length;
        let done = chunk.is_end();
        chunks.push(chunk);
        if done {
            break;
        }
    }

    Ok(chunks)
}

/// Serialize chunks back into a PNG byte stream, recomputing every CRC
pub fn serialize(chunks: &[Chunk]) -> Vec<u8> {
    let size = PNG_SIGNATURE.len() + chunks.iter().map(|c| c.data.len() + 12).sum::<usize>();
    let mut out = Vec::with_capacity(size);
    out.extend_from_slice(&PNG_SIGNATURE);

    for chunk in chunks {
        out.extend_from_slice(&(chunk.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&chunk.kind);
        out.extend_from_slice(&chunk.data);
        out.extend_from_slice(&chunk.crc().to_be_bytes());
    }

    out
}

/// Embed card JSON into a PNG, replacing any existing card payload.
///
/// Every `tEXt` chunk keyed `chara` or `ccv3` (case-insensitive) is removed,
/// and a fresh `chara` chunk is inserted immediately before `IEND`. All other
/// chunks keep their relative order.
pub fn embed_card(image: &[u8], card_json: &str) -> Result<Vec<u8>, PngError> {
    let mut chunks: Vec<Chunk> = parse(image)?
        .into_iter()
        .filter(|chunk| !RESERVED_KEYWORDS.iter().any(|k| chunk.has_keyword(k)))
        .collect();

    let end = chunks
        .iter()
        .position(Chunk::is_end)
        .ok_or(PngError::MissingIend)?;

    let encoded = STANDARD.encode(card_json.as_bytes());
    chunks.insert(end, Chunk::text(CARD_KEYWORD, &encoded)?);

    Ok(serialize(&chunks))
}

/// Extract the card JSON embedded in a PNG.
///
/// Returns the first `chara` chunk that decodes to non-empty UTF-8. Chunks
/// that fail to decode are skipped.
pub fn extract_card(image: &[u8]) -> Result<String, PngError> {
    for chunk in parse(image)?.iter().filter(|c| c.is_text()) {
        let Ok((keyword, text)) = chunk.decode_text() else {
            continue;
        };
        if !keyword.eq_ignore_ascii_case(CARD_KEYWORD) {
            continue;
        }
        let Ok(raw) = STANDARD.decode(text.trim().as_bytes()) else {
            continue;
        };
        match String::from_utf8(raw) {
            Ok(json) if !json.is_empty() => return Ok(json),
            _ => continue,
        }
    }

    Err(PngError::NoCardData)
}

fn take(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8], PngError> {
    let end = offset.checked_add(len).filter(|&end| end <= bytes.len());
    match end {
        Some(end) => Ok(&bytes[offset..end]),
        None => Err(PngError::Truncated {
            offset,
            needed: len,
            available: bytes.len().saturating_sub(offset),
        }),
    }
}

fn latin1_encode(s: &str) -> Option<Vec<u8>> {
    s.chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect()
}

fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Smallest valid PNG: 1x1 greyscale pixel
    pub(crate) fn tiny_png() -> Vec<u8> {
        let ihdr = Chunk::new(*b"IHDR", vec![0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0]);
        let idat = Chunk::new(
            *b"IDAT",
            vec![0x78, 0x9c, 0x63, 0x60, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01],
        );
        let end = Chunk::new(*b"IEND", Vec::new());
        serialize(&[ihdr, idat, end])
    }

    #[test]
    fn test_parse_serialize_identity() {
        let png = tiny_png();
        let chunks = parse(&png).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].kind_str(), "IHDR");
        assert!(chunks[0].is_critical());
        assert_eq!(serialize(&chunks), png);
    }

    #[test]
    fn test_bad_signature() {
        assert_eq!(parse(b"not a png"), Err(PngError::InvalidSignature));
        assert_eq!(parse(&[]), Err(PngError::InvalidSignature));
    }

    #[test]
    fn test_truncated_stream() {
        let png = tiny_png();
        let result = parse(&png[..png.len() - 6]);
        assert!(matches!(result, Err(PngError::Truncated { .. })));
    }

    #[test]
    fn test_crc_mismatch() {
        let mut png = tiny_png();
        // Flip a byte inside the IHDR payload
        png[PNG_SIGNATURE.len() + 8] ^= 0xff;
        assert!(matches!(parse(&png), Err(PngError::CrcMismatch { .. })));
    }

    #[test]
    fn test_text_chunk_roundtrip() {
        let chunk = Chunk::text("Comment", "héllo").unwrap();
        let (keyword, text) = chunk.decode_text().unwrap();
        assert_eq!(keyword, "Comment");
        assert_eq!(text, "héllo");
        assert!(chunk.has_keyword("comment"));
    }

    #[test]
    fn test_text_chunk_rejects_bad_keyword() {
        assert!(Chunk::text("", "x").is_err());
        assert!(Chunk::text(&"k".repeat(80), "x").is_err());
        assert!(Chunk::text("snow☃", "x").is_err());
    }

    #[test]
    fn test_embed_then_extract() {
        let json = r#"{"spec":"chara_card_v2","data":{"name":"Rin"}}"#;
        let embedded = embed_card(&tiny_png(), json).unwrap();
        assert_eq!(extract_card(&embedded).unwrap(), json);

        let chunks = parse(&embedded).unwrap();
        assert!(chunks[chunks.len() - 1].is_end());
        assert!(chunks[chunks.len() - 2].has_keyword("chara"));
    }

    #[test]
    fn test_embed_requires_iend() {
        let ihdr = Chunk::new(*b"IHDR", vec![0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0]);
        let png = serialize(&[ihdr]);
        assert_eq!(embed_card(&png, "{}"), Err(PngError::MissingIend));
    }

    #[test]
    fn test_extract_without_card() {
        assert_eq!(extract_card(&tiny_png()), Err(PngError::NoCardData));
    }

    #[test]
    fn test_extract_skips_malformed_chunks() {
        let mut chunks = parse(&tiny_png()).unwrap();
        // tEXt with no separator, then a chara chunk with invalid base64
        chunks.insert(1, Chunk::new(*b"tEXt", b"garbage".to_vec()));
        chunks.insert(2, Chunk::text("chara", "!!!not base64!!!").unwrap());
        chunks.insert(3, Chunk::text("CHARA", &STANDARD.encode("{\"ok\":1}")).unwrap());
        let png = serialize(&chunks);

        assert_eq!(extract_card(&png).unwrap(), "{\"ok\":1}");
    }

    #[test]
    fn test_extract_ignores_ccv3() {
        let mut chunks = parse(&tiny_png()).unwrap();
        chunks.insert(1, Chunk::text("ccv3", &STANDARD.encode("{}")).unwrap());
        assert_eq!(extract_card(&serialize(&chunks)), Err(PngError::NoCardData));
    }
}
