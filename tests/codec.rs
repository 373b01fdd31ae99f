//! PNG Codec Integration Tests
//!
//! Tests for card embedding round-trips, payload replacement and
//! preservation of unrelated chunks.

use base64::{engine::general_purpose::STANDARD, Engine};
use cardshelf::codec::{embed_card, extract_card, parse, serialize, Chunk, PngError};
use cardshelf::domain::build_from_payload;
use serde_json::json;

/// 1x1 PNG with a color profile-ish ancillary chunk and a comment
fn sample_png() -> Vec<u8> {
    serialize(&[
        Chunk::new(*b"IHDR", vec![0, 0, 0, 1, 0, 0, 0, 1, 8, 2, 0, 0, 0]),
        Chunk::new(*b"gAMA", vec![0, 0, 0xb1, 0x8f]),
        Chunk::text("Comment", "made by hand").unwrap(),
        Chunk::new(*b"IDAT", vec![0x78, 0x9c, 0x63, 0xf8, 0x0f, 0x00, 0x01, 0x01, 0x01, 0x00]),
        Chunk::new(*b"IEND", Vec::new()),
    ])
}

fn card_chunk_count(png: &[u8]) -> usize {
    parse(png)
        .unwrap()
        .iter()
        .filter(|c| c.has_keyword("chara") || c.has_keyword("ccv3"))
        .count()
}

#[test]
fn test_roundtrip_card_json() {
    let card = build_from_payload(
        json!({ "name": "Rin", "description": "ünïcödé ✓", "tags": ["a", "b"] })
            .as_object()
            .unwrap(),
    );
    let text = card.to_json();

    let embedded = embed_card(&sample_png(), &text).unwrap();
    assert_eq!(extract_card(&embedded).unwrap(), text);
}

#[test]
fn test_second_embed_replaces_payload() {
    let once = embed_card(&sample_png(), r#"{"v":1}"#).unwrap();
    let twice = embed_card(&once, r#"{"v":2}"#).unwrap();

    assert_eq!(extract_card(&twice).unwrap(), r#"{"v":2}"#);
    assert_eq!(card_chunk_count(&twice), 1);
}

#[test]
fn test_embed_purges_legacy_keywords() {
    let mut chunks = parse(&sample_png()).unwrap();
    chunks.insert(1, Chunk::text("CCV3", &STANDARD.encode("{\"old\":3}")).unwrap());
    chunks.insert(2, Chunk::text("Chara", &STANDARD.encode("{\"old\":2}")).unwrap());
    let png = serialize(&chunks);
    assert_eq!(card_chunk_count(&png), 2);

    let embedded = embed_card(&png, "{\"new\":true}").unwrap();
    assert_eq!(card_chunk_count(&embedded), 1);
    assert_eq!(extract_card(&embedded).unwrap(), "{\"new\":true}");
}

#[test]
fn test_embed_preserves_other_chunks_in_order() {
    let original = parse(&sample_png()).unwrap();
    let embedded = parse(&embed_card(&sample_png(), "{}").unwrap()).unwrap();

    let survivors: Vec<&Chunk> = embedded
        .iter()
        .filter(|c| !c.has_keyword("chara"))
        .collect();
    let expected: Vec<&Chunk> = original.iter().collect();
    assert_eq!(survivors, expected);

    // Card chunk sits right before IEND
    let n = embedded.len();
    assert!(embedded[n - 1].is_end());
    assert!(embedded[n - 2].has_keyword("chara"));
}

#[test]
fn test_embed_into_non_png() {
    assert_eq!(
        embed_card(b"GIF89a....", "{}"),
        Err(PngError::InvalidSignature)
    );
}

#[test]
fn test_extract_empty_payload_is_not_found() {
    let mut chunks = parse(&sample_png()).unwrap();
    chunks.insert(1, Chunk::text("chara", "").unwrap());
    assert_eq!(extract_card(&serialize(&chunks)), Err(PngError::NoCardData));
}

#[test]
fn test_trailing_bytes_after_iend_ignored() {
    let mut png = sample_png();
    png.extend_from_slice(b"trailing junk");
    assert_eq!(parse(&png).unwrap().len(), 5);
}
