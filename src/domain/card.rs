//! Character card model and normalization.
//!
//! Every card is stored in the V2 shape regardless of what was imported:
//! `{ spec: "chara_card_v2", spec_version: "2.0", data: { ... } }`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::library::LibraryError;

/// Canonical schema tag
pub const CARD_SPEC: &str = "chara_card_v2";

/// Canonical schema version
pub const CARD_SPEC_VERSION: &str = "2.0";

/// Stem used when a card has no usable name
pub const DEFAULT_FILE_STEM: &str = "character";

/// Longest file name most file systems accept
pub(crate) const MAX_FILENAME_BYTES: usize = 255;

/// A character card in canonical V2 form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub spec: String,
    pub spec_version: String,
    pub data: Map<String, Value>,
}

impl Card {
    /// Wrap a field mapping as a canonical card
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            spec: CARD_SPEC.to_string(),
            spec_version: CARD_SPEC_VERSION.to_string(),
            data,
        }
    }

    /// Display name from `data.name`, trimmed (empty if absent)
    pub fn name(&self) -> String {
        value_as_name(self.data.get("name"))
    }

    /// Parse and normalize a card from JSON text
    pub fn from_json_str(json: &str) -> Result<Self, LibraryError> {
        let raw: Value = serde_json::from_str(json)
            .map_err(|e| LibraryError::Format(format!("Invalid card JSON: {}", e)))?;
        normalize_imported(raw)
    }

    /// Serialize as 2-space indented JSON
    pub fn to_json_pretty(&self) -> String {
        // A struct of strings and a JSON map cannot fail to serialize
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Serialize as compact JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Normalize an imported payload into a canonical card.
///
/// A payload that already claims `chara_card_v2` with an object `data` has
/// that `data` copied; anything else object-shaped becomes `data` itself,
/// minus stray `spec`/`spec_version` keys.
pub fn normalize_imported(raw: Value) -> Result<Card, LibraryError> {
    let Value::Object(mut obj) = raw else {
        return Err(LibraryError::InvalidPayload(
            "card payload must be a JSON object".to_string(),
        ));
    };

    let is_v2 = obj.get("spec").and_then(Value::as_str) == Some(CARD_SPEC);
    if is_v2 {
        if let Some(Value::Object(data)) = obj.remove("data") {
            return Ok(Card::new(data));
        }
    }

    obj.remove("spec");
    obj.remove("spec_version");
    Ok(Card::new(obj))
}

/// Build a card from a store payload (a plain field mapping)
pub fn build_from_payload(payload: &Map<String, Value>) -> Card {
    Card::new(payload.clone())
}

/// Derive a file-system-safe stem from the card name
pub fn filename_from(card: &Card, fallback: &str) -> String {
    let cleaned = sanitize_stem(&card.name());
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned
    }
}

/// Strip characters illegal in file names and collapse whitespace to `_`
pub fn sanitize_stem(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| !matches!(c, '/' | '?' | '<' | '>' | '\\' | ':' | '*' | '|' | '"'))
        .filter(|c| !c.is_control())
        .collect();

    if stripped == "." || stripped == ".." || is_reserved_device_name(&stripped) {
        return String::new();
    }

    let trimmed = stripped.trim_end_matches(['.', ' ']);
    let truncated = truncate_on_char_boundary(trimmed, MAX_FILENAME_BYTES);

    truncated.split_whitespace().collect::<Vec<_>>().join("_")
}

/// String form of a JSON value used as a display name
pub(crate) fn value_as_name(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string().trim().to_string(),
    }
}

fn is_reserved_device_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name).to_ascii_uppercase();
    match stem.as_str() {
        "CON" | "PRN" | "AUX" | "NUL" => true,
        s if s.len() == 4 && (s.starts_with("COM") || s.starts_with("LPT")) => {
            s.as_bytes()[3].is_ascii_digit()
        }
        _ => false,
    }
}

pub(crate) fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
