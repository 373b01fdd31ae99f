//! Library items and facade result records.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::card::Card;

/// Where a library item was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    /// Tracked in `index.json`
    Managed,

    /// Found only by scanning the directory
    Filesystem,
}

impl fmt::Display for ItemSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemSource::Managed => write!(f, "managed"),
            ItemSource::Filesystem => write!(f, "filesystem"),
        }
    }
}

/// On-disk form a card is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveFormat {
    /// `<stem>.json` sidecar
    Json,

    /// `<stem>.png` with an embedded `chara` chunk
    Png,
}

impl fmt::Display for SaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveFormat::Json => write!(f, "json"),
            SaveFormat::Png => write!(f, "png"),
        }
    }
}

impl FromStr for SaveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(SaveFormat::Json),
            "png" | "image" => Ok(SaveFormat::Png),
            _ => Err(format!("Unknown save format: {}", s)),
        }
    }
}

/// Directory-level view of one card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryItem {
    /// Opaque external identifier
    pub id: String,

    /// Display name
    pub name: String,

    pub created_at: String,
    pub updated_at: String,

    pub source: ItemSource,

    /// Stem shared by the image and sidecar files
    pub file_base: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub png_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<PathBuf>,
}

impl LibraryItem {
    /// True if at least one file form exists
    pub fn has_files(&self) -> bool {
        self.png_path.is_some() || self.json_path.is_some()
    }
}

/// Result of `Library::list`
#[derive(Debug, Clone, Serialize)]
pub struct LibraryList {
    pub dir: PathBuf,
    pub items: Vec<LibraryItem>,
}

/// Result of `Library::load`
#[derive(Debug, Clone, Serialize)]
pub struct LoadResult {
    pub dir: PathBuf,
    pub card: Card,
    /// Whether a PNG backs this item
    pub has_image: bool,
}

/// Result of `Library::save` / `Library::update`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveResult {
    pub dir: PathBuf,
    pub id: String,
}

/// Current time as a fixed-width sortable timestamp
pub fn timestamp_now() -> String {
    format_timestamp(Utc::now())
}

/// RFC 3339, UTC, millisecond precision, `Z` suffix
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Format a file system time the same way as `timestamp_now`
pub fn format_system_time(at: SystemTime) -> String {
    format_timestamp(DateTime::<Utc>::from(at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(format_timestamp(at), "2024-05-01T12:00:00.000Z");
        assert_eq!(timestamp_now().len(), "2024-05-01T12:00:00.000Z".len());
    }

    #[test]
    fn test_save_format_from_str() {
        assert_eq!("json".parse::<SaveFormat>().unwrap(), SaveFormat::Json);
        assert_eq!("PNG".parse::<SaveFormat>().unwrap(), SaveFormat::Png);
        assert!("gif".parse::<SaveFormat>().is_err());
    }

    #[test]
    fn test_item_wire_format() {
        let item = LibraryItem {
            id: "a".to_string(),
            name: "Foo".to_string(),
            created_at: "2024-01-01T00:00:00.000Z".to_string(),
            updated_at: "2024-01-02T00:00:00.000Z".to_string(),
            source: ItemSource::Managed,
            file_base: "a".to_string(),
            png_path: None,
            json_path: Some(PathBuf::from("/lib/a.json")),
        };

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["source"], "managed");
        assert_eq!(json["fileBase"], "a");
        assert_eq!(json["updatedAt"], "2024-01-02T00:00:00.000Z");
        assert!(json.get("pngPath").is_none());
        assert!(item.has_files());
    }
}
