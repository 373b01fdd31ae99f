//! Directory scanning with a short-lived cache.
//!
//! Any `.png` / `.json` file (extension in any case) in the library root is a potential card. Files
//! sharing a stem form one item. Display names are derived best-effort:
//! sidecar name, then embedded PNG name, then the stem itself. A corrupt
//! file never fails a scan.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::fs;

use super::error::LibraryError;
use super::ids::{encode_id, is_index_file, JSON_EXT, PNG_EXT};
use crate::codec;
use crate::domain::{format_system_time, timestamp_now, Card, ItemSource, LibraryItem};

/// Default freshness window for scan results
pub const DEFAULT_SCAN_TTL: Duration = Duration::from_secs(5);

/// Which step of the fallback chain produced a display name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSource {
    Sidecar,
    Embedded,
    Stem,
}

/// A display name and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedName {
    pub name: String,
    pub source: NameSource,
}

#[derive(Debug, Clone)]
struct CachedScan {
    dir: PathBuf,
    at: Instant,
    items: Vec<LibraryItem>,
}

/// Scan results keyed by directory, valid for a fixed window
#[derive(Debug)]
pub struct ScanCache {
    ttl: Duration,
    entry: Mutex<Option<CachedScan>>,
}

impl Default for ScanCache {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_TTL)
    }
}

impl ScanCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    /// Cached items for `dir`, if still fresh
    pub fn get(&self, dir: &Path) -> Option<Vec<LibraryItem>> {
        let guard = self.entry.lock().ok()?;
        guard
            .as_ref()
            .filter(|c| c.dir == dir && c.at.elapsed() < self.ttl)
            .map(|c| c.items.clone())
    }

    pub fn store(&self, dir: &Path, items: Vec<LibraryItem>) {
        if let Ok(mut guard) = self.entry.lock() {
            *guard = Some(CachedScan {
                dir: dir.to_path_buf(),
                at: Instant::now(),
                items,
            });
        }
    }

    /// Drop any cached scan
    pub fn invalidate(&self) {
        match self.entry.lock() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

/// Scan `dir`, serving from `cache` when fresh
pub async fn scan_cached(cache: &ScanCache, dir: &Path) -> Result<Vec<LibraryItem>, LibraryError> {
    if let Some(items) = cache.get(dir) {
        tracing::debug!(dir = %dir.display(), count = items.len(), "Scan cache hit");
        return Ok(items);
    }

    let items = scan(dir).await?;
    cache.store(dir, items.clone());
    Ok(items)
}

/// List every card-like file in `dir` as a filesystem item
pub async fn scan(dir: &Path) -> Result<Vec<LibraryItem>, LibraryError> {
    #[derive(Default)]
    struct Pair {
        png: Option<PathBuf>,
        json: Option<PathBuf>,
    }

    let mut by_base: BTreeMap<String, Pair> = BTreeMap::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        match entry.file_type().await {
            Ok(t) if t.is_file() => {}
            _ => continue,
        }

        let path = entry.path();
        if is_index_file(&path) {
            continue;
        }
        let (Some(stem), Some(ext)) = (
            path.file_stem().and_then(|s| s.to_str()),
            path.extension().and_then(|e| e.to_str()),
        ) else {
            tracing::debug!("Skipping {}", path.display());
            continue;
        };

        let stem = stem.to_string();
        if ext.eq_ignore_ascii_case(PNG_EXT) {
            by_base.entry(stem).or_default().png = Some(path);
        } else if ext.eq_ignore_ascii_case(JSON_EXT) {
            by_base.entry(stem).or_default().json = Some(path);
        }
    }

    let mut items = Vec::with_capacity(by_base.len());
    for (base, pair) in by_base {
        items.push(build_item(&base, pair.png, pair.json).await);
    }

    tracing::debug!(dir = %dir.display(), count = items.len(), "Scanned library directory");
    Ok(items)
}

async fn build_item(file_base: &str, png: Option<PathBuf>, json: Option<PathBuf>) -> LibraryItem {
    let stat_path = png.as_ref().or(json.as_ref());
    let metadata = match stat_path {
        Some(p) => fs::metadata(p).await.ok(),
        None => None,
    };

    let updated_at = metadata
        .as_ref()
        .and_then(|m| m.modified().ok())
        .map(format_system_time)
        .unwrap_or_else(timestamp_now);
    let created_at = metadata
        .as_ref()
        .and_then(|m| m.created().ok())
        .map(format_system_time)
        .unwrap_or_else(|| updated_at.clone());

    let derived = derive_name(file_base, png.as_deref(), json.as_deref()).await;

    LibraryItem {
        id: encode_id(file_base),
        name: derived.name,
        created_at,
        updated_at,
        source: ItemSource::Filesystem,
        file_base: file_base.to_string(),
        png_path: png,
        json_path: json,
    }
}

/// Best-effort display name: sidecar, then embedded card, then the stem
pub async fn derive_name(file_base: &str, png: Option<&Path>, json: Option<&Path>) -> DerivedName {
    if let Some(path) = json {
        if let Some(name) = read_name_from_json(path).await {
            return DerivedName {
                name,
                source: NameSource::Sidecar,
            };
        }
    }

    if let Some(path) = png {
        if let Some(name) = read_name_from_png(path).await {
            return DerivedName {
                name,
                source: NameSource::Embedded,
            };
        }
    }

    DerivedName {
        name: file_base.to_string(),
        source: NameSource::Stem,
    }
}

async fn read_name_from_json(path: &Path) -> Option<String> {
    let result: Result<Card, LibraryError> = async {
        let raw = fs::read_to_string(path).await?;
        Card::from_json_str(&raw)
    }
    .await;
    non_empty_name(path, result)
}

async fn read_name_from_png(path: &Path) -> Option<String> {
    let result: Result<Card, LibraryError> = async {
        let raw = fs::read(path).await?;
        let json = codec::extract_card(&raw)?;
        Card::from_json_str(&json)
    }
    .await;
    non_empty_name(path, result)
}

fn non_empty_name(path: &Path, result: Result<Card, LibraryError>) -> Option<String> {
    match result {
        Ok(card) => Some(card.name()).filter(|n| !n.is_empty()),
        Err(e) => {
            tracing::debug!("No card name in {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::png::tests::tiny_png;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_scan_pairs_by_stem() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        std::fs::write(dir.join("a.json"), r#"{"name":"Alpha"}"#).unwrap();
        std::fs::write(dir.join("a.png"), tiny_png()).unwrap();
        std::fs::write(dir.join("b.png"), tiny_png()).unwrap();
        std::fs::write(dir.join("index.json"), r#"{"items":[]}"#).unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();
        std::fs::create_dir(dir.join("folder.png")).unwrap();

        let items = scan(dir).await.unwrap();
        assert_eq!(items.len(), 2);

        let a = &items[0];
        assert_eq!(a.file_base, "a");
        assert_eq!(a.name, "Alpha");
        assert_eq!(a.source, ItemSource::Filesystem);
        assert_eq!(a.id, encode_id("a"));
        assert!(a.png_path.is_some() && a.json_path.is_some());

        let b = &items[1];
        assert_eq!(b.name, "b");
        assert!(b.json_path.is_none());
    }

    #[tokio::test]
    async fn test_scan_accepts_uppercase_extensions() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        std::fs::write(dir.join("Foo.PNG"), tiny_png()).unwrap();
        std::fs::write(dir.join("Bar.Json"), r#"{"name":"Bar"}"#).unwrap();
        std::fs::write(dir.join("INDEX.JSON"), r#"{"items":[]}"#).unwrap();

        let items = scan(dir).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].file_base, "Bar");
        assert_eq!(items[0].name, "Bar");
        assert_eq!(items[1].file_base, "Foo");
        assert_eq!(items[1].png_path.as_deref(), Some(dir.join("Foo.PNG").as_path()));
    }

    #[tokio::test]
    async fn test_name_from_embedded_png() {
        let temp = TempDir::new().unwrap();
        let png = codec::embed_card(&tiny_png(), r#"{"spec":"chara_card_v2","data":{"name":"Mio"}}"#)
            .unwrap();
        let path = temp.path().join("m.png");
        std::fs::write(&path, png).unwrap();

        let derived = derive_name("m", Some(&path), None).await;
        assert_eq!(derived.name, "Mio");
        assert_eq!(derived.source, NameSource::Embedded);
    }

    #[tokio::test]
    async fn test_corrupt_files_fall_back_to_stem() {
        let temp = TempDir::new().unwrap();
        let json = temp.path().join("x.json");
        let png = temp.path().join("x.png");
        std::fs::write(&json, "{{{ broken").unwrap();
        std::fs::write(&png, b"\x89PNG garbage").unwrap();

        let derived = derive_name("x", Some(&png), Some(&json)).await;
        assert_eq!(derived.name, "x");
        assert_eq!(derived.source, NameSource::Stem);
    }

    #[tokio::test]
    async fn test_blank_sidecar_name_falls_through() {
        let temp = TempDir::new().unwrap();
        let json = temp.path().join("y.json");
        std::fs::write(&json, r#"{"name":"   "}"#).unwrap();

        let derived = derive_name("y", None, Some(&json)).await;
        assert_eq!(derived.source, NameSource::Stem);
    }

    #[tokio::test]
    async fn test_cache_window_and_invalidate() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        let cache = ScanCache::new(Duration::from_secs(60));

        std::fs::write(dir.join("a.json"), "{}").unwrap();
        assert_eq!(scan_cached(&cache, dir).await.unwrap().len(), 1);

        std::fs::write(dir.join("b.json"), "{}").unwrap();
        assert_eq!(scan_cached(&cache, dir).await.unwrap().len(), 1);

        cache.invalidate();
        assert_eq!(scan_cached(&cache, dir).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cache_expires() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        let cache = ScanCache::new(Duration::ZERO);

        assert!(scan_cached(&cache, dir).await.unwrap().is_empty());
        std::fs::write(dir.join("a.json"), "{}").unwrap();
        assert_eq!(scan_cached(&cache, dir).await.unwrap().len(), 1);
    }

    #[test]
    fn test_cache_keyed_by_dir() {
        let cache = ScanCache::default();
        cache.store(Path::new("/one"), Vec::new());
        assert!(cache.get(Path::new("/one")).is_some());
        assert!(cache.get(Path::new("/two")).is_none());
    }
}
