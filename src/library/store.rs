//! Library facade.
//!
//! Composes the index, scanner, resolver and codec into the operations
//! callers use: list, load, load_image, save, update, delete.
//!
//! Precedence when merging the two views of the directory: the index wins
//! identity (id, name, timestamps); the scan supplies paths and discovers
//! files the index does not know about.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::fs;
use tracing::{debug, info, instrument};

use super::error::LibraryError;
use super::ids::{
    self, decode_id, ensure_inside, is_index_file, probe_stem, resolve_paths, safe_base,
};
use super::index::{read_index, write_index, Index, IndexEntry};
use super::scanner::{scan_cached, ScanCache, DEFAULT_SCAN_TTL};
use crate::codec;
use crate::domain::card::{
    sanitize_stem, truncate_on_char_boundary, value_as_name, MAX_FILENAME_BYTES,
};
use crate::domain::{
    build_from_payload, filename_from, timestamp_now, Card, ItemSource, LibraryItem, LibraryList,
    LoadResult, SaveFormat, SaveResult, DEFAULT_FILE_STEM,
};

/// Display name used when a payload has none
pub const DEFAULT_DISPLAY_NAME: &str = "Untitled";

/// Tunables for a library instance
#[derive(Debug, Clone)]
pub struct LibraryOptions {
    /// How long a directory scan stays fresh
    pub cache_ttl: Duration,

    /// Index name for payloads without a `name`
    pub default_name: String,
}

impl Default for LibraryOptions {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_SCAN_TTL,
            default_name: DEFAULT_DISPLAY_NAME.to_string(),
        }
    }
}

/// A card library rooted at one directory
#[derive(Debug)]
pub struct Library {
    dir: PathBuf,
    options: LibraryOptions,
    cache: ScanCache,
}

impl Library {
    /// Open a library at `dir` with default options
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_options(dir, LibraryOptions::default())
    }

    pub fn with_options(dir: impl Into<PathBuf>, options: LibraryOptions) -> Self {
        let cache = ScanCache::new(options.cache_ttl);
        Self {
            dir: dir.into(),
            options,
            cache,
        }
    }

    /// Library root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Drop the cached directory scan
    pub fn invalidate_cache(&self) {
        self.cache.invalidate();
    }

    /// List managed and filesystem items, newest first
    pub async fn list(&self) -> Result<LibraryList, LibraryError> {
        self.ensure_dir().await?;
        let index = read_index(&self.dir).await;
        let scanned = scan_cached(&self.cache, &self.dir).await?;

        let mut items = Vec::with_capacity(index.len() + scanned.len());
        let mut claimed: HashSet<&str> = HashSet::new();

        for entry in &index.items {
            let found = scanned.iter().find(|s| s.file_base == entry.id);
            let (png_path, json_path) = match found {
                Some(s) => {
                    claimed.insert(s.file_base.as_str());
                    (s.png_path.clone(), s.json_path.clone())
                }
                None => self.probe_managed(&entry.id).await,
            };

            items.push(LibraryItem {
                id: entry.id.clone(),
                name: entry.name.clone(),
                created_at: entry.created_at.clone(),
                updated_at: entry.updated_at.clone(),
                source: ItemSource::Managed,
                file_base: entry.id.clone(),
                png_path,
                json_path,
            });
        }

        items.extend(
            scanned
                .iter()
                .filter(|s| !claimed.contains(s.file_base.as_str()))
                .cloned(),
        );
        items.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(LibraryList {
            dir: self.dir.clone(),
            items,
        })
    }

    /// Load and normalize the card behind `id`
    #[instrument(skip(self))]
    pub async fn load(&self, id: &str) -> Result<LoadResult, LibraryError> {
        self.ensure_dir().await?;
        let index = read_index(&self.dir).await;
        let resolved = resolve_paths(&self.dir, &index, id).await?;

        let card = if let Some(path) = &resolved.json_path {
            let raw = fs::read_to_string(path).await?;
            Card::from_json_str(&raw)?
        } else if let Some(path) = &resolved.png_path {
            let raw = fs::read(path).await?;
            Card::from_json_str(&codec::extract_card(&raw)?)?
        } else {
            return Err(LibraryError::NotFound(format!("Card not found: {}", id)));
        };

        Ok(LoadResult {
            dir: self.dir.clone(),
            card,
            has_image: resolved.png_path.is_some(),
        })
    }

    /// Raw PNG bytes behind `id`
    pub async fn load_image(&self, id: &str) -> Result<Vec<u8>, LibraryError> {
        self.ensure_dir().await?;
        let index = read_index(&self.dir).await;
        let resolved = resolve_paths(&self.dir, &index, id).await?;

        match resolved.png_path {
            Some(path) => Ok(fs::read(path).await?),
            None => Err(LibraryError::NotFound(format!("Image not found: {}", id))),
        }
    }

    /// Save a new card under a fresh id
    pub async fn save(
        &self,
        payload: &Map<String, Value>,
        format: SaveFormat,
        avatar: Option<&[u8]>,
    ) -> Result<SaveResult, LibraryError> {
        let result = self.save_inner(payload, format, avatar).await;
        self.cache.invalidate();
        result
    }

    /// Rewrite an existing card in place
    pub async fn update(
        &self,
        id: &str,
        payload: &Map<String, Value>,
        format: SaveFormat,
        avatar: Option<&[u8]>,
    ) -> Result<SaveResult, LibraryError> {
        let result = self.update_inner(id, payload, format, avatar).await;
        self.cache.invalidate();
        result
    }

    /// Delete both file forms and the index entry for `id`
    pub async fn delete(&self, id: &str) -> Result<(), LibraryError> {
        let result = self.delete_inner(id).await;
        self.cache.invalidate();
        result
    }

    /// Import an external `.json` or `.png` card file as a new item
    pub async fn import_file(&self, path: &Path) -> Result<SaveResult, LibraryError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some(ids::JSON_EXT) => {
                let raw = fs::read_to_string(path).await?;
                let card = Card::from_json_str(&raw)?;
                self.save(&card.data, SaveFormat::Json, None).await
            }
            Some(ids::PNG_EXT) => {
                let raw = fs::read(path).await?;
                let card = Card::from_json_str(&codec::extract_card(&raw)?)?;
                self.save(&card.data, SaveFormat::Png, Some(&raw)).await
            }
            _ => Err(LibraryError::Validation(format!(
                "Unsupported card file: {}",
                path.display()
            ))),
        }
    }

    /// Card behind `id` plus a suggested download file stem
    pub async fn export_card(&self, id: &str) -> Result<(String, Card), LibraryError> {
        let loaded = self.load(id).await?;
        let stem = filename_from(&loaded.card, DEFAULT_FILE_STEM);
        Ok((stem, loaded.card))
    }

    #[instrument(skip(self, payload, avatar))]
    async fn save_inner(
        &self,
        payload: &Map<String, Value>,
        format: SaveFormat,
        avatar: Option<&[u8]>,
    ) -> Result<SaveResult, LibraryError> {
        self.ensure_dir().await?;
        check_avatar(format, avatar)?;

        let card = build_from_payload(payload);
        let name = value_as_name(payload.get("name"));
        let id = self.make_id(&name).await;
        let now = timestamp_now();

        self.write_card_files(&id, &card, format, avatar).await?;

        let mut index = read_index(&self.dir).await;
        index.prepend(IndexEntry::new(&id, self.display_name(name), now));
        write_index(&self.dir, &index).await?;

        info!(%id, %format, "Saved card");
        Ok(SaveResult {
            dir: self.dir.clone(),
            id,
        })
    }

    #[instrument(skip(self, payload, avatar))]
    async fn update_inner(
        &self,
        id: &str,
        payload: &Map<String, Value>,
        format: SaveFormat,
        avatar: Option<&[u8]>,
    ) -> Result<SaveResult, LibraryError> {
        self.ensure_dir().await?;
        let mut index = read_index(&self.dir).await;
        let resolved = resolve_paths(&self.dir, &index, id).await?;
        if !resolved.exists() {
            return Err(LibraryError::NotFound(format!("Card not found: {}", id)));
        }
        check_avatar(format, avatar)?;

        let card = build_from_payload(payload);
        let file_base = resolved.file_base;
        let name = self.display_name(value_as_name(payload.get("name")));
        let now = timestamp_now();

        self.write_card_files(&file_base, &card, format, avatar).await?;

        match index.get_mut(&file_base) {
            Some(entry) => {
                entry.name = name;
                entry.updated_at = now;
            }
            None => {
                debug!(%file_base, "Adopting filesystem item into index");
                index.prepend(IndexEntry::new(&file_base, name, now));
            }
        }
        write_index(&self.dir, &index).await?;

        info!(id = %file_base, %format, "Updated card");
        Ok(SaveResult {
            dir: self.dir.clone(),
            id: file_base,
        })
    }

    #[instrument(skip(self))]
    async fn delete_inner(&self, id: &str) -> Result<(), LibraryError> {
        self.ensure_dir().await?;
        let index = read_index(&self.dir).await;

        let mut candidates: Vec<String> = Vec::new();
        let from_index = index.get(id).map(|e| e.id.clone());
        for candidate in from_index
            .into_iter()
            .chain(std::iter::once(id.to_string()))
            .chain(decode_id(id))
        {
            if !candidate.is_empty() && !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }

        let mut found = None;
        for candidate in &candidates {
            let Ok(base) = safe_base(candidate) else {
                continue;
            };
            let resolved = probe_stem(&self.dir, &base).await;
            if resolved.exists() {
                found = Some(resolved);
                break;
            }
        }
        let resolved =
            found.ok_or_else(|| LibraryError::NotFound(format!("Card not found: {}", id)))?;

        let png = match &resolved.png_path {
            Some(p) => Some(ensure_inside(&self.dir, p).await?),
            None => None,
        };
        let json = match &resolved.json_path {
            Some(p) => Some(ensure_inside(&self.dir, p).await?),
            None => None,
        };

        for path in png.iter().chain(json.iter()) {
            remove_if_exists(path).await?;
        }

        let mut index = read_index(&self.dir).await;
        if index.remove(&resolved.file_base) {
            write_index(&self.dir, &index).await?;
        }

        info!(file_base = %resolved.file_base, "Deleted card");
        Ok(())
    }

    /// Write one form of the card and remove the other form at the same stem.
    ///
    /// An existing file of the written form is overwritten in place, whatever
    /// the case of its extension.
    async fn write_card_files(
        &self,
        file_base: &str,
        card: &Card,
        format: SaveFormat,
        avatar: Option<&[u8]>,
    ) -> Result<(), LibraryError> {
        let json = ids::json_path(&self.dir, file_base);
        if is_index_file(&json) {
            return Err(LibraryError::InvalidPath(format!(
                "{} would overwrite the library index",
                json.display()
            )));
        }
        let existing = probe_stem(&self.dir, file_base).await;

        match format {
            SaveFormat::Json => {
                let target = existing.json_path.unwrap_or(json);
                fs::write(&target, card.to_json_pretty()).await?;
                if let Some(png) = &existing.png_path {
                    remove_if_exists(png).await?;
                }
            }
            SaveFormat::Png => {
                let avatar = avatar.ok_or_else(missing_avatar)?;
                let embedded = codec::embed_card(avatar, &card.to_json())?;
                let target = existing
                    .png_path
                    .unwrap_or_else(|| ids::png_path(&self.dir, file_base));
                fs::write(&target, embedded).await?;
                if let Some(json) = &existing.json_path {
                    remove_if_exists(json).await?;
                }
            }
        }

        Ok(())
    }

    /// `<sanitized name>-<unix millis>`, bumped until no file uses it.
    ///
    /// The name part is shortened so the full file name, extension included,
    /// stays within `MAX_FILENAME_BYTES`.
    async fn make_id(&self, name: &str) -> String {
        let sanitized = sanitize_stem(name);
        let mut stamp = Utc::now().timestamp_millis();
        let reserved = format!("-{}", stamp).len() + ids::JSON_EXT.len().max(ids::PNG_EXT.len()) + 1;
        let base = match truncate_on_char_boundary(&sanitized, MAX_FILENAME_BYTES - reserved) {
            "" => DEFAULT_FILE_STEM,
            s => s,
        };

        loop {
            let id = format!("{}-{}", base, stamp);
            if !is_index_file(&ids::json_path(&self.dir, &id))
                && !probe_stem(&self.dir, &id).await.exists()
            {
                return id;
            }
            stamp += 1;
        }
    }

    async fn probe_managed(&self, id: &str) -> (Option<PathBuf>, Option<PathBuf>) {
        match safe_base(id) {
            Ok(base) => {
                let resolved = probe_stem(&self.dir, &base).await;
                (resolved.png_path, resolved.json_path)
            }
            Err(_) => (None, None),
        }
    }

    fn display_name(&self, name: String) -> String {
        if name.is_empty() {
            self.options.default_name.clone()
        } else {
            name
        }
    }

    async fn ensure_dir(&self) -> Result<(), LibraryError> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }
}

fn check_avatar(format: SaveFormat, avatar: Option<&[u8]>) -> Result<(), LibraryError> {
    if format == SaveFormat::Png && avatar.is_none() {
        return Err(missing_avatar());
    }
    Ok(())
}

fn missing_avatar() -> LibraryError {
    LibraryError::Validation("Avatar image required for PNG save".to_string())
}

async fn remove_if_exists(path: &Path) -> Result<(), LibraryError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
