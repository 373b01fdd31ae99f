//! Managed item index.
//!
//! `index.json` at the library root tracks items created through this
//! library. It is authoritative for identity (id, display name, timestamps)
//! but never required: a missing or unreadable index reads as empty.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;

use super::error::LibraryError;

/// Index file name at the library root
pub const INDEX_FILE: &str = "index.json";

/// Collection of managed entries, most recent first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Index {
    pub items: Vec<IndexEntry>,

    /// Raw entries this version does not understand, written back untouched
    foreign: Vec<Value>,
}

/// A single managed item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    /// Managed id, identical to the file stem
    pub id: String,

    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

impl IndexEntry {
    /// Create an entry with both timestamps set to `now`
    pub fn new(id: impl Into<String>, name: impl Into<String>, now: impl Into<String>) -> Self {
        let now = now.into();
        Self {
            id: id.into(),
            name: name.into(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(items: Vec<IndexEntry>) -> Self {
        Self {
            items,
            foreign: Vec::new(),
        }
    }

    /// Get an entry by id
    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut IndexEntry> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Insert an entry at the front (most recent first)
    pub fn prepend(&mut self, entry: IndexEntry) {
        self.items.insert(0, entry);
    }

    /// Remove every entry with the given id; returns true if any was removed
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len() + self.foreign.len();
        self.items.retain(|i| i.id != id);
        self.foreign
            .retain(|raw| raw.get("id").and_then(Value::as_str) != Some(id));
        self.items.len() + self.foreign.len() != before
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Parse index JSON leniently.
    ///
    /// Anything that is not `{ items: [...] }` yields an empty index.
    /// Entries that do not deserialize are kept aside as raw JSON so that a
    /// later write does not lose them.
    pub fn from_json_lenient(content: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(content) else {
            tracing::warn!("Index file is not valid JSON, treating as empty");
            return Self::new();
        };
        let Some(raw_items) = value.get("items").and_then(Value::as_array) else {
            tracing::warn!("Index file has no items array, treating as empty");
            return Self::new();
        };

        let mut index = Self::new();
        for raw in raw_items {
            match serde_json::from_value::<IndexEntry>(raw.clone()) {
                Ok(entry) => index.items.push(entry),
                Err(e) => {
                    tracing::debug!("Keeping unrecognized index entry as-is: {}", e);
                    index.foreign.push(raw.clone());
                }
            }
        }

        index
    }

    /// Serialize as `{ "items": [...] }`, unrecognized entries last
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        let mut items = Vec::with_capacity(self.items.len() + self.foreign.len());
        for entry in &self.items {
            items.push(serde_json::to_value(entry)?);
        }
        items.extend(self.foreign.iter().cloned());

        serde_json::to_string_pretty(&serde_json::json!({ "items": items }))
    }
}

/// Path to the index file
pub fn index_path(dir: &Path) -> PathBuf {
    dir.join(INDEX_FILE)
}

/// Read the index; absent or unreadable files yield an empty index
pub async fn read_index(dir: &Path) -> Index {
    let path = index_path(dir);

    match fs::read_to_string(&path).await {
        Ok(content) => Index::from_json_lenient(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Index::new(),
        Err(e) => {
            tracing::warn!("Failed to read index {}: {}", path.display(), e);
            Index::new()
        }
    }
}

/// Write the index atomically (temp file + rename)
pub async fn write_index(dir: &Path, index: &Index) -> Result<(), LibraryError> {
    fs::create_dir_all(dir).await?;

    let path = index_path(dir);
    let tmp = path.with_extension("json.tmp");
    let content = index
        .to_json_pretty()
        .map_err(|e| LibraryError::Format(format!("Failed to serialize index: {}", e)))?;

    fs::write(&tmp, content).await?;
    if let Err(e) = fs::rename(&tmp, &path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    Ok(())
}
