//! Identity and path resolution.
//!
//! Items are addressed by an opaque id. Managed items use their raw file
//! stem as id; filesystem items use the base64url-encoded stem. Resolution
//! tries, in order:
//!
//! 1. the id itself, if a managed index entry has exactly that id
//! 2. the decoded id, if it decodes and is a safe stem
//! 3. the raw id, if it is a safe stem
//!
//! No resolved path may leave the library root.

use std::path::{Component, Path, PathBuf};

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use tokio::fs;

use super::error::LibraryError;
use super::index::{Index, INDEX_FILE};

/// URL-safe base64, unpadded on encode, padding-agnostic on decode
const ID_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Image file extension
pub const PNG_EXT: &str = "png";

/// Sidecar file extension
pub const JSON_EXT: &str = "json";

/// A stem and whichever of its files exist on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub file_base: String,
    pub png_path: Option<PathBuf>,
    pub json_path: Option<PathBuf>,
}

impl ResolvedPaths {
    pub fn exists(&self) -> bool {
        self.png_path.is_some() || self.json_path.is_some()
    }
}

/// Encode a file stem as an opaque, URL-safe id
pub fn encode_id(file_base: &str) -> String {
    ID_ENGINE.encode(file_base.as_bytes())
}

/// Decode an opaque id back to a file stem.
///
/// Returns `None` when the id is not valid base64url or does not decode to
/// non-empty UTF-8; such ids may simply be raw managed ids.
pub fn decode_id(id: &str) -> Option<String> {
    let bytes = ID_ENGINE.decode(id.as_bytes()).ok()?;
    let decoded = String::from_utf8(bytes).ok()?;
    if decoded.is_empty() {
        None
    } else {
        Some(decoded)
    }
}

/// Accept a candidate only if it is a single, plain path component
pub fn safe_base(candidate: &str) -> Result<String, LibraryError> {
    let invalid = || LibraryError::InvalidPath(format!("Invalid file identifier: {:?}", candidate));

    if candidate.is_empty() || candidate.contains(['/', '\\', '\0']) {
        return Err(invalid());
    }

    let base = Path::new(candidate)
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(invalid)?;

    if base != candidate {
        return Err(invalid());
    }
    Ok(base.to_string())
}

/// Ordered, de-duplicated list of stems an id may refer to
pub fn resolve_candidates(index: &Index, id: &str) -> Result<Vec<String>, LibraryError> {
    if index.contains(id) {
        if let Ok(base) = safe_base(id) {
            return Ok(vec![base]);
        }
    }

    let mut candidates = Vec::new();
    if let Some(decoded) = decode_id(id) {
        if let Ok(base) = safe_base(&decoded) {
            candidates.push(base);
        }
    }
    match safe_base(id) {
        Ok(base) if !candidates.contains(&base) => candidates.push(base),
        Ok(_) => {}
        Err(e) if candidates.is_empty() => return Err(e),
        Err(_) => {}
    }

    Ok(candidates)
}

/// Resolve an id to the first candidate stem with a file on disk.
///
/// If no candidate has files, the first candidate is returned with no paths
/// so callers can tell "missing" apart from a malformed id.
pub async fn resolve_paths(dir: &Path, index: &Index, id: &str) -> Result<ResolvedPaths, LibraryError> {
    let candidates = resolve_candidates(index, id)?;

    for base in &candidates {
        let resolved = probe_stem(dir, base).await;
        if resolved.exists() {
            tracing::debug!(id, file_base = %base, "Resolved id");
            return Ok(resolved);
        }
    }

    Ok(ResolvedPaths {
        file_base: candidates.into_iter().next().unwrap_or_default(),
        png_path: None,
        json_path: None,
    })
}

/// Check which file forms exist for a stem.
///
/// The lowercase extension is tried first; other spellings (`Foo.PNG`) are
/// found by listing the directory.
pub async fn probe_stem(dir: &Path, file_base: &str) -> ResolvedPaths {
    let png = png_path(dir, file_base);
    let json = json_path(dir, file_base);

    let mut resolved = ResolvedPaths {
        file_base: file_base.to_string(),
        png_path: is_file(&png).await.then_some(png),
        json_path: is_file(&json).await.then_some(json),
    };
    if !(resolved.png_path.is_some() && resolved.json_path.is_some()) {
        probe_other_case(dir, &mut resolved).await;
    }
    if resolved.json_path.as_deref().is_some_and(is_index_file) {
        resolved.json_path = None;
    }

    resolved
}

async fn probe_other_case(dir: &Path, resolved: &mut ResolvedPaths) {
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.file_stem().and_then(|s| s.to_str()) != Some(resolved.file_base.as_str()) {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !is_file(&path).await {
            continue;
        }

        if resolved.png_path.is_none() && ext.eq_ignore_ascii_case(PNG_EXT) {
            resolved.png_path = Some(path);
        } else if resolved.json_path.is_none() && ext.eq_ignore_ascii_case(JSON_EXT) {
            resolved.json_path = Some(path);
        }
    }
}

/// Image path for a stem
pub fn png_path(dir: &Path, file_base: &str) -> PathBuf {
    dir.join(format!("{}.{}", file_base, PNG_EXT))
}

/// Sidecar path for a stem
pub fn json_path(dir: &Path, file_base: &str) -> PathBuf {
    dir.join(format!("{}.{}", file_base, JSON_EXT))
}

/// Fail unless `path` lies strictly inside `root`.
///
/// Both sides are canonicalized when they exist, so symlinks pointing out of
/// the root are rejected too.
pub async fn ensure_inside(root: &Path, path: &Path) -> Result<PathBuf, LibraryError> {
    let root = canonical_or_normalized(root).await;
    let resolved = canonical_or_normalized(path).await;

    if resolved != root && resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(LibraryError::InvalidPath(format!(
            "{} is outside {}",
            path.display(),
            root.display()
        )))
    }
}

pub(crate) fn is_index_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.eq_ignore_ascii_case(INDEX_FILE))
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

async fn canonical_or_normalized(path: &Path) -> PathBuf {
    match fs::canonicalize(path).await {
        Ok(p) => p,
        Err(_) => normalize_lexically(&absolute(path)),
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
