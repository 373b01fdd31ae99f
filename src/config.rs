//! Configuration for the cardshelf binary.
//!
//! The library itself only takes a root directory; this module decides
//! which one.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variable (CARDSHELF_LIBRARY)
//! 2. Config file (.cardshelf/config.yaml)
//! 3. Defaults (~/.cardshelf/library)
//!
//! Config file discovery:
//! - Searches current directory and parents for .cardshelf/config.yaml
//! - Paths in config file are relative to the project root (parent of .cardshelf/)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::library::{LibraryOptions, DEFAULT_DISPLAY_NAME};

/// Environment override for the library directory
pub const LIBRARY_ENV: &str = "CARDSHELF_LIBRARY";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub library: LibraryConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LibraryConfig {
    /// Library directory (relative to project root)
    pub dir: Option<String>,
    /// Scan cache window in milliseconds
    pub cache_ttl_ms: Option<u64>,
    /// Index name for cards without a name
    pub default_name: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to the card library
    pub library: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Scan cache window
    pub cache_ttl: Duration,
    /// Index name for cards without a name
    pub default_name: String,
}

impl ResolvedConfig {
    /// Library options derived from this configuration
    pub fn library_options(&self) -> LibraryOptions {
        LibraryOptions {
            cache_ttl: self.cache_ttl,
            default_name: self.default_name.clone(),
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".cardshelf").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn default_library() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".cardshelf")
        .join("library"))
}

/// Merge file settings, environment and defaults
fn resolve(
    file: Option<(&Path, ConfigFile)>,
    env_library: Option<String>,
) -> Result<ResolvedConfig> {
    let (config_file, file_dir, library_cfg) = match file {
        Some((path, config)) => {
            // Base directory is the parent of .cardshelf/
            let base_dir = path
                .parent()
                .and_then(|p| p.parent())
                .unwrap_or(Path::new("."));
            let dir = config.library.dir.as_deref().map(|d| resolve_path(base_dir, d));
            (Some(path.to_path_buf()), dir, config.library)
        }
        None => (None, None, LibraryConfig::default()),
    };

    let library = match (env_library, file_dir) {
        (Some(env), _) if !env.is_empty() => PathBuf::from(env),
        (_, Some(dir)) => dir,
        _ => default_library()?,
    };

    Ok(ResolvedConfig {
        library,
        config_file,
        cache_ttl: Duration::from_millis(library_cfg.cache_ttl_ms.unwrap_or(5_000)),
        default_name: library_cfg
            .default_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let env_library = std::env::var(LIBRARY_ENV).ok();

    match find_config_file() {
        Some(path) => {
            let config = load_config_file(&path)?;
            resolve(Some((&path, config)), env_library)
        }
        None => resolve(None, env_library),
    }
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the library directory.
pub fn library_dir() -> Result<PathBuf> {
    Ok(config()?.library.clone())
}
