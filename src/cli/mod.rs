//! Command-line interface for cardshelf.
//!
//! Provides commands for listing, inspecting, saving, updating, importing,
//! exporting and deleting cards in a library directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::config;
use crate::domain::{Card, LibraryItem, SaveFormat};
use crate::library::Library;

/// cardshelf - Character card library manager
#[derive(Parser, Debug)]
#[command(name = "cardshelf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Library directory (overrides config and CARDSHELF_LIBRARY)
    #[arg(short, long, global = true)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List cards in the library (newest first)
    List {
        /// Maximum number of items to show
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Print items as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a card
    Show {
        /// Card ID
        id: String,

        /// Print the full card JSON
        #[arg(long)]
        json: bool,
    },

    /// Save a new card from a JSON file
    Save {
        /// Card JSON (V2 card or flat field mapping)
        file: PathBuf,

        /// Avatar PNG to embed the card into
        #[arg(short, long)]
        avatar: Option<PathBuf>,

        /// Storage format (defaults to png when an avatar is given)
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,
    },

    /// Replace an existing card with the contents of a JSON file
    Update {
        /// Card ID
        id: String,

        /// Card JSON (V2 card or flat field mapping)
        file: PathBuf,

        /// Avatar PNG to embed the card into
        #[arg(short, long)]
        avatar: Option<PathBuf>,

        /// Storage format (defaults to png when an avatar is given)
        #[arg(short, long, value_enum)]
        format: Option<FormatArg>,
    },

    /// Import a .json or .png card file from elsewhere
    Import {
        /// Card file
        file: PathBuf,
    },

    /// Export a card as JSON
    Export {
        /// Card ID
        id: String,

        /// Output path (defaults to <name>.json in the current directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Write a card's PNG to a file
    Image {
        /// Card ID
        id: String,

        /// Output path
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Delete a card (both file forms and its index entry)
    Delete {
        /// Card ID
        id: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Storage format for CLI (maps to SaveFormat)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    /// JSON sidecar
    Json,

    /// PNG with embedded card
    Png,
}

impl From<FormatArg> for SaveFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Json => SaveFormat::Json,
            FormatArg::Png => SaveFormat::Png,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Config => show_config(self.dir.as_deref()),
            command => {
                let library = open_library(self.dir)?;
                run_command(command, &library).await
            }
        }
    }
}

/// Execute a library command
async fn run_command(command: Commands, library: &Library) -> Result<()> {
    match command {
        Commands::List { limit, json } => list_cards(library, limit, json).await,
        Commands::Show { id, json } => show_card(library, &id, json).await,
        Commands::Save {
            file,
            avatar,
            format,
        } => save_card(library, None, &file, avatar.as_deref(), format).await,
        Commands::Update {
            id,
            file,
            avatar,
            format,
        } => save_card(library, Some(&id), &file, avatar.as_deref(), format).await,
        Commands::Import { file } => import_card(library, &file).await,
        Commands::Export { id, out } => export_card(library, &id, out).await,
        Commands::Image { id, out } => write_image(library, &id, &out).await,
        Commands::Delete { id } => delete_card(library, &id).await,
        Commands::Config => show_config(Some(library.dir())),
    }
}

fn open_library(dir_override: Option<PathBuf>) -> Result<Library> {
    let cfg = config::config()?;
    let dir = dir_override.unwrap_or_else(|| cfg.library.clone());
    Ok(Library::with_options(dir, cfg.library_options()))
}

/// List cards
async fn list_cards(library: &Library, limit: usize, as_json: bool) -> Result<()> {
    let list = library.list().await?;
    let items: Vec<&LibraryItem> = list.items.iter().take(limit).collect();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("Library at {} is empty. Use 'cardshelf save <card.json>' to add one.", list.dir.display());
        return Ok(());
    }

    println!("{:<40} {:<11} {:<25} {:<30}", "ID", "SOURCE", "UPDATED", "NAME");
    println!("{}", "-".repeat(108));

    for item in &items {
        println!(
            "{:<40} {:<11} {:<25} {:<30}",
            truncate(&item.id, 40),
            item.source.to_string(),
            item.updated_at,
            truncate(&item.name, 30)
        );
    }

    println!("\nTotal: {} items in {}", list.items.len(), list.dir.display());

    Ok(())
}

/// Show a card
async fn show_card(library: &Library, id: &str, as_json: bool) -> Result<()> {
    let loaded = library.load(id).await?;

    if as_json {
        println!("{}", loaded.card.to_json_pretty());
        return Ok(());
    }

    let name = loaded.card.name();
    println!("  ID:      {}", id);
    println!("  Name:    {}", if name.is_empty() { "(unnamed)" } else { name.as_str() });
    println!("  Spec:    {} {}", loaded.card.spec, loaded.card.spec_version);
    println!("  Image:   {}", if loaded.has_image { "yes" } else { "no" });
    println!("  Fields:  {}", loaded.card.data.keys().cloned().collect::<Vec<_>>().join(", "));

    Ok(())
}

/// Save a new card or update an existing one
async fn save_card(
    library: &Library,
    id: Option<&str>,
    file: &Path,
    avatar: Option<&Path>,
    format: Option<FormatArg>,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read card file: {}", file.display()))?;
    let card = Card::from_json_str(&raw)?;

    let avatar_bytes = match avatar {
        Some(path) => Some(
            tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read avatar: {}", path.display()))?,
        ),
        None => None,
    };

    let format = match format {
        Some(f) => f.into(),
        None if avatar_bytes.is_some() => SaveFormat::Png,
        None => SaveFormat::Json,
    };

    let saved = match id {
        Some(id) => library
            .update(id, &card.data, format, avatar_bytes.as_deref())
            .await?,
        None => library.save(&card.data, format, avatar_bytes.as_deref()).await?,
    };

    println!("{}", saved.id);
    eprintln!("[Saved as {} in {}]", format, saved.dir.display());

    Ok(())
}

/// Import an external card file
async fn import_card(library: &Library, file: &Path) -> Result<()> {
    let saved = library.import_file(file).await?;
    println!("{}", saved.id);
    eprintln!("[Imported {} into {}]", file.display(), saved.dir.display());
    Ok(())
}

/// Export a card as JSON
async fn export_card(library: &Library, id: &str, out: Option<PathBuf>) -> Result<()> {
    let (stem, card) = library.export_card(id).await?;
    let out = out.unwrap_or_else(|| PathBuf::from(format!("{}.json", stem)));

    tokio::fs::write(&out, card.to_json_pretty())
        .await
        .with_context(|| format!("Failed to write export: {}", out.display()))?;

    eprintln!("[Exported to {}]", out.display());
    Ok(())
}

/// Write a card's PNG to a file
async fn write_image(library: &Library, id: &str, out: &Path) -> Result<()> {
    let bytes = library.load_image(id).await?;

    tokio::fs::write(out, &bytes)
        .await
        .with_context(|| format!("Failed to write image: {}", out.display()))?;

    eprintln!("[Wrote {} bytes to {}]", bytes.len(), out.display());
    Ok(())
}

/// Delete a card
async fn delete_card(library: &Library, id: &str) -> Result<()> {
    library.delete(id).await?;
    eprintln!("[Deleted {}]", id);
    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config(dir_override: Option<&Path>) -> Result<()> {
    let cfg = config::config()?;

    println!("cardshelf configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Library:");
    match dir_override {
        Some(dir) => println!("  Directory:    {} (from --dir)", dir.display()),
        None => println!("  Directory:    {}", cfg.library.display()),
    }
    println!("  Scan cache:   {} ms", cfg.cache_ttl.as_millis());
    println!("  Default name: {}", cfg.default_name);

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}
