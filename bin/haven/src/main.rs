//! Haven CLI - operator tool for a Haven object store.
//!
//! Provides commands for:
//! - Storing files as content-addressed objects
//! - Retrieving, inspecting and deleting objects by hash
//! - Listing the objects held in the local data directory

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use haven_core::{BlobHash, BlobStore};
use haven_store::{LocalStore, StoreConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Haven object store CLI.
#[derive(Parser)]
#[command(name = "haven")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, default_value = "~/.haven/config.toml")]
    config: PathBuf,

    /// Data directory (overrides the configuration file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file
    Put {
        /// File to store
        file: PathBuf,
    },

    /// Retrieve an object
    Get {
        /// Object hash
        hash: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete an object
    Rm {
        /// Object hash
        hash: String,
    },

    /// List stored objects
    Ls,

    /// Show an object's envelope
    Stat {
        /// Object hash
        hash: String,
    },

    /// Show the resolved configuration
    Config,
}

/// CLI configuration.
#[derive(Debug, Clone, PartialEq)]
struct CliConfig {
    /// Root of the local store
    data_dir: PathBuf,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.haven/data"),
        }
    }
}

/// Load configuration from TOML file.
fn load_config(path: &Path) -> Result<CliConfig> {
    let path = expand_tilde(path);

    if !path.exists() {
        info!("No config file found at {:?}, using defaults", path);
        return Ok(CliConfig::default());
    }

    let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Result<CliConfig> {
    let toml: toml::Value = content.parse().context("Failed to parse config file")?;

    let mut config = CliConfig::default();

    // Parse [storage] section
    if let Some(storage) = toml.get("storage") {
        if let Some(data_dir) = storage.get("data_dir").and_then(|v| v.as_str()) {
            config.data_dir = PathBuf::from(data_dir);
        }
    }

    Ok(config)
}

/// Expand ~ to home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

fn parse_hash(hash: &str) -> Result<BlobHash> {
    BlobHash::from_hex(hash).with_context(|| format!("Invalid object hash {:?}", hash))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")?;

    let mut config = load_config(&cli.config)?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    config.data_dir = expand_tilde(&config.data_dir);

    if let Commands::Config = cli.command {
        println!("Config file: {:?}", expand_tilde(&cli.config));
        println!("Data directory: {:?}", config.data_dir);
        return Ok(());
    }

    let store = LocalStore::open(StoreConfig::new(&config.data_dir))
        .with_context(|| format!("Failed to open store at {:?}", config.data_dir))?;

    let result = match cli.command {
        Commands::Put { file } => cmd_put(&store, &file).await,
        Commands::Get { hash, output } => cmd_get(&store, &hash, output.as_deref()).await,
        Commands::Rm { hash } => cmd_rm(&store, &hash).await,
        Commands::Ls => cmd_ls(&store).await,
        Commands::Stat { hash } => cmd_stat(&store, &hash).await,
        Commands::Config => Ok(()),
    };

    store.close().await.context("Failed to close store")?;
    result
}

async fn cmd_put(store: &LocalStore, file: &Path) -> Result<()> {
    info!("Storing {:?}", file);

    let mut input = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("Failed to open {:?}", file))?;
    let envelope = store
        .write_blob(&mut input)
        .await
        .context("Failed to store object")?;

    println!("{}", envelope.hash);
    info!(hash = %envelope.hash, size = envelope.size_bytes, "Stored object");
    Ok(())
}

async fn cmd_get(store: &LocalStore, hash: &str, output: Option<&Path>) -> Result<()> {
    let hash = parse_hash(hash)?;
    let mut reader = store
        .open_blob(&hash)
        .await
        .with_context(|| format!("Failed to open object {}", hash))?;

    match output {
        Some(path) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create {:?}", path))?;
            let copied = tokio::io::copy(&mut reader, &mut file)
                .await
                .context("Failed to write object")?;
            println!("Wrote {} bytes to {:?}", copied, path);
        }
        None => {
            let mut data = Vec::new();
            tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut data)
                .await
                .context("Failed to read object")?;
            std::io::stdout()
                .write_all(&data)
                .context("Failed to write to stdout")?;
        }
    }

    Ok(())
}

async fn cmd_rm(store: &LocalStore, hash: &str) -> Result<()> {
    let hash = parse_hash(hash)?;
    store
        .delete_blob(&hash)
        .await
        .with_context(|| format!("Failed to delete object {}", hash))?;
    println!("Deleted {}", hash);
    Ok(())
}

async fn cmd_ls(store: &LocalStore) -> Result<()> {
    for hash in store.get_blobs().await.context("Failed to list objects")? {
        println!("{}", hash);
    }
    Ok(())
}

async fn cmd_stat(store: &LocalStore, hash: &str) -> Result<()> {
    let hash = parse_hash(hash)?;
    let envelope = store
        .get_blob_envelope(&hash)
        .await
        .with_context(|| format!("Failed to stat object {}", hash))?;

    println!("Hash: {}", envelope.hash);
    println!("Size: {} bytes", envelope.size_bytes);
    println!("Modified: {}", envelope.modified);
    println!("Path: {:?}", store.blob_path(&hash));
    Ok(())
}
