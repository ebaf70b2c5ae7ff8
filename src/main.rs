//! mptrie CLI - Command line interface for a file-backed trie
//!
//! Keys and values are passed as hex. Each invocation opens the store and
//! works on the root recorded by the last commit.

use anyhow::Context;
use clap::{Parser, Subcommand};
use mptrie::{FileStore, Hash, Trie, TrieConfig};
use std::path::{Path, PathBuf};
use tracing_subscriber::{
    filter::EnvFilter, fmt, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "mptrie")]
#[command(about = "A Merkle Patricia Trie for authenticated key-value state")]
#[command(version)]
struct Cli {
    /// Path to the store file
    #[arg(short, long, default_value = "state.mpt")]
    database: PathBuf,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Keep superseded nodes so every committed root stays readable
    #[arg(long)]
    archive: bool,

    /// JSON file with trie settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Work on this root instead of the last committed one (hex)
    #[arg(long)]
    root: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new store
    Init,

    /// Store a value
    Put {
        /// Key (hex)
        key: String,
        /// Value (hex, may be empty)
        value: String,
    },

    /// Get a value
    Get {
        /// Key (hex)
        key: String,
    },

    /// Delete a value
    Delete {
        /// Key (hex)
        key: String,
    },

    /// List entries under a prefix in key order
    Find {
        /// Key prefix (hex); lists everything if omitted
        prefix: Option<String>,
        /// Only list keys after this one (hex)
        #[arg(long)]
        from: Option<String>,
    },

    /// Show the committed root hash
    Root,

    /// Check the trie's structural invariants
    Verify,

    /// Show store and trie statistics
    Stats,
}

fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let root = cli
        .root
        .as_deref()
        .map(|root| Hash::from_hex(root.strip_prefix("0x").unwrap_or(root)))
        .transpose()
        .context("Invalid root hash")?;

    match cli.command {
        Commands::Init => {
            let store = FileStore::create(&cli.database)?;
            store.sync()?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "message": format!("Created store at {}", cli.database.display())
                }),
            )?;
        }

        Commands::Put { key, value } => {
            let key = parse_hex("key", &key)?;
            let value = parse_hex("value", &value)?;
            let store = open_store(&cli.database)?;
            let root = {
                let mut trie = open_trie(&store, &config, root);
                trie.put(&key, &value)?;
                trie.commit()?
            };
            persist_root(&store, root)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "key": hex::encode(&key),
                    "root": root.to_hex()
                }),
            )?;
        }

        Commands::Get { key } => {
            let key = parse_hex("key", &key)?;
            let store = open_store(&cli.database)?;
            let trie = open_trie(&store, &config, root);
            match trie.try_get(&key)? {
                Some(value) => {
                    output(
                        &cli.format,
                        &serde_json::json!({
                            "key": hex::encode(&key),
                            "value": hex::encode(&value)
                        }),
                    )?;
                }
                None => {
                    output(
                        &cli.format,
                        &serde_json::json!({
                            "status": "error",
                            "message": format!("Key not found: {}", hex::encode(&key))
                        }),
                    )?;
                    std::process::exit(1);
                }
            }
        }

        Commands::Delete { key } => {
            let key = parse_hex("key", &key)?;
            let store = open_store(&cli.database)?;
            let (deleted, root) = {
                let mut trie = open_trie(&store, &config, root);
                let deleted = trie.delete(&key)?;
                (deleted, trie.commit()?)
            };
            persist_root(&store, root)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "key": hex::encode(&key),
                    "deleted": deleted,
                    "root": root.to_hex()
                }),
            )?;
        }

        Commands::Find { prefix, from } => {
            let prefix = match prefix {
                Some(prefix) => parse_hex("prefix", &prefix)?,
                None => Vec::new(),
            };
            let from = from.map(|from| parse_hex("from", &from)).transpose()?;
            let store = open_store(&cli.database)?;
            let trie = open_trie(&store, &config, root);
            let entries = trie.find(&prefix, from.as_deref())?;
            let items: Vec<_> = entries
                .iter()
                .map(|(key, value)| {
                    serde_json::json!({
                        "key": hex::encode(key),
                        "value": hex::encode(value)
                    })
                })
                .collect();
            output(
                &cli.format,
                &serde_json::json!({
                    "count": items.len(),
                    "entries": items
                }),
            )?;
        }

        Commands::Root => {
            let store = open_store(&cli.database)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "root": store.root().to_hex(),
                    "empty": store.root().is_zero()
                }),
            )?;
        }

        Commands::Verify => {
            let store = open_store(&cli.database)?;
            let trie = open_trie(&store, &config, root);
            let stats = trie.verify()?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "root": trie.root_hash().to_hex(),
                    "entries": stats.entries
                }),
            )?;
        }

        Commands::Stats => {
            let store = open_store(&cli.database)?;
            let trie = open_trie(&store, &config, root);
            let stats = trie.verify()?;
            output(
                &cli.format,
                &serde_json::json!({
                    "database": cli.database.display().to_string(),
                    "root": store.root().to_hex(),
                    "records": store.len(),
                    "retain_history": config.retain_history,
                    "trie": stats
                }),
            )?;
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<TrieConfig> {
    let mut config = match &cli.config {
        Some(path) => TrieConfig::load(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => TrieConfig::default(),
    };
    if cli.archive {
        config.retain_history = true;
    }
    Ok(config)
}

fn open_store(path: &Path) -> anyhow::Result<FileStore> {
    let store = FileStore::open_or_create(path)
        .with_context(|| format!("Failed to open store {}", path.display()))?;
    Ok(store)
}

fn open_trie<'a>(
    store: &'a FileStore,
    config: &TrieConfig,
    root: Option<Hash>,
) -> Trie<'a, FileStore> {
    let root = root.unwrap_or_else(|| store.root());
    Trie::from_root(store, root).with_config(config.clone())
}

fn persist_root(store: &FileStore, root: Hash) -> anyhow::Result<()> {
    store.set_root(root);
    store.sync()?;
    Ok(())
}

fn parse_hex(what: &str, input: &str) -> anyhow::Result<Vec<u8>> {
    let input = input.strip_prefix("0x").unwrap_or(input);
    hex::decode(input).with_context(|| format!("Invalid hex {}: {}", what, input))
}

fn output(format: &OutputFormat, value: &serde_json::Value) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(value)?);
        }
        OutputFormat::Text => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}
