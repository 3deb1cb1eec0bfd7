//! # coffer CLI
//!
//! Command-line interface for the Coffer immutable file store.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coffer_cas::{DiskBackend, Owner, OwnerKey};
use coffer_config::logging::{init_logging, LogLevel};
use coffer_config::{log_cli_debug, log_cli_info, Config};
use coffer_fs::ImmutableFs;
use coffer_store::{EntryId, LmdbStore};

mod keys;

type CofferFs = ImmutableFs<LmdbStore, DiskBackend>;

/// Coffer - immutable, deduplicated, per-owner encrypted file store
#[derive(Parser)]
#[command(name = "coffer")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Blob root directory
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Entry database directory
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Owner id
    #[arg(long, global = true, allow_negative_numbers = true)]
    owner: Option<i64>,

    /// Hex key file; content is encrypted under this key
    #[arg(long, global = true)]
    key_file: Option<PathBuf>,

    /// Refuse all writes
    #[arg(long, global = true)]
    read_only: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file and print its new id
    Put {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Name to store under (default: the file's name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Write a stored file to stdout
    Cat {
        /// Logical path, e.g. 12/report.pdf
        #[arg(value_name = "ID/NAME")]
        path: String,
    },

    /// Show metadata of a stored file
    Stat {
        #[arg(value_name = "ID/NAME")]
        path: String,
    },

    /// List stored files by id
    Ls {
        #[arg(value_name = "IDS", required = true)]
        ids: Vec<EntryId>,
    },

    /// Generate a random owner key file
    Keygen {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogLevel::from_verbosity(cli.verbose));

    coffer_config::reload().context("Failed to load configuration")?;
    let mut config = coffer_config::config().clone();
    apply_cli_overrides(&mut config, &cli);
    log_cli_debug!(
        "Resolved configuration",
        owner = config.owner.id,
        encrypted = config.owner.key_file.is_some()
    );

    let mut stdout = io::stdout().lock();
    match cli.command {
        Commands::Put { file, name } => {
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .context("FILE has no file name; pass --name")?
                    .to_string_lossy()
                    .into_owned(),
            };
            let contents =
                fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let coffer = open_fs(&config, cli.read_only, true)?;
            let id = coffer
                .write(&name, &contents)
                .with_context(|| format!("Failed to store {}", file.display()))?;
            log_cli_info!("Stored file", id = id, size = contents.len());
            writeln!(stdout, "{}", id)?;
        }
        Commands::Cat { path } => {
            let coffer = open_fs(&config, cli.read_only, false)?;
            let mut file = coffer.open(&path)?;
            io::copy(&mut file, &mut stdout).context("Failed to read file contents")?;
        }
        Commands::Stat { path } => {
            let coffer = open_fs(&config, cli.read_only, false)?;
            let file = coffer.open(&path)?;
            let entry = file.entry();
            let info = file.stat();
            writeln!(stdout, "Path:     {}", entry.path())?;
            writeln!(stdout, "Size:     {} ({} bytes)", entry.format_size(), info.size())?;
            writeln!(stdout, "Mode:     {:04o}", info.mode())?;
            writeln!(stdout, "Modified: {}", entry.format_time())?;
            writeln!(stdout, "Owner:    {}", entry.owner_id)?;
            writeln!(stdout, "Checksum: {}", entry.checksum)?;
        }
        Commands::Ls { ids } => {
            let coffer = open_fs(&config, cli.read_only, false)?;
            let wanted: HashMap<EntryId, bool> = ids.into_iter().map(|id| (id, true)).collect();
            for entry in coffer.list(None, &wanted)? {
                writeln!(
                    stdout,
                    "{}\t{}\t{}",
                    entry.path(),
                    entry.format_size(),
                    entry.format_time()
                )?;
            }
        }
        Commands::Keygen { file, force } => {
            keys::write_key(&file, &OwnerKey::random(), force)?;
            log_cli_info!("Generated owner key");
            writeln!(stdout, "{}", file.display())?;
        }
        Commands::Config => {
            write!(stdout, "{}", config.to_toml()?)?;
        }
    }
    Ok(())
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(root) = &cli.root {
        config.storage.root = root.clone();
    }
    if let Some(db) = &cli.db {
        config.storage.db = db.clone();
    }
    if let Some(owner) = cli.owner {
        config.owner.id = owner;
    }
    if let Some(key_file) = &cli.key_file {
        config.owner.key_file = Some(key_file.clone());
    }
}

/// Wire a disk backend and LMDB store for the configured owner.
/// `create_root` creates a missing blob root instead of failing.
fn open_fs(config: &Config, read_only: bool, create_root: bool) -> Result<CofferFs> {
    let root = &config.storage.root;
    if create_root && !read_only {
        fs::create_dir_all(root)
            .with_context(|| format!("Failed to create blob root {}", root.display()))?;
    }
    let backend = DiskBackend::new(root)
        .with_context(|| format!("Blob root {} is not a directory", root.display()))?;
    let store = LmdbStore::open(&config.storage.db).with_context(|| {
        format!(
            "Failed to open entry database {}",
            config.storage.db.display()
        )
    })?;

    let mut owner = Owner::new(config.owner.id);
    if let Some(key_file) = &config.owner.key_file {
        owner = owner.with_key(keys::read_key(key_file)?);
    }

    let coffer = ImmutableFs::new(backend, store, owner);
    Ok(if read_only { coffer.read_only() } else { coffer })
}
