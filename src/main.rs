use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
mod auth;
mod session;
use diarium::{
    BlobLimits, Journal, JournalConfig, JournalEntry, KdfParams, Key, KeyFile, default_config,
    derive_key_with_params,
};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, clap::Args)]
struct Argon2Args {
    /// Argon2 memory cost in KiB (default: 65536)
    #[arg(long = "argon-mem")]
    mem_cost_kib: Option<u32>,

    /// Argon2 time cost / iterations (default: 3)
    #[arg(long = "argon-time")]
    time_cost: Option<u32>,

    /// Argon2 parallelism (default: 1)
    #[arg(long = "argon-parallelism")]
    parallelism: Option<u32>,
}

impl Argon2Args {
    fn to_kdf_params(&self) -> Result<KdfParams> {
        let default = KdfParams::default();

        Ok(KdfParams::new(
            self.mem_cost_kib.unwrap_or(default.mem_cost_kib()),
            self.time_cost.unwrap_or(default.time_cost()),
            self.parallelism.unwrap_or(default.parallelism()),
        )?)
    }
}

#[derive(Debug, clap::Args)]
struct KeySource {
    /// Read key text instead of deriving the key from a passphrase
    #[arg(long, default_value_t = false)]
    raw: bool,

    #[command(flatten)]
    argon2: Argon2Args,
}

impl KeySource {
    fn read_key(&self, confirm: bool) -> Result<Key> {
        if self.raw {
            let text = auth::read_secret("Key: ")?;
            return Ok(Key::from_text(&text)?);
        }

        let passphrase = if confirm {
            auth::read_secret_with_confirmation("Passphrase: ")?
        } else {
            auth::read_secret("Passphrase: ")?
        };
        let kdf = self.argon2.to_kdf_params()?;
        Ok(derive_key_with_params(&passphrase, kdf)?)
    }
}

#[derive(Debug, Parser)]
#[command(name = "diarium")]
#[command(version, about = "Calendar journal with an encrypted local entry store.")]
struct Cli {
    /// Path to the journal database
    #[arg(long, global = true, value_name = "PATH", env = "DIARIUM_DB")]
    db: Option<PathBuf>,

    /// Path to the key file
    #[arg(long, global = true, value_name = "PATH", env = "DIARIUM_KEY_FILE")]
    key_file: Option<PathBuf>,

    /// Largest photo or attachment accepted, in bytes
    #[arg(long, global = true, value_name = "BYTES", env = "DIARIUM_MAX_BLOB_BYTES")]
    max_blob_bytes: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Creates the key file (if missing) and the journal database
    Init,

    /// Writes the key file from a passphrase or raw key text
    Keygen {
        #[command(flatten)]
        source: KeySource,
    },

    /// Saves a new entry for a date (YYYY-MM-DD)
    #[command(arg_required_else_help = true)]
    Write {
        date: NaiveDate,

        /// Entry text; read from stdin when omitted
        text: Option<String>,

        /// Photo file to attach (repeatable)
        #[arg(long = "photo", value_name = "FILE")]
        photos: Vec<PathBuf>,

        /// Attachment file (repeatable)
        #[arg(long = "attach", value_name = "FILE")]
        attachments: Vec<PathBuf>,
    },

    /// Prints the entry for a date
    #[command(arg_required_else_help = true)]
    Read {
        date: NaiveDate,

        /// Directory to export photos and attachments into
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,

        /// Print as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Lists dates that have entries
    Dates {
        /// Print as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Provisions the key, runs a program, then wipes the key file
    #[command(arg_required_else_help = true)]
    Run {
        #[command(flatten)]
        source: KeySource,

        /// Program and arguments to run
        #[arg(trailing_var_arg = true, required = true, value_name = "COMMAND")]
        command: Vec<String>,
    },

    /// Truncates the key file
    Wipe,
}

#[derive(Serialize)]
struct EntryView<'a> {
    date: String,
    text: &'a str,
    photo_sizes: Vec<usize>,
    attachment_sizes: Vec<usize>,
}

impl<'a> From<&'a JournalEntry> for EntryView<'a> {
    fn from(entry: &'a JournalEntry) -> Self {
        Self {
            date: entry.date().to_string(),
            text: entry.text(),
            photo_sizes: entry.photos().iter().map(Vec::len).collect(),
            attachment_sizes: entry.attachments().iter().map(Vec::len).collect(),
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<JournalConfig> {
    let mut config = match (&cli.db, &cli.key_file) {
        (Some(db), Some(key)) => JournalConfig::new(db.clone(), key.clone()),
        (db, key) => {
            let defaults = default_config().context("could not determine platform directories")?;
            JournalConfig::new(
                db.clone().unwrap_or(defaults.db_path),
                key.clone().unwrap_or(defaults.key_path),
            )
        }
    };

    if let Some(max) = cli.max_blob_bytes {
        config.limits = BlobLimits::new(max);
    }
    Ok(config)
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
    }
    Ok(())
}

fn open_journal(config: &JournalConfig) -> Result<Journal> {
    ensure_parent_dir(&config.db_path)?;
    ensure_parent_dir(&config.key_path)?;
    Ok(Journal::open(config)?)
}

fn read_blobs(paths: &[PathBuf]) -> Result<Vec<Vec<u8>>> {
    paths
        .iter()
        .map(|p| fs::read(p).with_context(|| format!("failed to read '{}'", p.display())))
        .collect()
}

fn export_blobs(dir: &Path, prefix: &str, blobs: &[Vec<u8>]) -> Result<()> {
    for (i, blob) in blobs.iter().enumerate() {
        let path = dir.join(format!("{prefix}-{}.bin", i + 1));
        fs::write(&path, blob).with_context(|| format!("failed to write '{}'", path.display()))?;
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "diarium=warn".into()),
        )
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Cli::parse();
    let config = resolve_config(&args)?;

    match args.command {
        Commands::Init => {
            let journal = open_journal(&config)?;
            println!("journal initialized at {}", journal.store_path().display());
        }
        Commands::Keygen { source } => {
            let key = source.read_key(true)?;
            ensure_parent_dir(&config.key_path)?;
            KeyFile::new(config.key_path.clone()).save(&key)?;
            println!("key written to {}", config.key_path.display());
        }
        Commands::Write {
            date,
            text,
            photos,
            attachments,
        } => {
            let text = match text {
                Some(text) => text,
                None => {
                    let mut buf = String::new();
                    io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read entry text from stdin")?;
                    buf
                }
            };
            let photos = read_blobs(&photos)?;
            let attachments = read_blobs(&attachments)?;

            let journal = open_journal(&config)?;
            journal.save_entry(date, &text, &photos, &attachments)?;
            println!("entry for {date} saved");
        }
        Commands::Read {
            date,
            out_dir,
            json,
        } => {
            let journal = open_journal(&config)?;
            let Some(entry) = journal.get_entry(date)? else {
                println!("no entry for {date}");
                return Ok(ExitCode::SUCCESS);
            };

            if let Some(dir) = out_dir {
                fs::create_dir_all(&dir)
                    .with_context(|| format!("failed to create directory '{}'", dir.display()))?;
                export_blobs(&dir, "photo", entry.photos())?;
                export_blobs(&dir, "attachment", entry.attachments())?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&EntryView::from(&entry))?);
            } else {
                println!("{}", entry.text());
                if !entry.photos().is_empty() || !entry.attachments().is_empty() {
                    eprintln!(
                        "{} photo(s), {} attachment(s)",
                        entry.photos().len(),
                        entry.attachments().len()
                    );
                }
            }
        }
        Commands::Dates { json } => {
            let journal = open_journal(&config)?;
            let mut dates = journal.list_entry_dates()?;
            dates.sort();
            dates.dedup();

            if json {
                let dates: Vec<String> = dates.iter().map(NaiveDate::to_string).collect();
                println!("{}", serde_json::to_string(&dates)?);
            } else if dates.is_empty() {
                println!("No entries stored.");
            } else {
                for date in dates {
                    println!("{date}");
                }
            }
        }
        Commands::Run { source, command } => {
            let key = source.read_key(false)?;
            ensure_parent_dir(&config.key_path)?;
            let key_file = KeyFile::new(config.key_path.clone());

            let status = session::run_with_key(&key_file, &key, &command)?;
            let code = status.code().and_then(|c| u8::try_from(c).ok()).unwrap_or(1);
            return Ok(ExitCode::from(code));
        }
        Commands::Wipe => {
            KeyFile::new(config.key_path.clone()).clear()?;
            println!("key file {} cleared", config.key_path.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}
