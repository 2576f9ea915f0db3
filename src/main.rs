//! # Keyword Harness CLI (`kw`)
//!
//! ## Usage
//!
//! ```bash
//! kw --config ./config/kw.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kw init` | Create the SQLite database and run schema migrations |
//! | `kw sources` | List keyword sources and their options |
//! | `kw keyword save <name> --source <tag>` | Fetch terms through a source and store the keyword |
//! | `kw keyword list` | List keywords |
//! | `kw keyword get <name>` | Show a keyword and its stored terms |
//! | `kw keyword delete <name>` | Delete a keyword |
//! | `kw keyword refresh <name>` | Re-fetch terms from the keyword's source |
//! | `kw keyword terms <name>` | Print the terms generation would use |
//! | `kw media add <path>` | Copy a file into the media library |
//! | `kw media list` | List media library files |
//! | `kw media delete <id>` | Remove a media library file |
//! | `kw serve` | Start the JSON HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Plain list of terms
//! kw keyword save service --source local --option data=$'plumber\nelectrician'
//!
//! # Terms from a Google Sheet
//! kw keyword save city --source csv_url \
//!     --option url=https://docs.google.com/spreadsheets/d/<id>/edit#gid=0 \
//!     --option columns_first_row=true
//!
//! # Fail generation if the feed is down, or fall back to stored terms
//! kw keyword terms news --refresh
//! kw keyword terms news --refresh --ignore-errors
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use keyword_harness::traits::SourceRegistry;
use keyword_harness::{config, keyword_cmd, media_cmd, migrate, server, sources};

/// Keyword Harness CLI: keyword term sources for programmatic page generation.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kw.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kw",
    about = "Keyword Harness: keyword term sources for programmatic page generation",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kw.toml")]
    config: PathBuf,

    /// Log debug output to stderr (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the keywords, attachments and
    /// cache tables. Running it again is safe.
    Init,

    /// List keyword sources and the options each accepts.
    Sources,

    /// Manage keywords.
    Keyword {
        #[command(subcommand)]
        action: KeywordAction,
    },

    /// Manage the media library used by file-based sources.
    Media {
        #[command(subcommand)]
        action: MediaAction,
    },

    /// Start the JSON HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum KeywordAction {
    /// Fetch terms through a source and store the keyword.
    ///
    /// Saving an existing keyword replaces its source, options and terms.
    Save {
        /// Keyword name (letters, numbers, `_` and `-`).
        name: String,

        /// Source tag: local, csv_file, csv_url, database_table, rss_feed,
        /// spreadsheet or ai.
        #[arg(long)]
        source: String,

        /// Source option as `key=value`; repeat for several options.
        #[arg(long = "option", value_parser = parse_key_val)]
        options: Vec<(String, String)>,
    },
    /// List keywords.
    List,
    /// Show a keyword and its stored terms.
    Get { name: String },
    /// Delete a keyword.
    Delete { name: String },
    /// Re-fetch a keyword's terms from its source.
    Refresh {
        name: String,

        /// Store the refreshed terms.
        #[arg(long)]
        persist: bool,
    },
    /// Print the terms generation would use.
    Terms {
        name: String,

        /// Re-fetch from the source first.
        #[arg(long)]
        refresh: bool,

        /// With --refresh, fall back to stored terms when the source fails.
        #[arg(long, requires = "refresh")]
        ignore_errors: bool,
    },
}

#[derive(Subcommand)]
enum MediaAction {
    /// Copy a file into the media library and print its attachment id.
    Add { path: PathBuf },
    /// List media library files.
    List,
    /// Remove a file from the media library.
    Delete { id: i64 },
}

/// Parse a `key=value` pair for `--option` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;
    let registry = SourceRegistry::with_builtins();

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg, &registry).await?;
        }
        Commands::Keyword { action } => match action {
            KeywordAction::Save {
                name,
                source,
                options,
            } => {
                keyword_cmd::run_save(&cfg, &registry, &name, &source, &options).await?;
            }
            KeywordAction::List => keyword_cmd::run_list(&cfg).await?,
            KeywordAction::Get { name } => keyword_cmd::run_get(&cfg, &name).await?,
            KeywordAction::Delete { name } => keyword_cmd::run_delete(&cfg, &name).await?,
            KeywordAction::Refresh { name, persist } => {
                keyword_cmd::run_refresh(&cfg, &registry, &name, persist).await?;
            }
            KeywordAction::Terms {
                name,
                refresh,
                ignore_errors,
            } => {
                keyword_cmd::run_terms(&cfg, &registry, &name, refresh, ignore_errors).await?;
            }
        },
        Commands::Media { action } => match action {
            MediaAction::Add { path } => media_cmd::run_add(&cfg, &path).await?,
            MediaAction::List => media_cmd::run_list(&cfg).await?,
            MediaAction::Delete { id } => media_cmd::run_delete(&cfg, id).await?,
        },
        Commands::Serve => {
            server::run_server_with_registry(&cfg, registry).await?;
        }
    }

    Ok(())
}
