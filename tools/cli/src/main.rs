//! unifs CLI - one set of file commands for local paths, UNC shares,
//! S3 buckets, Azure Blob containers and Azure File Shares.
//!
//! The backend is picked from each URL. Cloud clients come from a JSON config
//! file or from the environment.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use unifs_common::{classify, is_directory, Logger, StorageUrl};
use unifs_storage::{
    copy_file, create_directory, create_file, delete, exists, path_combine, resolve_directory,
    resolve_file, Clients, ClientsConfig, Entry, StorageDirectory, StorageFile,
};

#[derive(Parser)]
#[command(name = "unifs")]
#[command(about = "unifs - Files and directories on any storage backend")]
#[command(version)]
struct Cli {
    /// Client configuration file (JSON).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only report errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a file or directory exists.
    Exists { url: String },

    /// Create an empty file, or a directory if the URL ends in a separator.
    Create {
        url: String,

        /// Fail if the file already exists.
        #[arg(long)]
        no_overwrite: bool,

        /// Fail if the directory already exists.
        #[arg(long)]
        fail_if_exists: bool,
    },

    /// Delete a file or directory.
    Delete {
        url: String,

        /// Only delete empty directories.
        #[arg(long)]
        no_recurse: bool,

        /// Log failures and carry on instead of stopping.
        #[arg(long)]
        keep_going: bool,
    },

    /// List the immediate children of a directory.
    Ls { url: String },

    /// Print a file's content.
    Cat { url: String },

    /// Upload a local file to a URL.
    Put { source: PathBuf, url: String },

    /// Copy a file between any two backends.
    Copy {
        source: String,
        target: String,

        /// Fail if the target exists.
        #[arg(long)]
        no_overwrite: bool,
    },

    /// Join path segments using the rules of the first one's backend.
    Combine {
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Show how a URL is classified and parsed.
    Classify { url: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let log = Logger::new().with_verbose(!cli.quiet).with_label("unifs");

    match cli.command {
        Commands::Exists { url } => cmd_exists(&load_clients(&cli.config)?, &url),

        Commands::Create {
            url,
            no_overwrite,
            fail_if_exists,
        } => cmd_create(&load_clients(&cli.config)?, &url, no_overwrite, fail_if_exists, &log),

        Commands::Delete {
            url,
            no_recurse,
            keep_going,
        } => cmd_delete(&load_clients(&cli.config)?, &url, no_recurse, keep_going, &log),

        Commands::Ls { url } => cmd_ls(&load_clients(&cli.config)?, &url),

        Commands::Cat { url } => cmd_cat(&load_clients(&cli.config)?, &url),

        Commands::Put { source, url } => cmd_put(&load_clients(&cli.config)?, &source, &url, &log),

        Commands::Copy {
            source,
            target,
            no_overwrite,
        } => {
            let clients = load_clients(&cli.config)?;
            copy_file(&source, &target, &clients, !no_overwrite, &log)
                .with_context(|| format!("Failed to copy {} to {}", source, target))
        }

        Commands::Combine { paths } => cmd_combine(&paths),

        Commands::Classify { url } => cmd_classify(&url),
    }
}

/// Build the client registry from `--config`, the default config file, or
/// the environment, in that order.
fn load_clients(config: &Option<PathBuf>) -> Result<Clients> {
    let settings = match config {
        Some(path) => ClientsConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => match ClientsConfig::default_path().filter(|p| p.is_file()) {
            Some(path) => {
                debug!("Using config {}", path.display());
                ClientsConfig::load(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?
            }
            None => ClientsConfig::from_env(),
        },
    };
    Clients::from_config(&settings).context("Failed to configure storage clients")
}

fn cmd_exists(clients: &Clients, url: &str) -> Result<()> {
    let found = exists(url, clients).with_context(|| format!("Failed to check {}", url))?;
    println!("{}", found);
    Ok(())
}

fn cmd_create(
    clients: &Clients,
    url: &str,
    no_overwrite: bool,
    fail_if_exists: bool,
    log: &Logger<'_>,
) -> Result<()> {
    if is_directory(url) {
        create_directory(url, clients, fail_if_exists, log)
            .with_context(|| format!("Failed to create directory {}", url))?;
    } else {
        let mut file = create_file(url, clients, !no_overwrite, log)
            .with_context(|| format!("Failed to create file {}", url))?;
        file.close(log).context("Failed to close file")?;
    }
    Ok(())
}

fn cmd_delete(
    clients: &Clients,
    url: &str,
    no_recurse: bool,
    keep_going: bool,
    log: &Logger<'_>,
) -> Result<()> {
    let complete = delete(url, clients, !no_recurse, !keep_going, log)
        .with_context(|| format!("Failed to delete {}", url))?;
    if !complete {
        anyhow::bail!("Delete of {} did not complete", url);
    }
    Ok(())
}

fn cmd_ls(clients: &Clients, url: &str) -> Result<()> {
    let dir = resolve_directory(url, clients).context("Not a directory URL")?;

    let directories = dir.get_directories().context("Failed to list directories")?;
    let files = dir.get_files().context("Failed to list files")?;

    if directories.is_empty() && files.is_empty() {
        println!("Directory is empty.");
        return Ok(());
    }
    for d in &directories {
        println!("  [DIR]  {}", d.full_name());
    }
    for f in &files {
        println!("  [FILE] {}", f.full_name());
    }
    Ok(())
}

fn cmd_cat(clients: &Clients, url: &str) -> Result<()> {
    let mut file = resolve_file(url, clients).context("Not a file URL")?;
    let content = file
        .read_all_bytes()
        .with_context(|| format!("Failed to read {}", url))?;
    std::io::stdout()
        .write_all(&content)
        .context("Failed to write to stdout")?;
    Ok(())
}

fn cmd_put(clients: &Clients, source: &Path, url: &str, log: &Logger<'_>) -> Result<()> {
    let content = std::fs::read(source)
        .with_context(|| format!("Failed to read {}", source.display()))?;

    let mut file = resolve_file(url, clients).context("Not a file URL")?;
    file.create(true, log)
        .with_context(|| format!("Failed to create {}", url))?;
    file.write_all_bytes(&content, log)
        .with_context(|| format!("Failed to upload to {}", url))?;

    println!("Uploaded {} bytes to {}", content.len(), url);
    Ok(())
}

fn cmd_combine(paths: &[String]) -> Result<()> {
    let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
    println!("{}", path_combine(&paths)?);
    Ok(())
}

fn cmd_classify(url: &str) -> Result<()> {
    let (backend, kind) = classify(url);
    let parsed = StorageUrl::parse(url);
    let report = serde_json::json!({
        "url": url,
        "backend": backend,
        "kind": kind,
        "account": parsed.account(),
        "container": parsed.container(),
        "key": parsed.key(),
        "root": parsed.root(),
        "name": parsed.name(),
        "parent": parsed.parent(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
