use anyhow::{Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use dupvault_core::{Algorithm, FileStore, LogicalRecord, RecordId, format_bytes};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Dupvault - A content-deduplicating file store
#[derive(Parser)]
#[command(name = "dupvault")]
#[command(about = "Content-deduplicating file store using BLAKE3", long_about = None)]
#[command(version)]
struct Cli {
    /// Store root directory (defaults to DUPVAULT_ROOT env var or ./dupvault-store)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new store
    Init {
        /// Digest algorithm to use
        #[arg(long, default_value = "blake3-256")]
        algo: String,
    },

    /// Add files to the store ('-' reads stdin)
    Add {
        /// Paths to add
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Declared content type for the uploads
        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,
    },

    /// Output a record's content to stdout
    Cat {
        /// Record id
        id: String,
    },

    /// Delete a record (reclaims the blob when it was the last one)
    Rm {
        /// Record ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// List records
    Ls {
        /// Show detailed information
        #[arg(short, long)]
        long: bool,

        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// List the references designating an original
    Refs {
        /// Original record id
        id: String,

        /// Emit JSON
        #[arg(long)]
        json: bool,
    },

    /// Show store-wide deduplication savings
    Stats {
        /// Emit JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine store root: CLI arg > DUPVAULT_ROOT env var > ./dupvault-store default
    let root = cli
        .root
        .or_else(|| std::env::var("DUPVAULT_ROOT").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./dupvault-store"));

    match cli.command {
        Commands::Init { algo } => cmd_init(&root, &algo),
        Commands::Add {
            paths,
            content_type,
        } => cmd_add(&root, paths, &content_type),
        Commands::Cat { id } => cmd_cat(&root, &id),
        Commands::Rm { ids } => cmd_rm(&root, ids),
        Commands::Ls { long, json } => cmd_ls(&root, long, json),
        Commands::Refs { id, json } => cmd_refs(&root, &id, json),
        Commands::Stats { json } => cmd_stats(&root, json),
    }
}

fn open_store(root: &Path) -> Result<FileStore> {
    FileStore::open(root).with_context(|| format!("Failed to open store at {}", root.display()))
}

fn parse_id(s: &str) -> Result<RecordId> {
    RecordId::parse(s).with_context(|| format!("Invalid record id: {}", s))
}

fn cmd_init(root: &Path, algo: &str) -> Result<()> {
    let algorithm =
        Algorithm::parse(algo).with_context(|| format!("Unsupported algorithm: {}", algo))?;

    FileStore::init(root, algorithm)
        .with_context(|| format!("Failed to initialize store at {}", root.display()))?;

    println!("Initialized dupvault store at {}", root.display());
    println!("Algorithm: {}", algorithm.as_str());

    Ok(())
}

fn cmd_add(root: &Path, paths: Vec<PathBuf>, content_type: &str) -> Result<()> {
    let store = open_store(root)?;

    for path in paths {
        let (body, filename) = if path.as_os_str() == "-" {
            if atty::is(atty::Stream::Stdin) {
                anyhow::bail!("No input on stdin (pipe data or name a file)");
            }
            let mut body = Vec::new();
            io::stdin()
                .read_to_end(&mut body)
                .context("Failed to read stdin")?;
            (body, "stdin".to_string())
        } else {
            let body = std::fs::read(&path)
                .with_context(|| format!("Failed to read file: {}", path.display()))?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            (body, filename)
        };

        let record = store
            .upload(&body, &filename, content_type)
            .with_context(|| format!("Failed to add: {}", filename))?;

        let role = if record.is_original() {
            "original".to_string()
        } else {
            format!("reference -> {}", record.original_id().unwrap_or_default())
        };
        println!("{} {} ({})", record.id, record.filename, role);
    }

    Ok(())
}

fn cmd_cat(root: &Path, id_str: &str) -> Result<()> {
    let store = open_store(root)?;
    let id = parse_id(id_str)?;

    let record = store
        .record(id)
        .with_context(|| format!("No record: {}", id))?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    store
        .blobs()
        .read_to_writer(&record.digest, &mut handle)
        .with_context(|| format!("Failed to output content of {}", id))?;

    Ok(())
}

fn cmd_rm(root: &Path, ids: Vec<String>) -> Result<()> {
    let store = open_store(root)?;

    for id_str in ids {
        let id = parse_id(&id_str)?;
        let deletion = store
            .delete(id)
            .with_context(|| format!("Failed to delete record {}", id))?;

        if deletion.blob_reclaimed {
            println!("Deleted {} (blob {} reclaimed)", id, deletion.digest);
        } else {
            println!(
                "Deleted {} ({} record(s) still share the content)",
                id, deletion.remaining
            );
        }
    }

    Ok(())
}

fn cmd_ls(root: &Path, long: bool, json: bool) -> Result<()> {
    let store = open_store(root)?;
    let records = store.list();

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No records (use 'dupvault add' to upload)");
        return Ok(());
    }

    for record in records {
        if long {
            println!(
                "{} {:>10} {} {} {} {}",
                record.id,
                format_bytes(record.size),
                format_timestamp(record.created_at),
                kind_char(&record),
                record.digest,
                record.filename
            );
        } else {
            println!("{} {}", record.id, record.filename);
        }
    }

    Ok(())
}

fn cmd_refs(root: &Path, id_str: &str, json: bool) -> Result<()> {
    let store = open_store(root)?;
    let id = parse_id(id_str)?;
    let refs = store.references_of(id);

    if json {
        println!("{}", serde_json::to_string_pretty(&refs)?);
        return Ok(());
    }

    if refs.is_empty() {
        println!("No references");
    } else {
        for record in refs {
            println!(
                "{} {} ({})",
                record.id,
                record.filename,
                format_timestamp(record.created_at)
            );
        }
    }

    Ok(())
}

fn cmd_stats(root: &Path, json: bool) -> Result<()> {
    let store = open_store(root)?;
    let report = store.global_savings();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Records:       {}", report.record_count);
    println!("Unique blobs:  {}", report.blob_count);
    println!(
        "Logical size:  {}",
        format_bytes(report.total_logical_bytes)
    );
    println!("Stored size:   {}", format_bytes(report.total_stored_bytes));
    println!(
        "Saved:         {} ({:.2}%)",
        format_bytes(report.saved_bytes),
        report.saved_percent
    );

    Ok(())
}

fn kind_char(record: &LogicalRecord) -> char {
    if record.is_original() { 'o' } else { 'r' }
}

fn format_timestamp(unix_secs: i64) -> String {
    DateTime::from_timestamp(unix_secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| unix_secs.to_string())
}
