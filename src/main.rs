// ATI Ingest - Command line
// init-db | requests FILE | public-bodies FILE | bodies

use anyhow::{Context, Result};
use ati_ingest::{
    get_all_public_bodies, ingestion_event, insert_event, source_checksum, AppConfig,
    IngestOptions, IngestSource, Ingestor, RecordKind, SqliteStore,
};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const ACTOR: &str = "ati-ingest-cli";

#[derive(Debug, Parser)]
#[command(name = "ati-ingest", version, about = "Bulk-load ATI requests and public bodies from CSV")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "ATI_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// SQLite database file (overrides the configured path)
    #[arg(long, global = true, env = "ATI_DATABASE", value_name = "PATH")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the database schema
    InitDb,
    /// Ingest a CSV file of ATI requests
    Requests(IngestArgs),
    /// Ingest a CSV file of public bodies
    PublicBodies(IngestArgs),
    /// List known public bodies
    Bodies,
}

#[derive(Debug, Args)]
struct IngestArgs {
    /// CSV file to ingest
    file: PathBuf,

    /// Treat every warning as an error
    #[arg(long)]
    strict: bool,

    /// Update duplicates instead of skipping them
    #[arg(long)]
    update_existing: bool,

    #[arg(long, value_name = "N")]
    batch_size: Option<usize>,

    /// Field delimiter (auto-detected when omitted)
    #[arg(long, value_name = "CHAR")]
    delimiter: Option<char>,

    /// Source encoding (auto-detected when omitted)
    #[arg(long, value_name = "LABEL")]
    encoding: Option<String>,

    /// Print the JSON report after the summary
    #[arg(long)]
    json: bool,
}

impl IngestArgs {
    fn options(&self, defaults: &IngestOptions) -> IngestOptions {
        IngestOptions {
            strict_mode: self.strict || defaults.strict_mode,
            update_existing: self.update_existing || defaults.update_existing,
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            delimiter: self.delimiter.or(defaults.delimiter),
            encoding: self.encoding.clone().or_else(|| defaults.encoding.clone()),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    let db_path = cli.database.clone().unwrap_or_else(|| config.database_path.clone());

    match &cli.command {
        Command::InitDb => run_init_db(&db_path),
        Command::Requests(args) => run_ingest(&db_path, &config, RecordKind::AtiRequest, args),
        Command::PublicBodies(args) => run_ingest(&db_path, &config, RecordKind::PublicBody, args),
        Command::Bodies => run_list_bodies(&db_path),
    }
}

fn run_init_db(db_path: &Path) -> Result<()> {
    SqliteStore::open(db_path)?;
    println!("✓ Database initialized with WAL mode: {}", db_path.display());
    Ok(())
}

fn run_ingest(db_path: &Path, config: &AppConfig, kind: RecordKind, args: &IngestArgs) -> Result<()> {
    println!("📂 Ingesting {} from {}", kind.as_str(), args.file.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = SqliteStore::open(db_path)?;
    let ingestor = Ingestor::new(&store, args.options(&config.ingestion));

    let result = ingestor.ingest(kind, IngestSource::Path(args.file.clone()), None)?;

    // Checksum is best effort: an unreadable file already shows up as a parse failure
    let checksum = std::fs::read(&args.file)
        .map(|data| source_checksum(&data))
        .unwrap_or_default();
    let event = ingestion_event(kind, &result, &checksum, ACTOR);
    insert_event(store.connection(), &event).context("Failed to record ingestion event")?;

    println!("{}", result.summary());

    for error in result.errors.iter().take(ati_ingest::result::REPORT_LIST_LIMIT) {
        println!("  ❌ {}", error);
    }
    for warning in result.warnings.iter().take(ati_ingest::result::REPORT_LIST_LIMIT) {
        println!("  ⚠️  {}", warning);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result.to_report())?);
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if result.is_successful() {
        println!(
            "✅ Created {}, updated {}",
            result.created_count(),
            result.updated_count()
        );
        Ok(())
    } else {
        eprintln!("❌ Ingestion failed, nothing was committed");
        std::process::exit(1);
    }
}

fn run_list_bodies(db_path: &Path) -> Result<()> {
    let store = SqliteStore::open(db_path)?;
    let bodies = get_all_public_bodies(store.connection())?;

    println!("🏛️  {} public bodies", bodies.len());
    for body in bodies {
        match &body.abbreviation {
            Some(abbreviation) => println!("  {} ({})  {}", body.name, abbreviation, body.id),
            None => println!("  {}  {}", body.name, body.id),
        }
    }

    Ok(())
}
