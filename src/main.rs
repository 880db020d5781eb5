// ERP Core - Admin CLI
//
//   erp-core init
//   erp-core import-contacts contacts.csv
//   erp-core check abn "51 824 753 556"
//   erp-core schema

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

use erp_core::{
    import_contacts, load_contacts_csv, logging, BusinessIdentifier, Config, EdgeFunctions,
    IdentifierKind, SqliteStore, Table, UnifiedEntityGateway, GET_SCHEMA,
};

#[derive(Parser)]
#[command(name = "erp-core")]
#[command(version)]
#[command(about = "Admin tools for the contacts/addresses store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file (overrides ERP_DATABASE_PATH)
    #[arg(long, short, global = true)]
    database: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum IdentifierArg {
    Abn,
    Acn,
}

impl From<IdentifierArg> for IdentifierKind {
    fn from(arg: IdentifierArg) -> Self {
        match arg {
            IdentifierArg::Abn => IdentifierKind::Abn,
            IdentifierArg::Acn => IdentifierKind::Acn,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and its tables
    Init,

    /// Bulk-create contacts from a CSV file; safe to re-run
    ImportContacts {
        /// CSV with entity_type, entity_id, name, email, phone, mobile, position, contact_type, is_primary
        csv: PathBuf,
    },

    /// Validate and format an ABN or ACN
    Check {
        #[arg(value_enum)]
        kind: IdentifierArg,
        value: String,
    },

    /// Print table layout and row counts as JSON
    Schema,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("❌ {:#}", err);
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.log_level);
    if let Some(path) = cli.database {
        config.database_path = path;
    }

    let outcome = match cli.command {
        Commands::Init => run_init(&config),
        Commands::ImportContacts { csv } => run_import(&config, &csv),
        Commands::Check { kind, value } => return run_check(kind.into(), &value),
        Commands::Schema => run_schema(&config),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("❌ {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    let store = SqliteStore::open(&config.database_path).with_context(|| {
        format!("Failed to open database {}", config.database_path.display())
    })?;
    Ok(store.with_actor("erp-core"))
}

fn run_init(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    println!("✓ Database ready: {}", config.database_path.display());

    for table in Table::ALL {
        println!("  {:<20} {} rows", table.as_str(), store.count(table)?);
    }
    Ok(())
}

fn run_import(config: &Config, csv_path: &std::path::Path) -> Result<()> {
    let rows = load_contacts_csv(csv_path)?;
    println!("📂 Loaded {} rows from {}", rows.len(), csv_path.display());

    let gateway = UnifiedEntityGateway::new(open_store(config)?).with_cache_config(config.cache());
    let summary = import_contacts(&gateway, &rows).context("Import aborted")?;

    println!("✓ Inserted:   {}", summary.inserted);
    println!("✓ Duplicates: {}", summary.duplicates);
    println!("✓ Rejected:   {}", summary.rejected);
    for problem in &summary.problems {
        println!("  ⚠️  {}", problem);
    }
    Ok(())
}

fn run_check(kind: IdentifierKind, value: &str) -> ExitCode {
    match BusinessIdentifier::parse(kind, value) {
        Ok(identifier) => {
            println!("✅ {}", identifier);
            ExitCode::SUCCESS
        }
        Err(message) => {
            println!("❌ {}", message);
            ExitCode::FAILURE
        }
    }
}

fn run_schema(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let schema = store.invoke(GET_SCHEMA, &serde_json::Value::Null)?;
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
