// ABOUTME: Entry point for the revisor binary.
// ABOUTME: Parses CLI arguments, installs the version store, and prints a record's reconstructed history.

use anyhow::Context;
use clap::{Parser, Subcommand};
use revisor_core::{Value, group_snapshots};
use revisor_store::{SnapshotFilter, StoreConfig, VersionStore, open_database};

#[derive(Parser, Debug)]
#[command(name = "revisor")]
#[command(about = "Inspect field-level version history stored by revisor")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every stored version of one record as JSON
    History {
        /// Owning table name, as recorded in the model column
        table: String,

        /// Primary key of the record; integers are looked up as integers
        key: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "revisor=debug,revisor_store=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = StoreConfig::from_env()?;
    tracing::info!("revisor opening {}", config.db_path.display());

    let conn = open_database(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let store = VersionStore::new(config.version_table.clone());
    store.install(&conn)?;

    let Command::History { table, key } = cli.command;
    let key = parse_key(&key);

    let filter = SnapshotFilter {
        model: table.clone(),
        foreign_keys: vec![key.clone()],
        ..SnapshotFilter::default()
    };
    let snapshots = store.find(&conn, &filter)?;
    let history = group_snapshots(&snapshots);
    tracing::info!("{} {:?} has {} versions", table, key, history.len());

    let json: serde_json::Map<String, serde_json::Value> = history
        .iter()
        .map(|(version_id, version)| (version_id.to_string(), version.to_json()))
        .collect();
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Integer keys are looked up as integers, anything else as text.
fn parse_key(raw: &str) -> Value {
    raw.parse::<i64>()
        .map(Value::Integer)
        .unwrap_or_else(|_| Value::from(raw))
}
