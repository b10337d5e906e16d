//! ydb CLI
//!
//! Command-line tool for inspecting the tables and classes recorded in a
//! database.

use std::collections::BTreeMap;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ydb::prelude::*;
use ydb_core::dialect::{ReferenceTargets, SqliteDialect};

/// Inspect ydb tables and classes.
#[derive(Parser)]
#[command(name = "ydb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:ydb.sqlite3")]
    database: String,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List recorded table versions.
    Tables,

    /// Show the schema and DDL of one table version.
    Show {
        /// Table as "name version", e.g. "user 0.1.0".
        table: String,
    },

    /// List recorded classes and their methods.
    Classes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let driver = SqliteDriver::connect(&cli.database).await?;
    let catalog = Catalog::new(Arc::new(driver));
    catalog.ensure_tables().await?;

    match cli.command {
        Commands::Tables => {
            let schemas = catalog.list_schemas().await?;
            if schemas.is_empty() {
                info!("No tables have been declared yet.");
                return Ok(());
            }

            println!("\nTables:");
            println!("{:-<60}", "");
            for stored in &schemas {
                let source = stored
                    .schema
                    .source
                    .as_ref()
                    .map(|s| format!(" <- {} ({})", s.prior, stored.plan.as_deref().unwrap_or("-")))
                    .unwrap_or_default();
                println!(
                    " {:<30} {} column(s){} [{}]",
                    stored.schema.id.to_string(),
                    stored.schema.columns.len(),
                    source,
                    stored.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            println!();
        }

        Commands::Show { table } => {
            let id: TableId = table.parse()?;
            let Some(stored) = catalog.get_schema(&id).await? else {
                anyhow::bail!("table {id} is not recorded in {}", cli.database);
            };
            let schema = &stored.schema;

            println!("\n{} ({})", schema.id, schema.physical_name());
            println!("{:-<60}", "");
            for column in &schema.columns {
                let mut line = format!(" {:<20} {}", column.name, column.shape);
                if !column.nullable {
                    line.push_str(" not null");
                }
                if let Some(default) = &column.default {
                    line.push_str(&format!(" default {default}"));
                }
                if let Some(reference) = &column.references {
                    line.push_str(&format!(" -> {reference}"));
                }
                println!("{line}");
            }
            for constraint in &schema.constraints {
                println!(" {} ({})", constraint.kind, constraint.columns.join(", "));
            }

            let mut targets = ReferenceTargets::new();
            for reference in schema.columns.iter().filter_map(|c| c.references.as_ref()) {
                if let Some(target) = catalog.latest_schema(&reference.table).await? {
                    targets.insert(reference.table.clone(), target.schema.physical_name());
                }
            }
            println!();
            for sql in SqliteDialect::new().create_statements(schema, &targets)? {
                println!("{sql};");
            }
            println!();
        }

        Commands::Classes => {
            let classes = catalog.list_classes().await?;
            if classes.is_empty() {
                info!("No classes have been declared yet.");
                return Ok(());
            }

            println!("\nClasses:");
            println!("{:-<60}", "");
            for stored in &classes {
                let class = &stored.class;
                println!(" {} uses {}", class.name, class.tables.join(", "));
                let methods: BTreeMap<&str, String> = class
                    .methods
                    .values()
                    .map(|m| {
                        let params: Vec<String> =
                            m.params.iter().map(|(n, k)| format!("{n}: {k}")).collect();
                        (m.name.as_str(), params.join(", "))
                    })
                    .collect();
                for (name, params) in methods {
                    println!("   {name}({params})");
                }
            }
            println!();
        }
    }

    Ok(())
}
