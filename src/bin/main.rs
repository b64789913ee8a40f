//! dbmeta CLI - Inspect database catalogs
//!
//! Usage:
//!   dbmeta [--connection <name>] tables [--schema <s>] [--table <t>] [--type <T>...]
//!   dbmeta --driver sqlite --url jdbc:sqlite:./app.db columns --table employees
//!   dbmeta --format table primary-keys --table employees
//!
//! Connection settings come from `--driver/--url`, then the settings file
//! (`--config`, `$DBMETA_CONFIG`, `./dbmeta.toml`), then `DBMETA_*` variables.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use dbmeta::config::{ConfigError, Settings, SettingsError};
use dbmeta::driver::DriverRegistry;
use dbmeta::{DriverConfig, MetadataError, MetadataFacade, QueryOptions, Record};
use tracing::debug;

#[derive(Parser)]
#[command(name = "dbmeta")]
#[command(about = "dbmeta - Inspect tables, columns and keys of a database catalog")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to $DBMETA_CONFIG or ./dbmeta.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Named connection from the settings file
    #[arg(short, long, global = true)]
    connection: Option<String>,

    /// Driver name, e.g. sqlite
    #[arg(long, global = true, requires = "url")]
    driver: Option<String>,

    /// Connection URL, e.g. jdbc:sqlite:./app.db
    #[arg(long, global = true, requires = "driver")]
    url: Option<String>,

    /// External driver worker binary
    #[arg(long, global = true)]
    libpath: Option<PathBuf>,

    #[arg(long, global = true)]
    user: Option<String>,

    #[arg(long, global = true)]
    password: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct Filter {
    #[arg(long)]
    catalog: Option<String>,

    #[arg(long)]
    schema: Option<String>,

    #[arg(long)]
    table: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List tables and views
    Tables {
        #[command(flatten)]
        filter: Filter,

        /// Table types to include (repeatable), e.g. TABLE, VIEW
        #[arg(long = "type")]
        types: Vec<String>,
    },

    /// List columns
    Columns {
        #[command(flatten)]
        filter: Filter,

        /// Column name pattern
        #[arg(long)]
        column: Option<String>,
    },

    /// List primary key columns
    PrimaryKeys {
        #[command(flatten)]
        filter: Filter,
    },

    /// List foreign keys declared by a table
    ImportedKeys {
        #[command(flatten)]
        filter: Filter,
    },

    /// List foreign keys referencing a table
    ExportedKeys {
        #[command(flatten)]
        filter: Filter,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Pretty-printed JSON array
    Json,
    /// Aligned text table
    Table,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dbmeta=warn")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<String, CliError> {
    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };
    let config = resolve_config(&cli, &settings)?;
    debug!(driver = %config.drivername, "resolved connection");

    let registry = DriverRegistry::with_builtin().with_worker_timeout(settings.worker.timeout());
    let facade = MetadataFacade::with_registry(config, Arc::new(registry));

    let result = query(&facade, &cli.command).await;
    let closed = facade.close().await;
    let records = result?;
    closed?;

    render(&records, cli.format)
}

fn resolve_config(cli: &Cli, settings: &Settings) -> Result<DriverConfig, CliError> {
    if let (Some(driver), Some(url)) = (&cli.driver, &cli.url) {
        let mut config = DriverConfig::new(driver.as_str(), url.as_str());
        config.libpath = cli.libpath.clone();
        config.user = cli.user.clone();
        config.password = cli.password.clone();
        config.validate()?;
        return Ok(config);
    }

    if let Some(name) = &cli.connection {
        return Ok(settings.get_connection(name)?.to_driver_config()?);
    }

    match settings.default_connection() {
        Some((name, connection)) => {
            debug!(connection = name, "using connection from settings");
            Ok(connection.to_driver_config()?)
        }
        None => Ok(DriverConfig::from_env()?),
    }
}

async fn query(facade: &MetadataFacade, command: &Commands) -> Result<Vec<Record>, MetadataError> {
    match command {
        Commands::Tables { filter, types } => {
            facade
                .tables(&filter.options().types(types.iter().cloned()))
                .await
        }
        Commands::Columns { filter, column } => {
            let mut options = filter.options();
            options.column = column.clone();
            facade.columns(&options).await
        }
        Commands::PrimaryKeys { filter } => facade.primary_keys(&filter.options()).await,
        Commands::ImportedKeys { filter } => facade.imported_keys(&filter.options()).await,
        Commands::ExportedKeys { filter } => facade.exported_keys(&filter.options()).await,
    }
}

impl Filter {
    fn options(&self) -> QueryOptions {
        QueryOptions {
            catalog: self.catalog.clone(),
            schema: self.schema.clone(),
            table: self.table.clone(),
            ..QueryOptions::default()
        }
    }
}

fn render(records: &[Record], format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(records)?),
        OutputFormat::Table => Ok(render_table(records)),
    }
}

/// Render records as aligned columns. Fields come from the first record.
fn render_table(records: &[Record]) -> String {
    let Some(first) = records.first() else {
        return "(no rows)".to_string();
    };

    let headers: Vec<&str> = first.fields().collect();
    let cells: Vec<Vec<&str>> = records
        .iter()
        .map(|record| {
            headers
                .iter()
                .map(|field| record.get(field).unwrap_or("NULL"))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            cells
                .iter()
                .map(|row| row[i].len())
                .chain(std::iter::once(header.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let separator: Vec<&str> = separator.iter().map(String::as_str).collect();

    let mut lines = vec![format_row(&headers, &widths), format_row(&separator, &widths)];
    lines.extend(cells.iter().map(|row| format_row(row, &widths)));
    lines.join("\n")
}

fn format_row(values: &[&str], widths: &[usize]) -> String {
    let last = values.len().saturating_sub(1);
    values
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(i, (value, width))| {
            if i == last {
                value.to_string()
            } else {
                format!("{:<width$}", value, width = width)
            }
        })
        .collect::<Vec<_>>()
        .join("  ")
}
