//! Table export tool.
//!
//! Lists, prints and exports tables of a PostgreSQL schema that is reachable
//! only through an SSH bastion. Connection settings come from the environment
//! or an env file.
//!
//! # Security Guarantees
//! - Read-only database sessions only
//! - Passwords are never logged or echoed
//! - Table names are resolved against the catalog before any query runs

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dbtabular_core::{
    Connector, DirectConnector, ExportFormat, TableDirectory, TunnelConnector, export,
    init_logging, load_config, load_config_from,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "dbtabular")]
#[command(about = "Export PostgreSQL tables behind an SSH bastion")]
#[command(version)]
#[command(long_about = "
DBTabular - PostgreSQL table export through an SSH tunnel

Connection settings are read from the environment, after merging the env
file named by --env-file, $ENV_FILE_PATH, or ./.env:

  DATABASE_HOST, DATABASE_PORT, DATABASE_NAME, DATABASE_SCHEMA,
  DATABASE_USER, DATABASE_PASSWORD,
  SSH_HOST, SSH_PORT, SSH_USERNAME, SSH_PASSWORD

EXAMPLES:
  dbtabular list
  dbtabular show users
  dbtabular export users --format xlsx --path reports/
  dbtabular export-all --path dump/
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    quiet: bool,
}

#[derive(Debug, Args)]
struct ConnectionArgs {
    /// Env file merged into the environment before reading settings
    #[arg(long, global = true, env = "ENV_FILE_PATH", value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// List views alongside base tables
    #[arg(long, global = true)]
    include_views: bool,

    /// Connect to DATABASE_HOST directly instead of through the SSH tunnel
    #[arg(long, global = true)]
    direct: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print table names, one per line
    List,
    /// Print a table as CSV on stdout
    Show {
        /// Table name (case-insensitive)
        table: String,
    },
    /// Export one table to a file
    Export {
        /// Table name (case-insensitive)
        table: String,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Export every table in the schema
    ExportAll {
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = FormatArg::Csv)]
    format: FormatArg,

    /// Output file, or directory receiving <table>.<format> (default: working directory)
    #[arg(long)]
    path: Option<PathBuf>,
}

impl OutputArgs {
    fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Csv,
    Xlsx,
}

impl FormatArg {
    fn export_format(self) -> Result<ExportFormat> {
        match self {
            Self::Csv => Ok(ExportFormat::Csv),
            #[cfg(feature = "spreadsheet")]
            Self::Xlsx => Ok(ExportFormat::Xlsx),
            #[cfg(not(feature = "spreadsheet"))]
            Self::Xlsx => anyhow::bail!("XLSX export requires the spreadsheet feature"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.quiet)?;

    run(&cli).await
}

async fn run(cli: &Cli) -> Result<()> {
    let directory = open_directory(&cli.connection).await?;

    match &cli.command {
        Command::List => {
            for name in directory.list_names() {
                println!("{name}");
            }
            Ok(())
        }
        Command::Show { table } => {
            let result = directory
                .fetch(table)
                .await
                .with_context(|| format!("Failed to fetch table {table}"))?;
            export::csv::write_csv(&result, std::io::stdout().lock())
                .context("Failed to write CSV to stdout")
        }
        Command::Export { table, output } => {
            let format = output.format.export_format()?;
            let written = directory
                .lookup(table)?
                .save_as(format, output.path())
                .await
                .with_context(|| format!("Failed to export table {table}"))?;
            info!("✓ Exported {} to {}", table, written.display());
            Ok(())
        }
        Command::ExportAll { output } => export_all(&directory, output).await,
    }
}

/// Loads settings and enumerates the configured schema.
async fn open_directory(args: &ConnectionArgs) -> Result<TableDirectory> {
    let config = match &args.env_file {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
    .context("Failed to load configuration")?;

    let schema = config.database.schema.clone();
    let connector: Arc<dyn Connector> = if args.direct {
        info!("Connecting directly to {}:{}", config.database.host, config.database.port);
        Arc::new(DirectConnector::new(config.database))
    } else {
        info!(
            "Connecting to {}:{} through {}:{}",
            config.database.host, config.database.port, config.tunnel.host, config.tunnel.port
        );
        Arc::new(TunnelConnector::new(config))
    };

    TableDirectory::with_connector(schema, args.include_views, connector)
        .await
        .context("Failed to enumerate tables")
}

/// Exports every table; stops at the first failure.
async fn export_all(directory: &TableDirectory, output: &OutputArgs) -> Result<()> {
    let format = output.format.export_format()?;

    for table in directory.tables() {
        table
            .save_as(format, output.path())
            .await
            .with_context(|| format!("Failed to export table {}", table.table_name()))?;
    }

    info!(
        "✓ Exported {} tables from schema {}",
        directory.len(),
        directory.schema_name()
    );
    Ok(())
}
