mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use ledgersync_engine::SyncDirection;

#[derive(Parser)]
#[command(
    name = "ledgersync",
    version,
    about = "Keeps a document store and a local SQL mirror in sync"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Push,
    Pull,
    Both,
}

impl From<DirectionArg> for SyncDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Push => Self::Push,
            DirectionArg::Pull => Self::Pull,
            DirectionArg::Both => Self::Both,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Pull, push, and export every configured entity type
    Sync {
        /// Path to sync config YAML file
        config: PathBuf,
        /// Override the configured direction
        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,
        /// Only these entity types (repeatable)
        #[arg(long = "entity")]
        entities: Vec<String>,
    },
    /// Write the primary store's records as delimited files
    Export {
        /// Path to sync config YAML file
        config: PathBuf,
        /// Output directory (default: the configured export_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Only these entity types (repeatable)
        #[arg(long = "entity")]
        entities: Vec<String>,
    },
    /// Run a range query, falling back when an index is missing
    Query {
        /// Path to sync config YAML file
        config: PathBuf,
        /// Entity type to query (e.g. "transaction")
        entity: String,
        /// Range field
        #[arg(long)]
        field: String,
        /// Inclusive lower bound
        #[arg(long)]
        from: Option<String>,
        /// Inclusive upper bound
        #[arg(long)]
        to: Option<String>,
        /// Equality filter as field=value (repeatable)
        #[arg(long = "where")]
        filters: Vec<String>,
        /// Sort field
        #[arg(long)]
        order_by: Option<String>,
        /// Sort descending
        #[arg(long)]
        desc: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Validate configuration and open both stores
    Check {
        /// Path to sync config YAML file
        config: PathBuf,
    },
    /// Show recent sync runs
    History {
        /// Path to sync config YAML file
        config: PathBuf,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Sync {
            config,
            direction,
            entities,
        } => commands::sync::execute(&config, direction.map(Into::into), &entities).await,
        Commands::Export {
            config,
            output,
            entities,
        } => commands::export::execute(&config, output, &entities).await,
        Commands::Query {
            config,
            entity,
            field,
            from,
            to,
            filters,
            order_by,
            desc,
            limit,
        } => {
            let args = commands::query::QueryArgs {
                entity,
                field,
                from,
                to,
                filters,
                order_by,
                desc,
                limit,
            };
            commands::query::execute(&config, &args).await
        }
        Commands::Check { config } => commands::check::execute(&config),
        Commands::History { config, limit } => commands::history::execute(&config, limit),
    }
}
