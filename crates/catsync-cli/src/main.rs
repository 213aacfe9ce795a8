mod sync;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "catsync-cli")]
#[command(about = "Marketplace catalog synchronization")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one synchronization pass
    Sync(SyncArgs),
    /// Database operations
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    Ping,
    Migrate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceArg {
    Catalog,
    Supplies,
}

#[derive(Debug, Args)]
struct SyncArgs {
    /// Barcode to resolve (repeatable)
    #[arg(long = "barcode")]
    barcodes: Vec<String>,

    /// Vendor code to resolve (repeatable)
    #[arg(long = "vendor-code")]
    vendor_codes: Vec<String>,

    /// Marketplace numeric id to resolve (repeatable)
    #[arg(long = "nm-id")]
    nm_ids: Vec<i64>,

    /// Pagination bound; defaults to CATSYNC_MAX_PAGES
    #[arg(long)]
    max_pages: Option<usize>,

    #[arg(long, value_enum, default_value = "catalog")]
    source: SourceArg,

    /// Stage patches without writing them
    #[arg(long)]
    dry_run: bool,

    /// Include diagnostics in the output
    #[arg(long)]
    debug: bool,

    /// On a marketplace failure, still write the patches staged before it
    #[arg(long)]
    flush_partial: bool,

    /// Print the full JSON result instead of a summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("catsync-cli: try `catsync-cli --help`");
        return Ok(());
    };

    let config = catsync_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = catsync_db::PoolConfig::from_app_config(&config);
    let pool = catsync_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Sync(args) => sync::run_sync(pool, &config, &args).await,
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            catsync_db::ping(&pool).await?;
            println!("database ok");
            Ok(())
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let applied = catsync_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
            Ok(())
        }
    }
}
