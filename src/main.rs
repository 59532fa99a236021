//! mongoie - streaming MongoDB import and export
//!
//! Moves documents between collections and JSON, JSON Lines, CSV or Parquet
//! files one batch at a time.
//!
//! # Usage
//!
//! ```bash
//! # Collection to CSV, nested documents flattened into dotted columns
//! mongoie export --db shop --collection orders --file-path orders.csv
//!
//! # Every *logs* JSON file of a directory into a collection
//! mongoie import --db ops --collection logs --dir-path dump --pattern '*logs*'
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use mongoie::cli::CliInterface;
use mongoie::error::Result;

/// Application entry point
#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Parse arguments, load configuration, initialize logging, run the command
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;
    initialize_logging(&cli);
    cli.execute().await
}

/// Initialize logging on stderr
///
/// Level precedence: verbosity flags, then `RUST_LOG`, then the configured
/// level.
fn initialize_logging(cli: &CliInterface) {
    let level_filter =
        |level: tracing::Level| EnvFilter::default().add_directive(LevelFilter::from_level(level).into());

    let filter = match cli.explicit_log_level() {
        Some(level) => level_filter(level.to_tracing_level()),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| level_filter(cli.config().logging.level.to_tracing_level())),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
