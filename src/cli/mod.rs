//! Command-line interface for mongoie
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading (file, environment, then flags on top)
//! - Dispatching export, import and listing commands
//! - Printing transfer summaries to stdout

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::config::{Config, LogLevel};
use crate::error::Result;
use crate::transfer::api::{
    self, ExportOptions, ImportInput, ImportOptions, list_collections, list_databases,
};
use crate::transfer::pipeline::TransferSummary;
use crate::transfer::query::ExportQuery;
use crate::transfer::sources::directory::DirectoryScan;

/// Streaming MongoDB import and export
#[derive(Parser, Debug)]
#[command(
    name = "mongoie",
    version,
    about = "Stream MongoDB collections to and from JSON, CSV and Parquet files",
    long_about = "Exports collections (or aggregation results) to JSON, JSON Lines, CSV or
Parquet files and imports such files back, batch by batch, flattening nested
documents into path-keyed columns where tabular formats need it."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only, no progress)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Disable the progress spinner
    #[arg(long = "no-progress", global = true)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for mongoie
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export a collection to a file
    Export(ExportArgs),

    /// Import a file or a directory of files into a collection
    Import(ImportArgs),

    /// List the collections of a database
    ListCollections {
        #[command(flatten)]
        target: UriArg,

        /// Database name
        #[arg(long, value_name = "NAME")]
        db: String,

        /// Only names matching this regular expression
        #[arg(long, value_name = "REGEX")]
        regex: Option<String>,

        /// Print at most this many names
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },

    /// List the databases of a deployment
    ListDatabases {
        #[command(flatten)]
        target: UriArg,
    },

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// Connection string, falling back to the configured default
#[derive(Args, Debug)]
pub struct UriArg {
    /// MongoDB connection URI
    #[arg(long, value_name = "URI")]
    pub uri: Option<String>,
}

/// Arguments of `export`
#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(flatten)]
    pub target: UriArg,

    /// Database name
    #[arg(long, value_name = "NAME")]
    pub db: String,

    /// Collection name
    #[arg(long, value_name = "NAME")]
    pub collection: String,

    /// Filter document or aggregation stages, inline JSON or a .json file
    #[arg(long, value_name = "JSON|FILE")]
    pub query: Option<String>,

    /// Output file; its extension picks the format
    #[arg(long, value_name = "FILE")]
    pub file_path: Option<PathBuf>,

    /// Output format (json, jsonl, csv, parquet), overrides the extension
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Flatten nested documents (default: on for csv and parquet)
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub normalize: Option<bool>,

    /// Separator joining nested key paths
    #[arg(long, value_name = "SEP")]
    pub separator: Option<String>,

    /// Records per batch
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Maximum records per output file
    #[arg(long, value_name = "N")]
    pub file_size: Option<u64>,

    /// Keep the `_id` field
    #[arg(long)]
    pub keep_id: bool,
}

/// Arguments of `import`
#[derive(Args, Debug)]
pub struct ImportArgs {
    #[command(flatten)]
    pub target: UriArg,

    /// Database name
    #[arg(long, value_name = "NAME")]
    pub db: String,

    /// Collection name
    #[arg(long, value_name = "NAME")]
    pub collection: String,

    /// File to import; its extension picks the format
    #[arg(long, value_name = "FILE", conflicts_with = "dir_path", required_unless_present = "dir_path")]
    pub file_path: Option<PathBuf>,

    /// Directory whose matching files are imported in file name order
    #[arg(long, value_name = "DIR")]
    pub dir_path: Option<PathBuf>,

    /// Extension of the files to read from the directory [default: json]
    #[arg(long, value_name = "EXT", conflicts_with = "file_path")]
    pub extension: Option<String>,

    /// Glob the file names must match [default: *]
    #[arg(long, value_name = "GLOB", conflicts_with = "file_path")]
    pub pattern: Option<String>,

    /// Descend into subdirectories
    #[arg(long, conflicts_with = "file_path")]
    pub recursive: bool,

    /// Empty the collection before importing
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub clear: Option<bool>,

    /// Rebuild nested documents from path-keyed fields
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub denormalize: Option<bool>,

    /// Separator joining nested key paths
    #[arg(long, value_name = "SEP")]
    pub separator: Option<String>,

    /// Records per batch
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Keep `_id` fields found in the files
    #[arg(long)]
    pub keep_id: bool,
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Parse the process arguments and load configuration
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Load configuration for already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration: defaults, then file, then environment, then flags
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;
        config.apply_env()?;
        Self::apply_args_to_config(&mut config, args);
        Ok(config)
    }

    /// Apply global CLI flags to configuration
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        if let Some(level) = Self::flag_log_level(args) {
            config.logging.level = level;
        }
        if args.no_progress || args.quiet {
            config.transfer.progress = false;
        }
    }

    fn flag_log_level(args: &CliArgs) -> Option<LogLevel> {
        if args.very_verbose {
            Some(LogLevel::Trace)
        } else if args.verbose {
            Some(LogLevel::Debug)
        } else if args.quiet {
            Some(LogLevel::Error)
        } else {
            None
        }
    }

    /// Log level forced by a verbosity flag, if any
    pub fn explicit_log_level(&self) -> Option<LogLevel> {
        Self::flag_log_level(&self.args)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the CLI arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Connection string from `--uri` or the configuration
    fn uri(&self, target: &UriArg) -> String {
        target
            .uri
            .clone()
            .unwrap_or_else(|| self.config.connection.default_uri.clone())
    }

    /// Run the selected subcommand
    pub async fn execute(&self) -> Result<()> {
        match &self.args.command {
            Commands::Config { show, validate } => self.handle_config_command(*show, *validate),
            Commands::Export(args) => {
                self.config.validate()?;
                let summary = api::export(self.export_options(args)?).await?;
                self.print_summary("Exported", &summary);
                Ok(())
            }
            Commands::Import(args) => {
                self.config.validate()?;
                let summary = api::import(self.import_options(args)).await?;
                self.print_summary("Imported", &summary);
                Ok(())
            }
            Commands::ListCollections {
                target,
                db,
                regex,
                limit,
            } => {
                let names = list_collections(
                    &self.uri(target),
                    db,
                    regex.as_deref(),
                    &self.config.connection,
                )
                .await?;
                for name in names.iter().take(limit.unwrap_or(usize::MAX)) {
                    println!("{name}");
                }
                Ok(())
            }
            Commands::ListDatabases { target } => {
                for name in list_databases(&self.uri(target), &self.config.connection).await? {
                    println!("{name}");
                }
                Ok(())
            }
        }
    }

    /// Build export options from arguments over configuration
    pub fn export_options(&self, args: &ExportArgs) -> Result<ExportOptions> {
        let mut options = ExportOptions::new(
            &self.config,
            &self.uri(&args.target),
            &args.db,
            &args.collection,
        );
        if let Some(query) = &args.query {
            options.query = ExportQuery::parse(query)?;
        }
        options.file_path = args.file_path.clone();
        options.format = args.format.clone();
        options.normalize = args.normalize;
        options.file_size = args.file_size;
        if let Some(separator) = &args.separator {
            options.separator = separator.clone();
        }
        if let Some(batch_size) = args.batch_size {
            options.batch_size = batch_size;
        }
        if args.keep_id {
            options.exclude_id = false;
        }
        Ok(options)
    }

    /// Build import options from arguments over configuration
    pub fn import_options(&self, args: &ImportArgs) -> ImportOptions {
        let input = match (&args.file_path, &args.dir_path) {
            (Some(file), _) => ImportInput::File(file.clone()),
            (None, dir) => {
                let defaults = DirectoryScan::default();
                ImportInput::Directory {
                    path: dir.clone().unwrap_or_else(|| PathBuf::from(".")),
                    scan: DirectoryScan {
                        extension: args.extension.clone().unwrap_or(defaults.extension),
                        pattern: args.pattern.clone().unwrap_or(defaults.pattern),
                        recursive: args.recursive,
                    },
                }
            }
        };

        let mut options = ImportOptions::new(
            &self.config,
            &self.uri(&args.target),
            &args.db,
            &args.collection,
            input,
        );
        if let Some(clear) = args.clear {
            options.clear_before = clear;
        }
        if let Some(denormalize) = args.denormalize {
            options.denormalize = denormalize;
        }
        if let Some(separator) = &args.separator {
            options.separator = separator.clone();
        }
        if let Some(batch_size) = args.batch_size {
            options.batch_size = batch_size;
        }
        if args.keep_id {
            options.exclude_id = false;
        }
        options
    }

    fn print_summary(&self, verb: &str, summary: &TransferSummary) {
        println!("{}", render_summary(verb, summary));
    }

    /// Handle config subcommand
    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config_file();
        }

        if show || !validate {
            self.show_config()?;
        }

        Ok(())
    }

    /// Validate configuration file
    fn validate_config_file(&self) {
        let path = self.get_config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("❌ Configuration file does not exist");
            return;
        }

        match Config::load_from_file(Some(path.as_path())) {
            Ok(config) => match config.validate() {
                Ok(_) => println!("✅ Configuration is valid"),
                Err(e) => println!("❌ Configuration validation failed: {}", e),
            },
            Err(e) => println!("❌ Failed to load configuration: {}", e),
        }
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        println!("Configuration file: {}", self.get_config_path().display());
        println!();
        print!("{}", self.config.to_toml()?);
        Ok(())
    }

    fn get_config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }

    /// Path of an explicit `--config` file
    pub fn config_path(&self) -> Option<&Path> {
        self.args.config_file.as_deref()
    }
}

/// Human-readable transfer summary
pub fn render_summary(verb: &str, summary: &TransferSummary) -> String {
    let mut lines = vec![format!(
        "{verb} {} records in {} batches from {} to {} ({} ms)",
        summary.records_written,
        summary.batches,
        summary.origin,
        summary.destination,
        summary.elapsed_ms
    )];
    if !summary.dropped_empty_paths.is_empty() {
        lines.push(format!(
            "Dropped empty nested documents ({}): {}",
            summary.dropped_empty_paths.len(),
            join(&summary.dropped_empty_paths)
        ));
    }
    if !summary.ambiguous_keys.is_empty() {
        lines.push(format!(
            "Keys containing the separator ({}): {}",
            summary.ambiguous_keys.len(),
            join(&summary.ambiguous_keys)
        ));
    }
    if !summary.colliding_keys.is_empty() {
        lines.push(format!(
            "Keys produced by more than one path, first value kept ({}): {}",
            summary.colliding_keys.len(),
            join(&summary.colliding_keys)
        ));
    }
    lines.join("\n")
}

fn join<'a>(paths: impl IntoIterator<Item = &'a String>) -> String {
    paths
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
