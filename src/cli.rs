// Command-line interface definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatsFormat {
    #[default]
    Table,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "cabload")]
#[command(about = "Load taxi trip CSV exports into a database, dropping duplicate trips")]
#[command(
    long_about = "Load taxi trip CSV exports into a database, dropping duplicate trips\n\nRows are read in batches, converted from US Eastern time to UTC and validated.\nRows that fail validation are logged and skipped. Repeated trips (same pickup,\ndropoff and passenger count) are written to a duplicates file instead of loaded.\nThe load commits only if the whole input is read without a fatal error.\n\nEXAMPLES:\n  cabload trips.csv\n  cabload trips.csv --database cabs.db --table Trips --batch-size 5000\n  cabload trips.csv --duplicates dupes.csv --stats=json"
)]
#[command(version)]
#[command(args_override_self = true)]
pub struct Cli {
    /// CSV file to load
    #[arg(required_unless_present = "show_config")]
    pub input: Option<PathBuf>,

    /// Rows per read batch and per bulk write [default: 10000]
    #[arg(short = 'b', long = "batch-size", help_heading = "Input Options")]
    pub batch_size: Option<usize>,

    /// Where to write duplicate trips [default: duplicates.csv]
    #[arg(short = 'd', long = "duplicates", help_heading = "Output Options")]
    pub duplicates: Option<PathBuf>,

    /// SQLite database to load into [default: cab-data.db]
    #[arg(long = "database", help_heading = "Destination Options")]
    pub database: Option<PathBuf>,

    /// Destination table [default: ProcessedCabData]
    #[arg(short = 't', long = "table", help_heading = "Destination Options")]
    pub table: Option<String>,

    /// Create the destination table if it does not exist (default: on)
    #[arg(long = "create-table", help_heading = "Destination Options")]
    pub create_table: bool,

    /// Require the destination table to exist already
    #[arg(
        long = "no-create-table",
        help_heading = "Destination Options",
        overrides_with = "create_table"
    )]
    pub no_create_table: bool,

    /// Print a run summary to stderr. Use -s for table, or --stats=json.
    #[arg(
        short = 's',
        long = "stats",
        value_enum,
        value_name = "FORMAT",
        require_equals = true,
        num_args = 0..=1,
        default_missing_value = "table",
        help_heading = "Metrics and Stats"
    )]
    pub stats: Option<StatsFormat>,

    /// Disable the run summary explicitly (default: off)
    #[arg(
        long = "no-stats",
        help_heading = "Metrics and Stats",
        overrides_with = "stats"
    )]
    pub no_stats: bool,

    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Logging")]
    pub verbose: u8,

    /// Only log errors
    #[arg(short = 'q', long = "quiet", help_heading = "Logging", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Specify custom configuration file path
    #[arg(long = "config", help_heading = "Configuration Options")]
    pub config_file: Option<PathBuf>,

    /// Ignore configuration files
    #[arg(long = "ignore-config", help_heading = "Configuration Options")]
    pub ignore_config: bool,

    /// Show effective configuration and exit
    #[arg(long = "show-config", help_heading = "Configuration Options")]
    pub show_config: bool,
}

impl Cli {
    /// Resolve inverted boolean flags to their actual values. Returns `None` for
    /// flags the user left alone so config files can fill them in.
    pub fn create_table_flag(&self) -> Option<bool> {
        if self.no_create_table {
            Some(false)
        } else if self.create_table {
            Some(true)
        } else {
            None
        }
    }

    /// `Some(None)` when `--no-stats` was given, so it can override a config file
    pub fn stats_flag(&self) -> Option<Option<StatsFormat>> {
        if self.no_stats {
            Some(None)
        } else {
            self.stats.map(Some)
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }
        match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
