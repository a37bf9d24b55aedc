use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::cli::{Cli, StatsFormat};
use crate::config_file::ConfigFile;
use crate::dedup::DEFAULT_DUPLICATES_PATH;
use crate::loader::{DEFAULT_DATABASE_PATH, DEFAULT_TABLE};
use crate::reader::DEFAULT_BATCH_SIZE;

/// Main configuration struct for cabload
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    pub input: InputConfig,
    pub duplicates: DuplicatesConfig,
    pub destination: DestinationConfig,
    pub output: OutputConfig,
}

/// Input configuration
#[derive(Debug, Clone, PartialEq)]
pub struct InputConfig {
    pub path: PathBuf,
    pub batch_size: usize,
}

/// Duplicates spill file configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicatesConfig {
    pub path: PathBuf,
}

/// Destination configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationConfig {
    pub database: PathBuf,
    pub table: String,
    pub create_table: bool,
}

/// Output configuration
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub stats: Option<StatsFormat>,
}

impl LoaderConfig {
    /// Start from defaults for `input`
    pub fn new<P: Into<PathBuf>>(input: P) -> Self {
        Self {
            input: InputConfig {
                path: input.into(),
                batch_size: DEFAULT_BATCH_SIZE,
            },
            ..Self::default()
        }
    }

    /// Layer a config file and then the command line over the defaults
    pub fn from_cli(cli: &Cli, file: &ConfigFile) -> Result<Self> {
        let mut config = Self::default();
        config.apply_file(file)?;

        if let Some(input) = &cli.input {
            config.input.path = input.clone();
        }
        if let Some(batch_size) = cli.batch_size {
            config.input.batch_size = batch_size;
        }
        if let Some(path) = &cli.duplicates {
            config.duplicates.path = path.clone();
        }
        if let Some(database) = &cli.database {
            config.destination.database = database.clone();
        }
        if let Some(table) = &cli.table {
            config.destination.table = table.clone();
        }
        if let Some(create_table) = cli.create_table_flag() {
            config.destination.create_table = create_table;
        }
        if let Some(stats) = cli.stats_flag() {
            config.output.stats = stats;
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: &ConfigFile) -> Result<()> {
        if let Some(batch_size) = file.batch_size {
            self.input.batch_size = batch_size;
        }
        if let Some(path) = &file.duplicates_path {
            self.duplicates.path = PathBuf::from(path);
        }
        if let Some(database) = &file.database {
            self.destination.database = PathBuf::from(database);
        }
        if let Some(table) = &file.table {
            self.destination.table = table.clone();
        }
        if let Some(create_table) = file.create_table {
            self.destination.create_table = create_table;
        }
        match (file.stats, file.stats_format.as_deref()) {
            (Some(false), _) => self.output.stats = None,
            (_, Some(format)) => self.output.stats = Some(parse_stats_format(format)?),
            (Some(true), None) => self.output.stats = Some(StatsFormat::Table),
            (None, None) => {}
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.input.batch_size == 0 {
            bail!("Batch size must be at least 1");
        }
        if self.destination.table.trim().is_empty() {
            bail!("Destination table name cannot be empty");
        }
        if self.duplicates.path.as_os_str().is_empty() {
            bail!("Duplicates path cannot be empty");
        }
        Ok(())
    }

    /// Human-readable effective settings, one `key = value` per line
    pub fn describe(&self) -> String {
        let input = if self.input.path.as_os_str().is_empty() {
            "<not set>".to_string()
        } else {
            self.input.path.display().to_string()
        };
        let stats = match self.output.stats {
            None => "off",
            Some(StatsFormat::Table) => "table",
            Some(StatsFormat::Json) => "json",
        };
        format!(
            "[input]\n  path = {}\n  batch_size = {}\n[duplicates]\n  path = {}\n[destination]\n  database = {}\n  table = {}\n  create_table = {}\n[output]\n  stats = {}",
            input,
            self.input.batch_size,
            self.duplicates.path.display(),
            self.destination.database.display(),
            self.destination.table,
            self.destination.create_table,
            stats
        )
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            input: InputConfig {
                path: PathBuf::new(),
                batch_size: DEFAULT_BATCH_SIZE,
            },
            duplicates: DuplicatesConfig {
                path: PathBuf::from(DEFAULT_DUPLICATES_PATH),
            },
            destination: DestinationConfig {
                database: PathBuf::from(DEFAULT_DATABASE_PATH),
                table: DEFAULT_TABLE.to_string(),
                create_table: true,
            },
            output: OutputConfig { stats: None },
        }
    }
}

fn parse_stats_format(value: &str) -> Result<StatsFormat> {
    match value.to_lowercase().as_str() {
        "table" => Ok(StatsFormat::Table),
        "json" => Ok(StatsFormat::Json),
        other => bail!("Unknown stats format '{}' (expected table or json)", other),
    }
}
