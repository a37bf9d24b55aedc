// Core library for cabload: taxi trip CSV reader, duplicate filter and bulk loader

pub use cli::{Cli, StatsFormat};
pub use config::LoaderConfig;
pub use dedup::DuplicateFilter;
pub use error::{FieldError, RowError, RowErrorCause};
pub use loader::{
    BulkLoader, BulkSession, CellValue, ColumnMapping, Destination, SourceField,
    SqliteDestination, TableMapping,
};
pub use pipeline::{run, run_into};
pub use reader::BatchReader;
pub use record::{Record, StoreAndFwdFlag, TripKey};
pub use stats::RunStats;

pub mod cli;
pub mod config;
pub mod config_file;
pub mod dedup;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod platform;
pub mod reader;
pub mod record;
pub mod stats;
pub mod timestamp;
