use anyhow::Result;

use crate::config::LoaderConfig;
use crate::dedup::DuplicateFilter;
use crate::loader::{BulkLoader, Destination, SqliteDestination, TableMapping};
use crate::reader::BatchReader;
use crate::stats::{get_thread_stats, stats_finish, stats_reset, RunStats};

/// Run the whole load against the configured SQLite database.
///
/// The input file is opened before the database so that a bad input path leaves no
/// database file behind.
pub fn run(config: &LoaderConfig) -> Result<RunStats> {
    config.validate()?;
    stats_reset();

    let reader = BatchReader::from_path(&config.input.path, config.input.batch_size)?;
    let mut destination = SqliteDestination::open(&config.destination.database)?
        .with_create_table(config.destination.create_table);

    load(config, reader, &mut destination)
}

/// Run the load from an already opened reader into any destination.
///
/// Stages are pulled lazily: the loader drains the duplicate filter, which drains the
/// reader one batch at a time. The duplicates file is written when the reader runs dry,
/// before the destination session commits.
pub fn run_into<D>(config: &LoaderConfig, destination: &mut D) -> Result<RunStats>
where
    D: Destination + ?Sized,
{
    config.validate()?;
    stats_reset();

    let reader = BatchReader::from_path(&config.input.path, config.input.batch_size)?;
    load(config, reader, destination)
}

fn load<R, D>(config: &LoaderConfig, reader: BatchReader<R>, destination: &mut D) -> Result<RunStats>
where
    R: std::io::Read,
    D: Destination + ?Sized,
{
    log::info!(
        "Loading {} into table {} (batch size {})",
        config.input.path.display(),
        config.destination.table,
        config.input.batch_size
    );

    let records = DuplicateFilter::new(reader).with_spill_path(&config.duplicates.path);
    let loader = BulkLoader::new(
        TableMapping::cab_data(&config.destination.table)?,
        config.input.batch_size,
    )?;
    loader.load(destination, records)?;

    stats_finish();
    let stats = get_thread_stats();
    log::info!("{}", stats.format_stats());
    Ok(stats)
}
