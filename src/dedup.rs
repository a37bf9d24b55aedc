use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use crate::record::{Record, TripKey};
use crate::stats::{stats_add_duplicate, stats_add_unique};

/// Default location of the duplicates spill file
pub const DEFAULT_DUPLICATES_PATH: &str = "duplicates.csv";

/// Drops repeated trips from a record stream.
///
/// The first record seen for each business key is forwarded as soon as it arrives.
/// Later records with the same key are held back in a side list. When the upstream is
/// exhausted the side list is written once to the spill path (if one is set and the
/// list is non-empty) and then released. A spill failure is reported as the final item.
///
/// Upstream errors are passed through unchanged.
pub struct DuplicateFilter<I> {
    records: I,
    seen: HashSet<TripKey>,
    duplicates: Vec<Record>,
    spill_path: Option<PathBuf>,
    finished: bool,
}

impl<I> DuplicateFilter<I>
where
    I: Iterator<Item = Result<Record>>,
{
    pub fn new(records: I) -> Self {
        Self {
            records,
            seen: HashSet::new(),
            duplicates: Vec::new(),
            spill_path: None,
            finished: false,
        }
    }

    /// Write held-back duplicates to this CSV file once the stream ends
    pub fn with_spill_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.spill_path = Some(path.into());
        self
    }

    /// Duplicates collected so far. Empty after they have been spilled to disk.
    pub fn duplicates(&self) -> &[Record] {
        &self.duplicates
    }

    /// Distinct business keys seen so far
    pub fn unique_count(&self) -> usize {
        self.seen.len()
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        if self.duplicates.is_empty() {
            log::info!("No duplicate records found");
            return Ok(());
        }

        log::info!("Found {} duplicate records", self.duplicates.len());
        if let Some(path) = &self.spill_path {
            write_duplicates(path, &self.duplicates)?;
            log::info!(
                "Wrote {} duplicate records to {}",
                self.duplicates.len(),
                path.display()
            );
            self.duplicates = Vec::new();
        }
        Ok(())
    }
}

impl<I> Iterator for DuplicateFilter<I>
where
    I: Iterator<Item = Result<Record>>,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        for item in self.records.by_ref() {
            let record = match item {
                Ok(record) => record,
                Err(err) => return Some(Err(err)),
            };

            if self.seen.insert(record.key()) {
                stats_add_unique();
                return Some(Ok(record));
            }
            stats_add_duplicate();
            self.duplicates.push(record);
        }

        match self.finish() {
            Ok(()) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

/// Write records as CSV with a header row, replacing any existing file
pub fn write_duplicates(path: &Path, records: &[Record]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create duplicates file: {}", path.display()))?;
    write_records(BufWriter::new(file), records)
        .with_context(|| format!("Failed to write duplicates file: {}", path.display()))
}

fn write_records<W: io::Write>(writer: W, records: &[Record]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
