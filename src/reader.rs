use anyhow::{anyhow, Context, Result};
use csv::{ByteRecord, ReaderBuilder, StringRecord};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io;
use std::path::Path;
use std::str::FromStr;

use crate::error::{FieldError, RowError, RowErrorCause};
use crate::record::{columns, Record, StoreAndFwdFlag};
use crate::stats::{stats_add_record_parsed, stats_add_row_read, stats_add_row_skipped};
use crate::timestamp::parse_eastern_timestamp;

/// Records held in memory before a batch is released downstream
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Upper bound on the buffer allocated up front; larger batches grow on demand
const MAX_PREALLOCATED: usize = 64 * 1024;

/// Header name -> position, resolved once from the header row
#[derive(Debug, Clone, Default)]
struct ColumnIndex {
    positions: HashMap<&'static str, usize>,
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord) -> Self {
        let mut positions = HashMap::new();
        for column in columns::ALL {
            if let Some(pos) = headers.iter().position(|h| h.trim() == column) {
                positions.insert(column, pos);
            }
        }
        Self { positions }
    }

    fn missing(&self) -> Vec<&'static str> {
        columns::ALL
            .iter()
            .copied()
            .filter(|c| !self.positions.contains_key(c))
            .collect()
    }

    /// Trimmed field value for a column, or None when the column or the cell is absent
    fn get<'r>(&self, row: &'r StringRecord, column: &'static str) -> Option<&'r str> {
        self.positions
            .get(column)
            .and_then(|&pos| row.get(pos))
            .map(str::trim)
    }

    fn require<'r>(
        &self,
        row: &'r StringRecord,
        column: &'static str,
    ) -> Result<&'r str, FieldError> {
        self.get(row, column).ok_or(FieldError::Missing { column })
    }
}

/// Streams validated trip records out of a CSV source.
///
/// Rows are converted one at a time. Rows with an unconvertible field are logged and
/// dropped; they never end the stream. Valid records are gathered into a buffer of
/// `batch_size` and released in source order once it is full, with the remainder
/// released at end of input.
///
/// Only I/O failures of the underlying source surface as `Err` items. After one the
/// reader yields nothing more.
pub struct BatchReader<R: io::Read> {
    reader: csv::Reader<R>,
    index: ColumnIndex,
    batch_size: usize,
    buffer: VecDeque<Record>,
    row: ByteRecord,
    rows_read: u64,
    rows_skipped: u64,
    exhausted: bool,
}

impl BatchReader<File> {
    /// Open a source file. Fails when the file cannot be opened or has no header row.
    pub fn from_path<P: AsRef<Path>>(path: P, batch_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open input file: {}", path.display()))?;
        Self::from_reader(file, batch_size)
            .with_context(|| format!("Failed to read input file: {}", path.display()))
    }
}

impl<R: io::Read> BatchReader<R> {
    pub fn from_reader(source: R, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(anyhow!("Batch size must be at least 1"));
        }

        // Rows stay untrimmed so skip diagnostics show the source text
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(source);

        let headers = reader
            .headers()
            .context("Failed to parse CSV header line")?
            .clone();
        if headers.is_empty() {
            return Err(anyhow!("No header record was found"));
        }

        let index = ColumnIndex::from_headers(&headers);
        let missing = index.missing();
        if !missing.is_empty() {
            log::warn!(
                "Input is missing required columns: {}",
                missing.join(", ")
            );
        }

        Ok(Self {
            reader,
            index,
            batch_size,
            buffer: VecDeque::with_capacity(batch_size.min(MAX_PREALLOCATED)),
            row: ByteRecord::new(),
            rows_read: 0,
            rows_skipped: 0,
            exhausted: false,
        })
    }

    /// Data rows consumed from the source so far (header excluded)
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Data rows dropped because a field could not be converted
    pub fn rows_skipped(&self) -> u64 {
        self.rows_skipped
    }

    /// Read source rows until the buffer holds a full batch or input ends
    fn fill_batch(&mut self) -> Result<()> {
        while self.buffer.len() < self.batch_size {
            match self.reader.read_byte_record(&mut self.row) {
                Ok(true) => {
                    self.rows_read += 1;
                    stats_add_row_read();
                    match self.convert_current_row() {
                        Ok(record) => {
                            stats_add_record_parsed();
                            self.buffer.push_back(record);
                        }
                        Err(err) => self.skip(err),
                    }
                }
                Ok(false) => {
                    self.exhausted = true;
                    break;
                }
                Err(err) if err.is_io_error() => {
                    self.exhausted = true;
                    return Err(err).context("Failed to read from input");
                }
                Err(err) => {
                    self.rows_read += 1;
                    stats_add_row_read();
                    // Byte records skip UTF-8 and length checks, so no row text reaches here
                    let line = err.position().map(|p| p.line()).unwrap_or(0);
                    self.skip(RowError {
                        line,
                        raw: String::new(),
                        cause: RowErrorCause::Malformed(err.to_string()),
                    });
                }
            }
        }

        if !self.buffer.is_empty() {
            log::debug!("Releasing batch of {} records", self.buffer.len());
        }
        Ok(())
    }

    /// Decode and convert the row last read into `self.row`. The row buffer is handed
    /// back afterwards for reuse.
    fn convert_current_row(&mut self) -> Result<Record, RowError> {
        let line = self.row.position().map(|p| p.line()).unwrap_or(0);
        let bytes = std::mem::replace(&mut self.row, ByteRecord::new());

        let text = match StringRecord::from_byte_record(bytes) {
            Ok(text) => text,
            Err(err) => {
                let cause = RowErrorCause::Malformed(err.utf8_error().to_string());
                self.row = err.into_byte_record();
                return Err(RowError {
                    line,
                    raw: render_row(&self.row),
                    cause,
                });
            }
        };

        let result = parse_row(&self.index, &text).map_err(|cause| RowError {
            line,
            raw: render_row(text.as_byte_record()),
            cause: cause.into(),
        });
        self.row = text.into_byte_record();
        result
    }

    fn skip(&mut self, err: RowError) {
        self.rows_skipped += 1;
        stats_add_row_skipped();
        log::warn!("Skipping record due to error: {}", err);
    }
}

impl<R: io::Read> Iterator for BatchReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(record) = self.buffer.pop_front() {
            return Some(Ok(record));
        }
        if self.exhausted {
            return None;
        }
        if let Err(err) = self.fill_batch() {
            return Some(Err(err));
        }
        self.buffer.pop_front().map(Ok)
    }
}

/// Convert one source row into a record
fn parse_row(index: &ColumnIndex, row: &StringRecord) -> Result<Record, FieldError> {
    let required = |column: &'static str| index.require(row, column);

    Ok(Record {
        pickup_time: parse_eastern_timestamp(
            columns::PICKUP_DATETIME,
            required(columns::PICKUP_DATETIME)?,
        )?,
        dropoff_time: parse_eastern_timestamp(
            columns::DROPOFF_DATETIME,
            required(columns::DROPOFF_DATETIME)?,
        )?,
        passenger_count: parse_passenger_count(index.get(row, columns::PASSENGER_COUNT))?,
        trip_distance: parse_distance(required(columns::TRIP_DISTANCE)?)?,
        store_and_fwd_flag: StoreAndFwdFlag::normalize(required(columns::STORE_AND_FWD_FLAG)?),
        pickup_location_id: parse_number(
            columns::PU_LOCATION_ID,
            required(columns::PU_LOCATION_ID)?,
            "integer",
        )?,
        dropoff_location_id: parse_number(
            columns::DO_LOCATION_ID,
            required(columns::DO_LOCATION_ID)?,
            "integer",
        )?,
        fare_amount: parse_decimal(columns::FARE_AMOUNT, required(columns::FARE_AMOUNT)?)?,
        tip_amount: parse_decimal(columns::TIP_AMOUNT, required(columns::TIP_AMOUNT)?)?,
    })
}

fn parse_number<T: FromStr>(
    column: &'static str,
    value: &str,
    expected: &'static str,
) -> Result<T, FieldError> {
    value.parse::<T>().map_err(|_| FieldError::InvalidNumber {
        column,
        value: value.to_string(),
        expected,
    })
}

/// Plain decimal notation only: an optional sign, digits and at most one point.
/// `Decimal::from_str` alone also takes `_` separators.
fn parse_decimal(column: &'static str, value: &str) -> Result<Decimal, FieldError> {
    let unsigned = value
        .strip_prefix('-')
        .or_else(|| value.strip_prefix('+'))
        .unwrap_or(value);
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let plain = !(whole.is_empty() && fraction.is_empty())
        && whole.bytes().all(|b| b.is_ascii_digit())
        && fraction.bytes().all(|b| b.is_ascii_digit());
    if !plain {
        return Err(FieldError::InvalidNumber {
            column,
            value: value.to_string(),
            expected: "decimal",
        });
    }
    parse_number(column, value, "decimal")
}

/// Re-encode a source row as one CSV line, quoting fields where needed
fn render_row(record: &ByteRecord) -> String {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let encoded = writer
        .write_byte_record(record)
        .ok()
        .and_then(|()| writer.into_inner().ok())
        .unwrap_or_default();
    String::from_utf8_lossy(&encoded)
        .trim_end_matches(|c: char| c == '\r' || c == '\n')
        .to_string()
}

/// Absent or empty counts default to zero
fn parse_passenger_count(value: Option<&str>) -> Result<u32, FieldError> {
    let column = columns::PASSENGER_COUNT;
    match value {
        None | Some("") => Ok(0),
        Some(raw) => {
            let count: i64 = parse_number(column, raw, "integer")?;
            if count < 0 {
                return Err(FieldError::Negative {
                    column,
                    value: raw.to_string(),
                });
            }
            u32::try_from(count).map_err(|_| FieldError::InvalidNumber {
                column,
                value: raw.to_string(),
                expected: "integer",
            })
        }
    }
}

fn parse_distance(value: &str) -> Result<f64, FieldError> {
    let column = columns::TRIP_DISTANCE;
    let distance: f64 = parse_number(column, value, "number")?;
    if !distance.is_finite() {
        return Err(FieldError::InvalidNumber {
            column,
            value: value.to_string(),
            expected: "number",
        });
    }
    if distance < 0.0 {
        return Err(FieldError::Negative {
            column,
            value: value.to_string(),
        });
    }
    Ok(distance)
}
