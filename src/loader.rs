use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::{ToSql, ToSqlOutput, Value};
use rusqlite::{params_from_iter, Connection, Transaction};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::record::{columns, Record};
use crate::stats::stats_add_rows_loaded;

/// Default destination table
pub const DEFAULT_TABLE: &str = "ProcessedCabData";

/// Default destination database file
pub const DEFAULT_DATABASE_PATH: &str = "cab-data.db";

/// Format used for timestamp columns in the destination
pub const DESTINATION_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Record field that feeds a destination column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceField {
    PickupTime,
    DropoffTime,
    PassengerCount,
    TripDistance,
    StoreAndFwdFlag,
    PickupLocationId,
    DropoffLocationId,
    FareAmount,
    TipAmount,
}

impl SourceField {
    pub const ALL: [SourceField; 9] = [
        SourceField::PickupTime,
        SourceField::DropoffTime,
        SourceField::PassengerCount,
        SourceField::TripDistance,
        SourceField::StoreAndFwdFlag,
        SourceField::PickupLocationId,
        SourceField::DropoffLocationId,
        SourceField::FareAmount,
        SourceField::TipAmount,
    ];

    /// Source column this field is read from
    pub fn column_name(self) -> &'static str {
        match self {
            SourceField::PickupTime => columns::PICKUP_DATETIME,
            SourceField::DropoffTime => columns::DROPOFF_DATETIME,
            SourceField::PassengerCount => columns::PASSENGER_COUNT,
            SourceField::TripDistance => columns::TRIP_DISTANCE,
            SourceField::StoreAndFwdFlag => columns::STORE_AND_FWD_FLAG,
            SourceField::PickupLocationId => columns::PU_LOCATION_ID,
            SourceField::DropoffLocationId => columns::DO_LOCATION_ID,
            SourceField::FareAmount => columns::FARE_AMOUNT,
            SourceField::TipAmount => columns::TIP_AMOUNT,
        }
    }

    pub fn value(self, record: &Record) -> CellValue {
        match self {
            SourceField::PickupTime => CellValue::Timestamp(record.pickup_time),
            SourceField::DropoffTime => CellValue::Timestamp(record.dropoff_time),
            SourceField::PassengerCount => CellValue::Integer(i64::from(record.passenger_count)),
            SourceField::TripDistance => CellValue::Real(record.trip_distance),
            SourceField::StoreAndFwdFlag => {
                CellValue::Text(record.store_and_fwd_flag.as_str().to_string())
            }
            SourceField::PickupLocationId => {
                CellValue::Integer(i64::from(record.pickup_location_id))
            }
            SourceField::DropoffLocationId => {
                CellValue::Integer(i64::from(record.dropoff_location_id))
            }
            SourceField::FareAmount => CellValue::Decimal(record.fare_amount),
            SourceField::TipAmount => CellValue::Decimal(record.tip_amount),
        }
    }

    /// SQLite column type. Decimals and timestamps are kept as text so values survive
    /// exactly; a NUMERIC affinity would coerce `12.50` into a float.
    fn sqlite_type(self) -> &'static str {
        match self {
            SourceField::PassengerCount
            | SourceField::PickupLocationId
            | SourceField::DropoffLocationId => "INTEGER",
            SourceField::TripDistance => "REAL",
            _ => "TEXT",
        }
    }
}

/// One destination cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Timestamp(DateTime<Utc>),
    Integer(i64),
    Real(f64),
    Text(String),
    Decimal(Decimal),
}

impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            CellValue::Timestamp(dt) => {
                Value::Text(dt.format(DESTINATION_TIMESTAMP_FORMAT).to_string())
            }
            CellValue::Integer(n) => Value::Integer(*n),
            CellValue::Real(x) => Value::Real(*x),
            CellValue::Text(s) => return Ok(ToSqlOutput::from(s.as_str())),
            CellValue::Decimal(d) => Value::Text(d.to_string()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub source: SourceField,
    pub destination: String,
}

impl ColumnMapping {
    pub fn new(source: SourceField, destination: impl Into<String>) -> Self {
        Self {
            source,
            destination: destination.into(),
        }
    }
}

/// Destination table plus a name-based mapping for every record field.
///
/// Columns are matched by name, never by position, so the destination table may
/// declare them in any order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMapping {
    table: String,
    columns: Vec<ColumnMapping>,
}

impl TableMapping {
    /// Validates that every record field is mapped exactly once to a distinct,
    /// non-empty destination column.
    pub fn new(table: impl Into<String>, columns: Vec<ColumnMapping>) -> Result<Self> {
        let table = table.into();
        if table.trim().is_empty() {
            bail!("Destination table name cannot be empty");
        }

        let mut sources = HashSet::new();
        let mut destinations = HashSet::new();
        for mapping in &columns {
            if mapping.destination.trim().is_empty() {
                bail!(
                    "Destination column for '{}' cannot be empty",
                    mapping.source.column_name()
                );
            }
            if !sources.insert(mapping.source) {
                bail!(
                    "Source column '{}' is mapped more than once",
                    mapping.source.column_name()
                );
            }
            // SQLite identifiers are case-insensitive
            if !destinations.insert(mapping.destination.to_lowercase()) {
                bail!(
                    "Destination column '{}' is mapped more than once",
                    mapping.destination
                );
            }
        }

        if let Some(missing) = SourceField::ALL.iter().find(|f| !sources.contains(*f)) {
            bail!(
                "Source column '{}' has no destination mapping",
                missing.column_name()
            );
        }

        Ok(Self { table, columns })
    }

    /// The nine record fields mapped to identically named columns of `table`
    pub fn cab_data(table: &str) -> Result<Self> {
        let columns = SourceField::ALL
            .iter()
            .map(|&field| ColumnMapping::new(field, field.column_name()))
            .collect();
        Self::new(table, columns)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnMapping] {
        &self.columns
    }

    /// Cell values for one record, in mapping order
    pub fn row(&self, record: &Record) -> Vec<CellValue> {
        self.columns
            .iter()
            .map(|mapping| mapping.source.value(record))
            .collect()
    }
}

/// An open bulk-insert session.
///
/// Rows written to a session become visible only after `commit`. Dropping a session
/// without committing discards everything written to it, including a destination
/// table created when the session began.
pub trait BulkSession {
    /// Stage a batch of rows, returning how many were written
    fn write_batch(&mut self, records: &[Record]) -> Result<u64>;

    fn commit(self: Box<Self>) -> Result<()>;
}

/// Somewhere records can be bulk-loaded into
pub trait Destination {
    fn begin_bulk<'a>(&'a mut self, mapping: &TableMapping)
        -> Result<Box<dyn BulkSession + 'a>>;
}

/// Streams records into a destination in fixed-size batches inside one session.
///
/// The whole load is atomic: either every record is committed or, on any upstream or
/// write failure, none are.
pub struct BulkLoader {
    mapping: TableMapping,
    batch_size: usize,
}

impl BulkLoader {
    pub fn new(mapping: TableMapping, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            bail!("Batch size must be at least 1");
        }
        Ok(Self {
            mapping,
            batch_size,
        })
    }

    pub fn load<D, I>(&self, destination: &mut D, records: I) -> Result<u64>
    where
        D: Destination + ?Sized,
        I: IntoIterator<Item = Result<Record>>,
    {
        let mut session = destination.begin_bulk(&self.mapping)?;
        let mut staged = Vec::with_capacity(self.batch_size);
        let mut written = 0u64;

        for item in records {
            staged.push(item?);
            if staged.len() == self.batch_size {
                written += self.flush(session.as_mut(), &mut staged)?;
            }
        }
        if !staged.is_empty() {
            written += self.flush(session.as_mut(), &mut staged)?;
        }

        session
            .commit()
            .with_context(|| format!("Failed to commit bulk load into {}", self.mapping.table()))?;
        stats_add_rows_loaded(written);
        log::info!(
            "Loaded {} records into {}",
            written,
            self.mapping.table()
        );
        Ok(written)
    }

    fn flush(&self, session: &mut dyn BulkSession, staged: &mut Vec<Record>) -> Result<u64> {
        let count = session
            .write_batch(staged)
            .with_context(|| format!("Bulk insert into {} failed", self.mapping.table()))?;
        log::debug!("Wrote batch of {} records", count);
        staged.clear();
        Ok(count)
    }
}

/// SQLite bulk destination
pub struct SqliteDestination {
    conn: Connection,
    create_table: bool,
}

impl SqliteDestination {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(10))
            .context("Failed to set busy timeout")?;
        Ok(Self {
            conn,
            create_table: true,
        })
    }

    /// Whether `begin_bulk` creates the destination table when it is missing
    pub fn with_create_table(mut self, create_table: bool) -> Self {
        self.create_table = create_table;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn create_table(conn: &Connection, mapping: &TableMapping) -> Result<()> {
    let column_defs: Vec<String> = mapping
        .columns()
        .iter()
        .map(|c| {
            format!(
                "{} {} NOT NULL",
                quote_identifier(&c.destination),
                c.source.sqlite_type()
            )
        })
        .collect();
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_identifier(mapping.table()),
        column_defs.join(", ")
    );
    conn.execute_batch(&sql)
        .with_context(|| format!("Failed to create table {}", mapping.table()))
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

impl Destination for SqliteDestination {
    fn begin_bulk<'a>(
        &'a mut self,
        mapping: &TableMapping,
    ) -> Result<Box<dyn BulkSession + 'a>> {
        let create = self.create_table;
        let tx = self
            .conn
            .transaction()
            .context("Failed to start bulk load transaction")?;

        // DDL is transactional in SQLite, so a rolled-back load leaves no new table
        if create {
            create_table(&tx, mapping)?;
        } else if !table_exists(&tx, mapping.table())? {
            return Err(anyhow!(
                "Destination table {} does not exist",
                mapping.table()
            ));
        }

        let insert_sql = insert_statement(mapping);
        // Surface unknown columns before any rows are staged
        tx.prepare_cached(&insert_sql)
            .with_context(|| format!("Destination table {} does not match the column mapping", mapping.table()))?;

        Ok(Box::new(SqliteSession {
            tx,
            insert_sql,
            mapping: mapping.clone(),
        }))
    }
}

struct SqliteSession<'c> {
    tx: Transaction<'c>,
    insert_sql: String,
    mapping: TableMapping,
}

impl BulkSession for SqliteSession<'_> {
    fn write_batch(&mut self, records: &[Record]) -> Result<u64> {
        let mut stmt = self.tx.prepare_cached(&self.insert_sql)?;
        for record in records {
            stmt.execute(params_from_iter(self.mapping.row(record)))?;
        }
        Ok(records.len() as u64)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}

fn insert_statement(mapping: &TableMapping) -> String {
    let names: Vec<String> = mapping
        .columns()
        .iter()
        .map(|c| quote_identifier(&c.destination))
        .collect();
    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(mapping.table()),
        names.join(", "),
        placeholders.join(", ")
    )
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StoreAndFwdFlag;
    use chrono::TimeZone;
    use std::str::FromStr;
    use tempfile::tempdir;

    fn trip(minute: u32, fare: &str) -> Record {
        Record {
            pickup_time: Utc.with_ymd_and_hms(2023, 1, 15, 7, minute, 0).unwrap(),
            dropoff_time: Utc.with_ymd_and_hms(2023, 1, 15, 7, minute + 15, 0).unwrap(),
            passenger_count: 1,
            trip_distance: 2.5,
            store_and_fwd_flag: StoreAndFwdFlag::No,
            pickup_location_id: 100,
            dropoff_location_id: 200,
            fare_amount: Decimal::from_str(fare).unwrap(),
            tip_amount: Decimal::from_str("2.00").unwrap(),
        }
    }

    fn loader(batch_size: usize) -> BulkLoader {
        BulkLoader::new(TableMapping::cab_data(DEFAULT_TABLE).unwrap(), batch_size).unwrap()
    }

    fn row_count(dest: &SqliteDestination) -> i64 {
        dest.connection()
            .query_row("SELECT COUNT(*) FROM ProcessedCabData", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_default_mapping_covers_all_columns_by_name() {
        let mapping = TableMapping::cab_data(DEFAULT_TABLE).unwrap();
        let names: Vec<&str> = mapping
            .columns()
            .iter()
            .map(|c| c.destination.as_str())
            .collect();
        assert_eq!(names, columns::ALL.to_vec());
    }

    #[test]
    fn test_mapping_rejects_incomplete_or_repeated_columns() {
        let mut columns: Vec<ColumnMapping> = SourceField::ALL
            .iter()
            .map(|&f| ColumnMapping::new(f, f.column_name()))
            .collect();
        columns.pop();
        let err = TableMapping::new("t", columns.clone()).unwrap_err();
        assert!(err.to_string().contains("tip_amount"));

        columns.push(ColumnMapping::new(SourceField::TipAmount, "fare_amount"));
        let err = TableMapping::new("t", columns).unwrap_err();
        assert!(err.to_string().contains("mapped more than once"));

        assert!(TableMapping::cab_data(" ").is_err());
    }

    #[test]
    fn test_load_writes_typed_values() {
        let mut dest = SqliteDestination::in_memory().unwrap();
        let loaded = loader(10)
            .load(&mut dest, vec![Ok(trip(30, "12.50"))])
            .unwrap();
        assert_eq!(loaded, 1);

        let (pickup, fare, flag, distance, passengers): (String, String, String, f64, i64) = dest
            .connection()
            .query_row(
                "SELECT tpep_pickup_datetime, fare_amount, store_and_fwd_flag, trip_distance, passenger_count FROM ProcessedCabData",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .unwrap();
        assert_eq!(pickup, "2023-01-15 07:30:00");
        assert_eq!(fare, "12.50");
        assert_eq!(flag, "No");
        assert_eq!(distance, 2.5);
        assert_eq!(passengers, 1);
    }

    #[test]
    fn test_columns_are_matched_by_name_not_position() {
        let mut dest = SqliteDestination::in_memory().unwrap().with_create_table(false);
        // Reversed column order relative to the record
        dest.connection()
            .execute_batch(
                "CREATE TABLE ProcessedCabData (
                    tip_amount TEXT, fare_amount TEXT, DOLocationID INTEGER, PULocationID INTEGER,
                    store_and_fwd_flag TEXT, trip_distance REAL, passenger_count INTEGER,
                    tpep_dropoff_datetime TEXT, tpep_pickup_datetime TEXT)",
            )
            .unwrap();

        loader(10).load(&mut dest, vec![Ok(trip(0, "9.75"))]).unwrap();

        let (tip, fare, pu): (String, String, i64) = dest
            .connection()
            .query_row(
                "SELECT tip_amount, fare_amount, PULocationID FROM ProcessedCabData",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(tip, "2.00");
        assert_eq!(fare, "9.75");
        assert_eq!(pu, 100);
    }

    #[test]
    fn test_load_spans_multiple_batches_in_one_commit() {
        let mut dest = SqliteDestination::in_memory().unwrap();
        let records: Vec<Result<Record>> = (0..7).map(|m| Ok(trip(m, "1.00"))).collect();
        let loaded = loader(3).load(&mut dest, records).unwrap();
        assert_eq!(loaded, 7);
        assert_eq!(row_count(&dest), 7);
    }

    #[test]
    fn test_upstream_error_rolls_back_everything() {
        let mut dest = SqliteDestination::in_memory().unwrap();
        let records = vec![
            Ok(trip(0, "1.00")),
            Ok(trip(1, "1.00")),
            Ok(trip(2, "1.00")),
            Err(anyhow!("input vanished")),
        ];
        let err = loader(2).load(&mut dest, records).unwrap_err();
        assert_eq!(err.to_string(), "input vanished");
        // The table was created inside the rolled-back session
        assert!(!table_exists(dest.connection(), DEFAULT_TABLE).unwrap());

        dest.connection()
            .execute_batch(
                "CREATE TABLE ProcessedCabData (
                    tpep_pickup_datetime TEXT, tpep_dropoff_datetime TEXT, passenger_count INTEGER,
                    trip_distance REAL, store_and_fwd_flag TEXT, PULocationID INTEGER,
                    DOLocationID INTEGER, fare_amount TEXT, tip_amount TEXT)",
            )
            .unwrap();
        let records = vec![Ok(trip(0, "1.00")), Err(anyhow!("input vanished"))];
        assert!(loader(1).load(&mut dest, records).is_err());
        assert_eq!(row_count(&dest), 0);
    }

    #[test]
    fn test_missing_table_without_create_is_an_error() {
        let mut dest = SqliteDestination::in_memory().unwrap().with_create_table(false);
        let err = loader(10)
            .load(&mut dest, vec![Ok(trip(0, "1.00"))])
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_table_missing_a_mapped_column_fails_before_writing() {
        let mut dest = SqliteDestination::in_memory().unwrap().with_create_table(false);
        dest.connection()
            .execute_batch("CREATE TABLE ProcessedCabData (tpep_pickup_datetime TEXT)")
            .unwrap();
        let err = loader(10)
            .load(&mut dest, vec![Ok(trip(0, "1.00"))])
            .unwrap_err();
        assert!(err.to_string().contains("does not match the column mapping"));
    }

    #[test]
    fn test_empty_input_commits_nothing() {
        let mut dest = SqliteDestination::in_memory().unwrap();
        assert_eq!(loader(10).load(&mut dest, Vec::new()).unwrap(), 0);
        assert_eq!(row_count(&dest), 0);
    }

    #[test]
    fn test_rows_persist_after_connection_closes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cabs.db");
        {
            let mut dest = SqliteDestination::open(&path).unwrap();
            loader(10)
                .load(&mut dest, vec![Ok(trip(0, "1.00")), Ok(trip(1, "2.00"))])
                .unwrap();
        }
        let dest = SqliteDestination::open(&path).unwrap();
        assert_eq!(row_count(&dest), 2);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mapping = TableMapping::cab_data(DEFAULT_TABLE).unwrap();
        assert!(BulkLoader::new(mapping, 0).is_err());
    }

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
