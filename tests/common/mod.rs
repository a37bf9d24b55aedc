// tests/common/mod.rs
// Shared test utilities for integration tests
#![allow(dead_code)]

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Header of a yellow-cab export. Includes columns cabload ignores.
pub const HEADER: &str = "VendorID,tpep_pickup_datetime,tpep_dropoff_datetime,passenger_count,trip_distance,RatecodeID,store_and_fwd_flag,PULocationID,DOLocationID,payment_type,fare_amount,extra,tip_amount,total_amount";

/// One CSV row in `HEADER` order
pub fn trip_row(pickup: &str, dropoff: &str, passengers: &str, fare: &str) -> String {
    format!(
        "2,{},{},{},1.50,1,N,161,236,1,{},0.5,2.00,15.30",
        pickup, dropoff, passengers, fare
    )
}

/// Scratch directory holding an input file, plus paths for the database and
/// duplicates file next to it.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn write_input(&self, rows: &[String]) -> PathBuf {
        let mut content = String::from(HEADER);
        content.push('\n');
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        self.write_file("trips.csv", &content)
    }

    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).expect("Failed to write test file");
        path
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn database(&self) -> PathBuf {
        self.path("cabs.db")
    }

    pub fn duplicates(&self) -> PathBuf {
        self.path("duplicates.csv")
    }
}

/// Run the built cabload binary, ignoring any config files on the machine unless the
/// caller passes --config.
pub fn run_cabload(args: &[&str], cwd: &Path) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_cabload"))
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .expect("Failed to execute cabload");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

pub fn count_rows(database: &Path, table: &str) -> i64 {
    let conn = Connection::open(database).expect("Failed to open db");
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| {
        row.get(0)
    })
    .expect("Failed to count rows")
}

pub fn table_exists(database: &Path, table: &str) -> bool {
    let conn = Connection::open(database).expect("Failed to open db");
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get::<_, i64>(0),
    )
    .expect("Failed to query sqlite_master")
        > 0
}
