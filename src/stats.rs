use serde::Serialize;
use std::cell::RefCell;
use std::time::{Duration, Instant};

/// Counters collected during one pipeline run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub rows_read: u64,
    pub records_parsed: u64,
    pub rows_skipped: u64,
    pub unique_records: u64,
    pub duplicates: u64,
    pub rows_loaded: u64,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    #[serde(skip)]
    pub start_time: Option<Instant>,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

// The pipeline runs on a single thread, so counters live in thread-local storage
thread_local! {
    static THREAD_STATS: RefCell<RunStats> = RefCell::new(RunStats::default());
}

pub fn stats_reset() {
    THREAD_STATS.with(|stats| {
        *stats.borrow_mut() = RunStats::new();
    });
}

pub fn stats_add_row_read() {
    THREAD_STATS.with(|stats| {
        stats.borrow_mut().rows_read += 1;
    });
}

pub fn stats_add_record_parsed() {
    THREAD_STATS.with(|stats| {
        stats.borrow_mut().records_parsed += 1;
    });
}

pub fn stats_add_row_skipped() {
    THREAD_STATS.with(|stats| {
        stats.borrow_mut().rows_skipped += 1;
    });
}

pub fn stats_add_unique() {
    THREAD_STATS.with(|stats| {
        stats.borrow_mut().unique_records += 1;
    });
}

pub fn stats_add_duplicate() {
    THREAD_STATS.with(|stats| {
        stats.borrow_mut().duplicates += 1;
    });
}

pub fn stats_add_rows_loaded(count: u64) {
    THREAD_STATS.with(|stats| {
        stats.borrow_mut().rows_loaded += count;
    });
}

pub fn stats_finish() {
    THREAD_STATS.with(|stats| {
        let mut stats = stats.borrow_mut();
        if let Some(start) = stats.start_time {
            stats.elapsed = start.elapsed();
        }
    });
}

pub fn get_thread_stats() -> RunStats {
    THREAD_STATS.with(|stats| stats.borrow().clone())
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn format_stats(&self) -> String {
        let mut output = format!(
            "Rows processed: {} total, {} parsed, {} skipped; Records: {} unique, {} duplicates, {} loaded",
            self.rows_read,
            self.records_parsed,
            self.rows_skipped,
            self.unique_records,
            self.duplicates,
            self.rows_loaded
        );

        let elapsed_ms = self.elapsed.as_millis();
        output.push_str(&format!(" in {}ms", elapsed_ms));

        if elapsed_ms > 0 && self.rows_read > 0 {
            let rows_per_sec = (self.rows_read as f64 * 1000.0) / elapsed_ms as f64;
            output.push_str(&format!(" ({:.0} rows/s)", rows_per_sec));
        }

        output
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
