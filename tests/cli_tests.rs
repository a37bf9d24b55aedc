mod common;
use common::*;

#[test]
fn test_load_with_stats_json() {
    let ws = Workspace::new();
    ws.write_input(&[
        trip_row("01/15/2023 02:30:00 AM", "01/15/2023 02:45:00 AM", "1", "12.50"),
        trip_row("01/15/2023 03:00:00 AM", "01/15/2023 03:20:00 AM", "2", "20.00"),
        trip_row("01/15/2023 02:30:00 AM", "01/15/2023 02:45:00 AM", "1", "12.50"),
    ]);

    let (_stdout, stderr, exit_code) = run_cabload(
        &[
            "trips.csv",
            "--database",
            "cabs.db",
            "--ignore-config",
            "--stats=json",
        ],
        ws.dir.path(),
    );
    assert_eq!(exit_code, 0, "stderr: {}", stderr);

    let json_line = stderr
        .lines()
        .find(|line| line.starts_with('{'))
        .expect("stats JSON on stderr");
    let stats: serde_json::Value = serde_json::from_str(json_line).unwrap();
    assert_eq!(stats["rows_read"], 3);
    assert_eq!(stats["unique_records"], 2);
    assert_eq!(stats["duplicates"], 1);
    assert_eq!(stats["rows_loaded"], 2);

    // Default duplicates path is relative to the working directory
    assert!(ws.path("duplicates.csv").exists());
    assert_eq!(count_rows(&ws.database(), "ProcessedCabData"), 2);
}

#[test]
fn test_bad_rows_are_logged_and_skipped() {
    let ws = Workspace::new();
    ws.write_input(&[
        trip_row("2023-01-15 02:30:00", "01/15/2023 02:45:00 AM", "1", "12.50"),
        trip_row("01/15/2023 03:00:00 AM", "01/15/2023 03:20:00 AM", "2", "20.00"),
    ]);

    let (_stdout, stderr, exit_code) = run_cabload(
        &["trips.csv", "--database", "cabs.db", "--ignore-config", "-s"],
        ws.dir.path(),
    );
    assert_eq!(exit_code, 0, "stderr: {}", stderr);
    assert!(stderr.contains("Skipping record due to error"));
    assert!(stderr.contains("tpep_pickup_datetime"));
    assert!(stderr.contains("1 skipped"));
    assert_eq!(count_rows(&ws.database(), "ProcessedCabData"), 1);
}

#[test]
fn test_missing_input_exits_with_error() {
    let ws = Workspace::new();
    let (_stdout, stderr, exit_code) =
        run_cabload(&["missing.csv", "--ignore-config"], ws.dir.path());
    assert_eq!(exit_code, 1);
    assert!(stderr.contains("cabload: Error: Failed to open input file"));
}

#[test]
fn test_zero_batch_size_is_invalid_usage() {
    let ws = Workspace::new();
    ws.write_input(&[]);
    let (_stdout, stderr, exit_code) = run_cabload(
        &["trips.csv", "--batch-size", "0", "--ignore-config"],
        ws.dir.path(),
    );
    assert_eq!(exit_code, 2);
    assert!(stderr.contains("Batch size must be at least 1"));
}

#[test]
fn test_unknown_flag_is_invalid_usage() {
    let ws = Workspace::new();
    let (_stdout, _stderr, exit_code) =
        run_cabload(&["trips.csv", "--frobnicate"], ws.dir.path());
    assert_eq!(exit_code, 2);
}

#[test]
fn test_project_config_sets_table() {
    let ws = Workspace::new();
    ws.write_input(&[trip_row(
        "01/15/2023 02:30:00 AM",
        "01/15/2023 02:45:00 AM",
        "1",
        "12.50",
    )]);
    ws.write_file(
        ".cabloadrc",
        "[destination]\ndatabase = cabs.db\ntable = FromConfig\n",
    );

    let (_stdout, stderr, exit_code) = run_cabload(&["trips.csv"], ws.dir.path());
    assert_eq!(exit_code, 0, "stderr: {}", stderr);
    assert!(table_exists(&ws.database(), "FromConfig"));
    assert!(!table_exists(&ws.database(), "ProcessedCabData"));
}

#[test]
fn test_cli_overrides_custom_config() {
    let ws = Workspace::new();
    ws.write_input(&[trip_row(
        "01/15/2023 02:30:00 AM",
        "01/15/2023 02:45:00 AM",
        "1",
        "12.50",
    )]);
    ws.write_file(
        "custom.ini",
        "[destination]\ndatabase = cabs.db\ntable = FromConfig\n",
    );

    let (_stdout, stderr, exit_code) = run_cabload(
        &["trips.csv", "--config", "custom.ini", "--table", "FromCli"],
        ws.dir.path(),
    );
    assert_eq!(exit_code, 0, "stderr: {}", stderr);
    assert!(table_exists(&ws.database(), "FromCli"));
}

#[test]
fn test_no_create_table_requires_existing_table() {
    let ws = Workspace::new();
    ws.write_input(&[trip_row(
        "01/15/2023 02:30:00 AM",
        "01/15/2023 02:45:00 AM",
        "1",
        "12.50",
    )]);

    let (_stdout, stderr, exit_code) = run_cabload(
        &[
            "trips.csv",
            "--database",
            "cabs.db",
            "--ignore-config",
            "--no-create-table",
        ],
        ws.dir.path(),
    );
    assert_eq!(exit_code, 1);
    assert!(stderr.contains("does not exist"));
}

#[test]
fn test_show_config_prints_effective_values() {
    let ws = Workspace::new();
    let (stdout, stderr, exit_code) = run_cabload(
        &["--show-config", "--ignore-config", "--batch-size", "250"],
        ws.dir.path(),
    );
    assert_eq!(exit_code, 0, "stderr: {}", stderr);
    assert!(stdout.contains("Effective configuration:"));
    assert!(stdout.contains("batch_size = 250"));
    assert!(stdout.contains("table = ProcessedCabData"));
}

#[test]
fn test_quiet_suppresses_row_warnings() {
    let ws = Workspace::new();
    ws.write_input(&[trip_row(
        "01/15/2023 02:30:00 AM",
        "01/15/2023 02:45:00 AM",
        "1",
        "not-money",
    )]);

    let (_stdout, stderr, exit_code) = run_cabload(
        &["trips.csv", "--database", "cabs.db", "--ignore-config", "-q"],
        ws.dir.path(),
    );
    assert_eq!(exit_code, 0);
    assert!(!stderr.contains("Skipping record"));
}
