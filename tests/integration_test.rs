//! End-to-end tests against a live PostgreSQL instance.
//!
//! Each test runs the compiled loader binary against scratch CSV fixtures
//! and inspects the resulting tables. They need `DATABASE_URL` pointing at
//! a disposable database, so they are ignored by default:
//!
//! ```text
//! DATABASE_URL=postgres://... cargo test -- --ignored
//! ```

use anyhow::Result;
use chrono::NaiveDateTime;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::process::Command;

type MeasurementRow = (
    String,
    i32,
    NaiveDateTime,
    Option<f64>,
    Option<String>,
    Option<String>,
);

// ---

fn db_url() -> String {
    // ---
    std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a disposable test database")
}

async fn fresh_pool(url: &str) -> Result<PgPool> {
    // ---
    let pool = PgPoolOptions::new().max_connections(2).connect(url).await?;
    sqlx::query("DROP TABLE IF EXISTS measurements, sensors, devices CASCADE")
        .execute(&pool)
        .await?;
    Ok(pool)
}

fn run_loader(data_dir: &Path, url: &str, chunk_size: &str) -> Result<()> {
    // ---
    let status = Command::new(env!("CARGO_BIN_EXE_sensor-csv-loader"))
        .env("DATABASE_URL", url)
        .env("CSV_GLOB", format!("{}/*.csv", data_dir.display()))
        .env("CHUNK_SIZE", chunk_size)
        .status()?;
    anyhow::ensure!(status.success(), "loader exited with {status}");
    Ok(())
}

fn ts(s: &str) -> NaiveDateTime {
    // ---
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

async fn measurement_rows(pool: &PgPool) -> Result<Vec<MeasurementRow>> {
    // ---
    let rows: Vec<MeasurementRow> = sqlx::query_as(
        "SELECT device_id, sensor_id, timestamp, value_double, value_text, status \
         FROM measurements ORDER BY device_id, sensor_id, timestamp",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ---

const SCENARIO_CSV: &str = "device_id,device_name,time,temp_value,temp_status\n\
d1,Dev One,2026/01/21 00:00:14,21.5,OK\n\
d1,Dev One,2026/01/21 00:01:14,bad,ERR\n";

#[tokio::test]
#[ignore = "requires a live PostgreSQL via DATABASE_URL"]
async fn load_is_idempotent_and_refreshes_payload_fields() -> Result<()> {
    // ---
    let url = db_url();
    let pool = fresh_pool(&url).await?;

    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("export.csv"), SCENARIO_CSV)?;
    run_loader(dir.path(), &url, "5000")?;

    // Reference tables
    let devices: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT device_id, device_name FROM devices ORDER BY device_id")
            .fetch_all(&pool)
            .await?;
    assert_eq!(devices, vec![("d1".to_string(), Some("Dev One".to_string()))]);

    let sensors: Vec<(i32, String)> =
        sqlx::query_as("SELECT sensor_id, sensor_name FROM sensors ORDER BY sensor_id")
            .fetch_all(&pool)
            .await?;
    assert_eq!(sensors.len(), 1);
    assert_eq!(sensors[0].1, "temp");
    let temp_id = sensors[0].0;

    // Fact table: numeric row and text-fallback row
    let rows = measurement_rows(&pool).await?;
    assert_eq!(
        rows,
        vec![
            (
                "d1".to_string(),
                temp_id,
                ts("2026-01-21 00:00:14"),
                Some(21.5),
                None,
                Some("OK".to_string()),
            ),
            (
                "d1".to_string(),
                temp_id,
                ts("2026-01-21 00:01:14"),
                None,
                Some("bad".to_string()),
                Some("ERR".to_string()),
            ),
        ]
    );

    // Re-import: same file again must not duplicate or corrupt anything
    run_loader(dir.path(), &url, "5000")?;
    assert_eq!(measurement_rows(&pool).await?, rows);

    // Changed payload for one key updates that row only
    std::fs::write(
        dir.path().join("export.csv"),
        SCENARIO_CSV.replace(",OK\n", ",WARN\n"),
    )?;
    run_loader(dir.path(), &url, "5000")?;

    let rows = measurement_rows(&pool).await?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].3, Some(21.5));
    assert_eq!(rows[0].5, Some("WARN".to_string()));
    assert_eq!(rows[1].4, Some("bad".to_string()));
    assert_eq!(rows[1].5, Some("ERR".to_string()));

    Ok(())
}

#[tokio::test]
#[ignore = "requires a live PostgreSQL via DATABASE_URL"]
async fn chunked_load_handles_skips_and_late_devices() -> Result<()> {
    // ---
    let url = db_url();
    let pool = fresh_pool(&url).await?;

    // Mixed file: a fully-empty reading, a broken timestamp, and a device
    // that first appears in the last row. Chunk size 2 forces several
    // chunks per file.
    let csv = "device_id,device_name,time,temp_value,temp_status,flow_value\n\
d1,Dev One,2026/01/21 00:00:14,21.5,OK,1.0\n\
d1,Dev One,2026/01/21 00:01:14,,,\n\
d1,Dev One,garbage,22.0,OK,2.0\n\
d1,Dev Renamed,2026/01/21 00:03:14,22.5,,\n\
d9,Late Device,2026/01/21 00:04:14,,WARM,\n";

    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("export.csv"), csv)?;
    run_loader(dir.path(), &url, "2")?;

    // Full-file device scan registers the late device and keeps the
    // last-seen display name
    let devices: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT device_id, device_name FROM devices ORDER BY device_id")
            .fetch_all(&pool)
            .await?;
    assert_eq!(
        devices,
        vec![
            ("d1".to_string(), Some("Dev Renamed".to_string())),
            ("d9".to_string(), Some("Late Device".to_string())),
        ]
    );

    // Row 2 is fully empty, row 3 has a broken timestamp: neither may
    // contribute records. Remaining rows fan out per non-empty base.
    let rows = measurement_rows(&pool).await?;
    assert_eq!(rows.len(), 4);

    let empty_ts = ts("2026-01-21 00:01:14");
    assert!(rows.iter().all(|r| r.2 != empty_ts));

    // Every measurement's (device, sensor) pair resolves in the reference
    // tables (the FKs enforce it; the join double-checks the data landed)
    let (orphans,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM measurements m \
         LEFT JOIN devices d ON d.device_id = m.device_id \
         LEFT JOIN sensors s ON s.sensor_id = m.sensor_id \
         WHERE d.device_id IS NULL OR s.sensor_id IS NULL",
    )
    .fetch_one(&pool)
    .await?;
    assert_eq!(orphans, 0);

    Ok(())
}
