//! File pipeline gateway for the loader (EMBP pattern).
//!
//! Sibling modules hold the pure transformation stages (header
//! classification, cell normalization, wide-to-long unpivot); this gateway
//! owns the per-file state sequence and the multi-file loop:
//!
//! header → bases discovered → devices registered → sensors registered →
//! (chunk read → unpivot → upsert)* → done
//!
//! Memory is bounded by the chunk size, not the file size: rows stream
//! through in fixed-count chunks and nothing larger than one chunk's
//! fan-out is ever materialized.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use sqlx::PgPool;
use tracing::{error, info};

use crate::store;
use crate::{Config, HeaderLayout, Measurement, WideRow};

mod columns;
mod unpivot;
mod values;

/// Timestamp format used by the exports.
const TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

// ---

/// Process every file matching the configured glob, in sorted path order.
///
/// Files are isolated from each other: one file's failure is logged and the
/// remaining files still run. The call fails at the end if any file did,
/// so partial progress is kept but the process still exits nonzero.
pub async fn run(pool: &PgPool, cfg: &Config) -> Result<()> {
    // ---
    let files = matched_files(&cfg.csv_glob)?;
    info!("Found {} CSV files via: {}", files.len(), cfg.csv_glob);

    let mut failed = 0usize;
    for path in &files {
        if let Err(e) = process_file(pool, cfg, path).await {
            failed += 1;
            error!("Failed to process {}: {:#}", path.display(), e);
        }
    }

    if failed > 0 {
        bail!("{} of {} files failed", failed, files.len());
    }
    Ok(())
}

/// Expand the glob and sort the matches for a deterministic run order.
fn matched_files(pattern: &str) -> Result<Vec<PathBuf>> {
    // ---
    let mut files: Vec<PathBuf> = glob::glob(pattern)
        .with_context(|| format!("Invalid CSV glob: {pattern}"))?
        .filter_map(|entry| entry.ok())
        .collect();
    files.sort();

    if files.is_empty() {
        bail!("No CSV files matched: {pattern}");
    }
    Ok(files)
}

// ---

/// Load one wide CSV export end to end.
async fn process_file(pool: &PgPool, cfg: &Config, path: &Path) -> Result<()> {
    // ---
    info!("=== Processing: {} ===", path.display());

    let mut reader = csv_reader(path)?;
    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("{}: cannot read CSV header", path.display()))?
        .iter()
        .map(|c| c.to_string())
        .collect();
    let layout = columns::classify_header(path, &headers)?;

    // Pass 1: scan the whole file for devices, so a device first sighted
    // deep in the file is still registered before any measurement
    // references it.
    let devices = scan_devices(&mut reader, &layout)
        .with_context(|| format!("{}: device scan failed", path.display()))?;
    store::register_devices(pool, &devices).await?;

    store::register_sensors(pool, &layout.bases()).await?;
    let sensor_ids = store::load_sensor_map(pool).await?;

    // Pass 2: stream rows in bounded chunks through unpivot and upsert.
    let mut reader = csv_reader(path)?;
    let mut chunk: Vec<WideRow> = Vec::with_capacity(cfg.chunk_size);
    let mut rows_read = 0u64;
    let mut rows_skipped = 0u64;
    let mut total_upserted = 0u64;

    for result in reader.records() {
        let record = result.with_context(|| format!("{}: CSV read failed", path.display()))?;
        rows_read += 1;

        match parse_wide_row(&record, &layout) {
            Some(row) => chunk.push(row),
            None => rows_skipped += 1,
        }

        if chunk.len() == cfg.chunk_size {
            total_upserted += flush_chunk(pool, &chunk, &layout, &sensor_ids).await?;
            chunk.clear();
        }
    }
    total_upserted += flush_chunk(pool, &chunk, &layout, &sensor_ids).await?;

    info!(
        "{}: {} rows read, {} skipped, {} measurements upserted",
        path.display(),
        rows_read,
        rows_skipped,
        total_upserted
    );
    Ok(())
}

fn csv_reader(path: &Path) -> Result<csv::Reader<File>> {
    // ---
    csv::ReaderBuilder::new()
        .from_path(path)
        .with_context(|| format!("Cannot open {}", path.display()))
}

/// Parse the identity cells of one record.
///
/// Returns `None` when the time cell does not match the export format. The
/// timestamp is part of the row's identity, so the whole row is dropped,
/// not just one sensor's cells.
fn parse_wide_row(record: &csv::StringRecord, layout: &HeaderLayout) -> Option<WideRow> {
    // ---
    let device_id = record.get(layout.device_id_idx)?.to_string();
    let time = record.get(layout.time_idx)?;
    let timestamp = NaiveDateTime::parse_from_str(time.trim(), TIME_FORMAT).ok()?;

    Some(WideRow {
        device_id,
        timestamp,
        record: record.clone(),
    })
}

/// Stream the file once collecting one (id, name) pair per device, the
/// last-seen name winning. Memory is bounded by the distinct-device count
/// rather than the file length.
fn scan_devices<R: std::io::Read>(
    reader: &mut csv::Reader<R>,
    layout: &HeaderLayout,
) -> Result<Vec<(String, String)>> {
    // ---
    let mut devices: BTreeMap<String, String> = BTreeMap::new();
    for result in reader.records() {
        let record = result?;
        let Some(id) = record.get(layout.device_id_idx) else {
            continue;
        };
        let name = record.get(layout.device_name_idx).unwrap_or("");
        devices.insert(id.to_string(), name.to_string());
    }
    Ok(devices.into_iter().collect())
}

/// Unpivot one chunk and upsert the result. Returns the record count.
async fn flush_chunk(
    pool: &PgPool,
    chunk: &[WideRow],
    layout: &HeaderLayout,
    sensor_ids: &HashMap<String, i32>,
) -> Result<u64> {
    // ---
    let measurements: Vec<Measurement> = unpivot::unpivot_chunk(chunk, layout, sensor_ids).collect();
    store::bulk_upsert_measurements(pool, &measurements).await?;

    if !measurements.is_empty() {
        info!("  inserted/updated: {} measurements", measurements.len());
    }
    Ok(measurements.len() as u64)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::path::Path;

    fn reader_from(data: &str) -> csv::Reader<&[u8]> {
        // ---
        csv::ReaderBuilder::new().from_reader(data.as_bytes())
    }

    fn layout_for(data: &str) -> HeaderLayout {
        // ---
        let mut reader = reader_from(data);
        let headers: Vec<String> = reader.headers().unwrap().iter().map(|c| c.to_string()).collect();
        columns::classify_header(Path::new("test.csv"), &headers).unwrap()
    }

    #[test]
    fn device_scan_keeps_last_seen_name() {
        // ---
        let data = "device_id,device_name,time,temp_value\n\
                    d1,Old Name,2026/01/21 00:00:14,1\n\
                    d2,Dev Two,2026/01/21 00:00:15,2\n\
                    d1,New Name,2026/01/21 00:00:16,3\n";
        let layout = layout_for(data);

        let mut reader = reader_from(data);
        reader.headers().unwrap();
        let devices = scan_devices(&mut reader, &layout).unwrap();

        assert_eq!(
            devices,
            vec![
                ("d1".to_string(), "New Name".to_string()),
                ("d2".to_string(), "Dev Two".to_string()),
            ]
        );
    }

    #[test]
    fn bad_timestamps_drop_the_whole_row() {
        // ---
        let data = "device_id,device_name,time,temp_value,temp_status\n";
        let layout = layout_for(data);

        let good = csv::StringRecord::from(vec![
            "d1",
            "Dev One",
            "2026/01/21 00:00:14",
            "21.5",
            "OK",
        ]);
        let bad = csv::StringRecord::from(vec![
            "d1",
            "Dev One",
            "2026-01-21 00:00:14", // dash format is the output format, not the input one
            "21.5",
            "OK",
        ]);
        let garbage =
            csv::StringRecord::from(vec!["d1", "Dev One", "not a time", "21.5", "OK"]);

        assert!(parse_wide_row(&good, &layout).is_some());
        assert!(parse_wide_row(&bad, &layout).is_none());
        assert!(parse_wide_row(&garbage, &layout).is_none());
    }

    #[test]
    fn parsed_timestamps_render_in_storage_format() {
        // ---
        let data = "device_id,device_name,time,temp_value\n";
        let layout = layout_for(data);

        let record =
            csv::StringRecord::from(vec!["d1", "Dev One", "2026/01/21 00:00:14", "21.5"]);
        let row = parse_wide_row(&record, &layout).unwrap();
        assert_eq!(row.timestamp.to_string(), "2026-01-21 00:00:14");
    }
}
