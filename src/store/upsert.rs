//! Batched measurement upsert.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::{PgPool, QueryBuilder};

use super::MAX_ROWS_PER_STATEMENT;
use crate::Measurement;

// ---

/// Upsert one chunk's measurements atomically.
///
/// New (device, sensor, timestamp) triples are inserted; existing triples
/// get exactly their value/text/status fields overwritten, never the key
/// fields. The batch is split into bind-limited statements inside a single
/// transaction, so the chunk either lands fully or not at all. No-op on
/// empty input.
pub async fn bulk_upsert_measurements(pool: &PgPool, rows: &[Measurement]) -> Result<()> {
    // ---
    if rows.is_empty() {
        return Ok(());
    }
    let rows = dedup_last(rows);

    let mut tx = pool.begin().await.context("measurement upsert failed")?;
    for batch in rows.chunks(MAX_ROWS_PER_STATEMENT) {
        let mut qb = QueryBuilder::new(
            "INSERT INTO measurements \
             (device_id, sensor_id, timestamp, value_double, value_text, status) ",
        );
        qb.push_values(batch, |mut row, m| {
            row.push_bind(&m.device_id)
                .push_bind(m.sensor_id)
                .push_bind(m.timestamp)
                .push_bind(m.value_double)
                .push_bind(&m.value_text)
                .push_bind(&m.status);
        });
        qb.push(
            " ON CONFLICT (device_id, sensor_id, timestamp) DO UPDATE SET \
             value_double = EXCLUDED.value_double, \
             value_text   = EXCLUDED.value_text, \
             status       = EXCLUDED.status",
        );
        qb.build()
            .execute(&mut *tx)
            .await
            .context("measurement upsert failed")?;
    }
    tx.commit().await.context("measurement upsert failed")?;
    Ok(())
}

/// Keep only the last occurrence of each (device, sensor, timestamp) key,
/// preserving input order otherwise.
///
/// A multi-row `ON CONFLICT DO UPDATE` statement cannot touch the same key
/// twice, and last-write-wins matches what replaying the rows one by one
/// would produce.
fn dedup_last(rows: &[Measurement]) -> Vec<&Measurement> {
    // ---
    let mut last: HashMap<(&str, i32, NaiveDateTime), usize> = HashMap::with_capacity(rows.len());
    for (i, m) in rows.iter().enumerate() {
        last.insert((m.device_id.as_str(), m.sensor_id, m.timestamp), i);
    }

    rows.iter()
        .enumerate()
        .filter(|(i, m)| last[&(m.device_id.as_str(), m.sensor_id, m.timestamp)] == *i)
        .map(|(_, m)| m)
        .collect()
}
