//! Reference-table registration.
//!
//! Devices and sensors must exist before any measurement referencing them
//! is written. Sensor ids are assigned by the store, so sensor registration
//! is a write followed by a full re-read of the name-to-id map.

use std::collections::HashMap;

use anyhow::{Context, Result};
use sqlx::{PgPool, QueryBuilder};

use super::MAX_ROWS_PER_STATEMENT;

// ---

/// Upsert device rows, one pair per device id.
///
/// On conflict the display name is overwritten, so the last-seen name for a
/// device id wins across imports. No-op on empty input.
pub async fn register_devices(pool: &PgPool, pairs: &[(String, String)]) -> Result<()> {
    // ---
    if pairs.is_empty() {
        return Ok(());
    }

    for batch in pairs.chunks(MAX_ROWS_PER_STATEMENT) {
        let mut qb = QueryBuilder::new("INSERT INTO devices (device_id, device_name) ");
        qb.push_values(batch, |mut row, (id, name)| {
            row.push_bind(id).push_bind(name);
        });
        qb.push(" ON CONFLICT (device_id) DO UPDATE SET device_name = EXCLUDED.device_name");
        qb.build()
            .execute(pool)
            .await
            .context("device insert failed")?;
    }
    Ok(())
}

/// Insert sensor names that are not present yet.
///
/// Existing names are left untouched; sensors are never renamed or deleted
/// once created. No-op on empty input.
pub async fn register_sensors(pool: &PgPool, names: &[String]) -> Result<()> {
    // ---
    if names.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::new("INSERT INTO sensors (sensor_name) ");
    qb.push_values(names, |mut row, name| {
        row.push_bind(name);
    });
    qb.push(" ON CONFLICT (sensor_name) DO NOTHING");
    qb.build()
        .execute(pool)
        .await
        .context("sensor insert failed")?;
    Ok(())
}

/// Read back the full sensor name-to-id map.
///
/// Surrogate ids are assigned by the store and must be discovered, not
/// predicted, so this runs after every registration batch.
pub async fn load_sensor_map(pool: &PgPool) -> Result<HashMap<String, i32>> {
    // ---
    let rows: Vec<(i32, String)> = sqlx::query_as("SELECT sensor_id, sensor_name FROM sensors")
        .fetch_all(pool)
        .await
        .context("sensor map load failed")?;

    Ok(rows.into_iter().map(|(id, name)| (name, id)).collect())
}
