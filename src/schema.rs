//! Database schema management for `sensor-csv-loader`.
//!
//! Ensures required tables and indexes exist before the first load.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `devices` and `sensors` reference tables and the
/// `measurements` fact table keyed by (device, sensor, timestamp). Safe to
/// call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Reference table: one row per external device identifier. The display
    // name is refreshed on re-registration, so no NOT NULL on it.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            device_id   TEXT PRIMARY KEY,
            device_name TEXT
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Reference table: sensor names get a store-assigned surrogate id that
    // is stable for the lifetime of the dataset.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensors (
            sensor_id   SERIAL PRIMARY KEY,
            sensor_name TEXT   NOT NULL UNIQUE
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Fact table: the (device, sensor, timestamp) triple is the upsert key.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS measurements (
            id           BIGSERIAL PRIMARY KEY,
            device_id    TEXT      NOT NULL REFERENCES devices (device_id),
            sensor_id    INT       NOT NULL REFERENCES sensors (sensor_id),
            timestamp    TIMESTAMP NOT NULL,

            value_double DOUBLE PRECISION,
            value_text   VARCHAR(255),
            status       VARCHAR(50),

            UNIQUE (device_id, sensor_id, timestamp)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Basic indexes for common time-range queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_measurements_device_time
            ON measurements (device_id, timestamp);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_measurements_sensor_time
            ON measurements (sensor_id, timestamp);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
