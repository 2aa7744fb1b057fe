//! Wide-to-long fan-out of sensor rows.
//!
//! Each wide row yields at most one long record per discovered sensor base.
//! Records whose three payload fields are all absent are suppressed rather
//! than stored as null rows.

use std::collections::HashMap;

use crate::pipeline::values::{normalize_status, normalize_value};
use crate::{HeaderLayout, Measurement, WideRow};

// ---

/// Unpivot a chunk of wide rows into long measurement records, lazily.
///
/// Rows fan out in input order and bases in the layout's sorted order, so
/// the produced sequence is stable for a given input. Bases missing from
/// `sensor_ids` are skipped; registration runs before unpivoting, so the
/// skip should never fire, but an unregistered base must not panic the
/// chunk either.
pub fn unpivot_chunk<'a>(
    rows: &'a [WideRow],
    layout: &'a HeaderLayout,
    sensor_ids: &'a HashMap<String, i32>,
) -> impl Iterator<Item = Measurement> + 'a {
    // ---
    rows.iter().flat_map(move |row| {
        layout.sensors.iter().filter_map(move |sensor| {
            let sensor_id = *sensor_ids.get(&sensor.base)?;

            let raw_value = sensor
                .value_idx
                .and_then(|i| row.record.get(i))
                .unwrap_or("");
            let raw_status = sensor
                .status_idx
                .and_then(|i| row.record.get(i))
                .unwrap_or("");

            let (value_double, value_text) = normalize_value(raw_value);
            let status = normalize_status(raw_status);

            // Skip totally empty readings
            if value_double.is_none() && value_text.is_none() && status.is_none() {
                return None;
            }

            Some(Measurement {
                device_id: row.device_id.clone(),
                sensor_id,
                timestamp: row.timestamp,
                value_double,
                value_text,
                status,
            })
        })
    })
}
