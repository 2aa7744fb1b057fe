//! Header classification for wide sensor CSV exports.
//!
//! A wide export carries three identity columns (`device_id`, `device_name`,
//! `time`) plus one `<base>_value` / `<base>_status` column pair per sensor
//! channel. This module pins down the identity column positions and
//! discovers the sensor bases; the rest of the pipeline reads cells by the
//! positions recorded here.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Result};

use crate::{HeaderLayout, SensorColumns};

const VALUE_SUFFIX: &str = "_value";
const STATUS_SUFFIX: &str = "_status";

// ---

/// Classify a header into identity columns and sorted sensor descriptors.
///
/// Columns matching neither suffix are ignored for base discovery. A base
/// seen with only one of its two columns is still valid; the missing half
/// reads as absent for every row. Fails if any of the three identity
/// columns is missing, naming the file and the absent columns.
pub fn classify_header(path: &Path, columns: &[String]) -> Result<HeaderLayout> {
    // ---
    let find = |name: &str| columns.iter().position(|c| c == name);

    let device_id = find("device_id");
    let device_name = find("device_name");
    let time = find("time");

    let (Some(device_id_idx), Some(device_name_idx), Some(time_idx)) =
        (device_id, device_name, time)
    else {
        let missing: Vec<&str> = [
            ("device_id", device_id),
            ("device_name", device_name),
            ("time", time),
        ]
        .iter()
        .filter(|(_, idx)| idx.is_none())
        .map(|(name, _)| *name)
        .collect();
        bail!(
            "{} missing required columns: {}",
            path.display(),
            missing.join(", ")
        );
    };

    // BTreeMap keeps bases sorted, so registration order is stable across
    // runs regardless of column order in the file.
    let mut sensors: BTreeMap<String, SensorColumns> = BTreeMap::new();
    for (idx, column) in columns.iter().enumerate() {
        let (base, is_status) = if let Some(base) = column.strip_suffix(STATUS_SUFFIX) {
            (base, true)
        } else if let Some(base) = column.strip_suffix(VALUE_SUFFIX) {
            (base, false)
        } else {
            continue;
        };

        let slot = sensors
            .entry(base.to_string())
            .or_insert_with(|| SensorColumns {
                base: base.to_string(),
                value_idx: None,
                status_idx: None,
            });
        if is_status {
            slot.status_idx = Some(idx);
        } else {
            slot.value_idx = Some(idx);
        }
    }

    Ok(HeaderLayout {
        device_id_idx,
        device_name_idx,
        time_idx,
        sensors: sensors.into_values().collect(),
    })
}
