//! Simple data models for the CSV loader pipeline.

use chrono::NaiveDateTime;

// ---

/// Column positions of one sensor's `<base>_value` / `<base>_status` pair
/// inside a wide CSV header.
///
/// Either half may be missing; a base discovered from only one of the two
/// columns treats the other as absent for every row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorColumns {
    // ---
    pub base: String,
    pub value_idx: Option<usize>,
    pub status_idx: Option<usize>,
}

/// Classified layout of a wide CSV header: the three identity columns plus
/// the discovered sensor descriptors, sorted by base name and deduplicated
/// so downstream registration and unpivot order is stable across runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLayout {
    // ---
    pub device_id_idx: usize,
    pub device_name_idx: usize,
    pub time_idx: usize,
    pub sensors: Vec<SensorColumns>,
}

impl HeaderLayout {
    /// Sensor base names in sorted order.
    pub fn bases(&self) -> Vec<String> {
        // ---
        self.sensors.iter().map(|s| s.base.clone()).collect()
    }
}

/// One wide row that survived timestamp parsing, pending unpivot.
#[derive(Debug, Clone)]
pub struct WideRow {
    // ---
    pub device_id: String,
    pub timestamp: NaiveDateTime,
    pub record: csv::StringRecord,
}

/// One long-format measurement, keyed by (device, sensor, timestamp).
///
/// At most one of `value_double` / `value_text` is set; `value_text` holds
/// unparseable source cells so sentinel strings survive the load.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    // ---
    pub device_id: String,
    pub sensor_id: i32,
    pub timestamp: NaiveDateTime,
    pub value_double: Option<f64>,
    pub value_text: Option<String>,
    pub status: Option<String>,
}
