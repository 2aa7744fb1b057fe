//! Store access gateway for the loader (EMBP pattern).
//!
//! Internal to this module tree: the reference registrar and the bulk
//! upsert writer. Exports to the pipeline driver: the operation functions
//! below. Every operation scopes its own connection or transaction; nothing
//! is held open across chunk or file boundaries.

mod registrar;
mod upsert;

pub use registrar::{load_sensor_map, register_devices, register_sensors};
pub use upsert::bulk_upsert_measurements;

// ---

/// Rows per INSERT statement. Measurements bind six parameters per row;
/// 8000 rows stays well under PostgreSQL's 65535 bind-parameter cap.
const MAX_ROWS_PER_STATEMENT: usize = 8000;
