//! Database query functions organized by table.

pub mod archive;
pub mod backward;
pub mod foreign;
pub mod foreign_projects;
pub mod forward;
pub mod projects;

use crate::Result;

/// `IN` operand reading the id list bound at parameter `index`.
///
/// The list is bound as one JSON array (see [`id_list`]), so its length is
/// not limited by SQLite's bound-variable cap.
pub(crate) fn id_set(index: usize) -> String {
    format!("(SELECT value FROM json_each(?{index}))")
}

/// Encode ids as the single parameter read by [`id_set`].
pub(crate) fn id_list(ids: &[i64]) -> Result<String> {
    Ok(serde_json::to_string(ids)?)
}

/// Stored timestamps are `INTEGER` (i64); the workspace uses u64 seconds.
pub(crate) fn ts(value: i64) -> u64 {
    value.max(0) as u64
}
