//! Aggregate counts over the processing log and destination registry.

use serde::Serialize;

use super::record_repo::RecordStatus;
use super::{Database, DatabaseError};

/// Summary of the processing log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStats {
    pub total_records: u64,
    pub pending: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub active_destinations: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_processed_at: Option<String>,
}

/// Computes the current statistics snapshot.
pub fn summary(db: &Database) -> Result<ProcessingStats, DatabaseError> {
    db.with_conn(|conn| {
        let mut stats = ProcessingStats::default();

        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM processing_records
             WHERE deleted_at IS NULL GROUP BY status",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        for (status, count) in counts {
            stats.total_records += count;
            match status.parse::<RecordStatus>() {
                Ok(RecordStatus::Pending) => stats.pending += count,
                Ok(RecordStatus::Success) => stats.succeeded += count,
                Ok(RecordStatus::Failed) => stats.failed += count,
                Err(e) => log::warn!("Ignoring {} records: {}", count, e),
            }
        }

        stats.active_destinations = conn.query_row(
            "SELECT COUNT(*) FROM destinations WHERE is_active = 1 AND deleted_at IS NULL",
            [],
            |r| r.get(0),
        )?;

        stats.last_processed_at = conn.query_row(
            "SELECT MAX(processed_at) FROM processing_records WHERE deleted_at IS NULL",
            [],
            |r| r.get(0),
        )?;

        Ok(stats)
    })
}
