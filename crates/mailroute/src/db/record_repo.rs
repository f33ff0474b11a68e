//! Processing record repository, the audit log in `processing_records`.
//!
//! `provider_message_id` carries a UNIQUE index, so a second insert for the
//! same message is rejected with [`DatabaseError::Duplicate`].

use std::fmt;
use std::str::FromStr;

use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};

use super::{Database, DatabaseError};

/// Outcome status of a processed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Success,
    Failed,
}

impl RecordStatus {
    pub const ALL: [RecordStatus; 3] = [
        RecordStatus::Pending,
        RecordStatus::Success,
        RecordStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Success => "success",
            RecordStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecordStatus::Pending),
            "success" => Ok(RecordStatus::Success),
            "failed" => Ok(RecordStatus::Failed),
            other => Err(format!("unknown record status '{}'", other)),
        }
    }
}

/// One message's routing outcome.
///
/// Destination name and email are snapshots taken at processing time, not
/// references, so later edits to the destination do not rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingRecord {
    pub id: String,
    pub provider_message_id: String,
    pub subject: String,
    pub from_email: String,
    pub to_email: String,
    pub content: String,
    pub keyword: Option<String>,
    pub destination_name: Option<String>,
    pub destination_email: Option<String>,
    pub status: RecordStatus,
    pub error: Option<String>,
    pub processed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip)]
    pub deleted_at: Option<String>,
}

impl ProcessingRecord {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let status: String = row.get("status")?;
        let status = status.parse::<RecordStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;

        Ok(Self {
            id: row.get("id")?,
            provider_message_id: row.get("provider_message_id")?,
            subject: row.get("subject")?,
            from_email: row.get("from_email")?,
            to_email: row.get("to_email")?,
            content: row.get("content")?,
            keyword: row.get("keyword")?,
            destination_name: row.get("destination_name")?,
            destination_email: row.get("destination_email")?,
            status,
            error: row.get("error")?,
            processed_at: row.get("processed_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            deleted_at: row.get("deleted_at")?,
        })
    }
}

/// Query filter parameters for record listing.
#[derive(Debug, Default, Clone)]
pub struct RecordFilter {
    pub status: Option<RecordStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new record. Fails with [`DatabaseError::Duplicate`] when a
/// record for the same provider message id already exists.
pub fn insert(db: &Database, record: &ProcessingRecord) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO processing_records (id, provider_message_id, subject, from_email, to_email,
             content, keyword, destination_name, destination_email, status, error, processed_at,
             created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                record.id,
                record.provider_message_id,
                record.subject,
                record.from_email,
                record.to_email,
                record.content,
                record.keyword,
                record.destination_name,
                record.destination_email,
                record.status.as_str(),
                record.error,
                record.processed_at,
                record.created_at,
                record.updated_at,
                record.deleted_at,
            ],
        )
        .map_err(|e| {
            DatabaseError::from_insert(e, "processing_records", &record.provider_message_id)
        })?;
        Ok(())
    })
}

/// Finds the record for a provider message id, if one exists.
pub fn find_by_provider_id(
    db: &Database,
    provider_message_id: &str,
) -> Result<Option<ProcessingRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM processing_records
             WHERE provider_message_id = ?1 AND deleted_at IS NULL LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![provider_message_id], ProcessingRecord::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Queries records newest first, returning (rows, total_count).
pub fn query(
    db: &Database,
    filter: &RecordFilter,
) -> Result<(Vec<ProcessingRecord>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = vec!["deleted_at IS NULL".to_string()];
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push(format!("status = ?{}", param_values.len() + 1));
            param_values.push(Box::new(status.as_str()));
        }

        let where_clause = format!("WHERE {}", conditions.join(" AND "));

        let count_sql = format!("SELECT COUNT(*) FROM processing_records {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        param_values.push(Box::new(limit));
        param_values.push(Box::new(offset));
        let query_sql = format!(
            "SELECT * FROM processing_records {} ORDER BY created_at DESC, id DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<ProcessingRecord> = stmt
            .query_map(params_ref.as_slice(), ProcessingRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}
