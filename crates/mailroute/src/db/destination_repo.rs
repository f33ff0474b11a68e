//! Destination repository: CRUD operations for the `destinations` table.
//!
//! Rows are never physically deleted: `soft_delete` sets `deleted_at` and
//! every query here filters tombstoned rows out.

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::{Database, DatabaseError};

/// A forwarding destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Comma-separated association keywords, compared case-insensitively.
    pub keywords: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip)]
    pub deleted_at: Option<String>,
}

impl Destination {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            keywords: row.get("keywords")?,
            is_active: row.get("is_active")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            deleted_at: row.get("deleted_at")?,
        })
    }

    /// Returns the trimmed, non-empty keyword entries in stored order.
    pub fn keyword_list(&self) -> impl Iterator<Item = &str> {
        self.keywords
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

/// Inserts a new destination. Fails with [`DatabaseError::Duplicate`] when a
/// live destination already uses the email; the check and the insert share
/// one transaction.
pub fn insert(db: &Database, dest: &Destination) -> Result<(), DatabaseError> {
    db.transaction(|tx| {
        ensure_email_free(tx, &dest.email, &dest.id)?;
        tx.execute(
            "INSERT INTO destinations (id, name, email, keywords, is_active, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                dest.id,
                dest.name,
                dest.email,
                dest.keywords,
                dest.is_active,
                dest.created_at,
                dest.updated_at,
                dest.deleted_at,
            ],
        )?;
        Ok(())
    })
}

/// Updates a live destination. Returns `false` when no live row has that id
/// and fails with [`DatabaseError::Duplicate`] when another live destination
/// uses the new email.
pub fn update(db: &Database, dest: &Destination) -> Result<bool, DatabaseError> {
    db.transaction(|tx| {
        ensure_email_free(tx, &dest.email, &dest.id)?;
        let changed = tx.execute(
            "UPDATE destinations SET name = ?2, email = ?3, keywords = ?4, is_active = ?5, updated_at = ?6
             WHERE id = ?1 AND deleted_at IS NULL",
            params![
                dest.id,
                dest.name,
                dest.email,
                dest.keywords,
                dest.is_active,
                dest.updated_at,
            ],
        )?;
        Ok(changed > 0)
    })
}

/// Tombstones a destination. Returns `false` when no live row has that id.
pub fn soft_delete(db: &Database, id: &str, deleted_at: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE destinations SET deleted_at = ?2, updated_at = ?2
             WHERE id = ?1 AND deleted_at IS NULL",
            params![id, deleted_at],
        )?;
        Ok(changed > 0)
    })
}

/// Finds a live destination by id.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Destination>, DatabaseError> {
    find_one(
        db,
        "SELECT * FROM destinations WHERE id = ?1 AND deleted_at IS NULL",
        id,
    )
}

/// Finds the oldest active destination whose name equals `name` exactly.
pub fn find_active_by_name(db: &Database, name: &str) -> Result<Option<Destination>, DatabaseError> {
    find_one(
        db,
        "SELECT * FROM destinations
         WHERE name = ?1 AND is_active = 1 AND deleted_at IS NULL
         ORDER BY created_at ASC, id ASC LIMIT 1",
        name,
    )
}

/// Lists all active destinations, oldest first.
pub fn list_active(db: &Database) -> Result<Vec<Destination>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM destinations WHERE is_active = 1 AND deleted_at IS NULL
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([], Destination::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts live (non-tombstoned) destinations, active or not.
pub fn count_live(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM destinations WHERE deleted_at IS NULL",
            [],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Rejects `email` if a live destination other than `own_id` holds it.
fn ensure_email_free(conn: &Connection, email: &str, own_id: &str) -> Result<(), DatabaseError> {
    let taken: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM destinations
                       WHERE email = ?1 AND id != ?2 AND deleted_at IS NULL)",
        params![email, own_id],
        |r| r.get(0),
    )?;
    if taken {
        return Err(DatabaseError::Duplicate {
            table: "destinations",
            key: email.to_string(),
        });
    }
    Ok(())
}

fn find_one(db: &Database, sql: &str, key: &str) -> Result<Option<Destination>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query_map(params![key], Destination::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}
