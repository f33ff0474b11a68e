//! Administrative operations over destinations and the processing log.

use email_address::{EmailAddress, Options};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::destination_repo::{self, Destination};
use crate::db::record_repo::{self, ProcessingRecord, RecordFilter, RecordStatus};
use crate::db::stats_repo::{self, ProcessingStats};
use crate::db::{now_rfc3339, Database, DatabaseError};

/// Page size used when the requested one is out of range.
pub const DEFAULT_PAGE_SIZE: u64 = 20;
/// Largest accepted page size.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Destinations created on first start when the table is empty.
pub const DEFAULT_DESTINATIONS: [(&str, &str, &str); 3] = [
    ("客服部门", "customer-service@company.com", "客户,投诉,咨询"),
    ("技术支持", "tech-support@company.com", "技术,故障,bug"),
    ("销售部门", "sales@company.com", "销售,合作,商务"),
];

/// Errors from administrative operations.
#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Destination not found: {0}")]
    NotFound(String),

    #[error("Invalid record status '{0}', expected one of pending, success, failed")]
    InvalidStatus(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Email {0} is already used by another destination")]
    DuplicateEmail(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub type Result<T> = std::result::Result<T, AdminError>;

fn duplicate_email(err: DatabaseError) -> AdminError {
    match err {
        DatabaseError::Duplicate {
            table: "destinations",
            key,
        } => AdminError::DuplicateEmail(key),
        other => AdminError::Database(other),
    }
}

/// Input for creating a destination.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDestination {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub keywords: String,
    /// Defaults to active.
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub keywords: Option<String>,
    pub is_active: Option<bool>,
}

/// Pagination block of a record listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub total_pages: u64,
}

/// One page of processing records, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct RecordPage {
    pub records: Vec<ProcessingRecord>,
    pub pagination: Pagination,
}

/// Library-level administration surface.
#[derive(Clone)]
pub struct AdminService {
    db: Database,
}

impl AdminService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Lists active destinations, oldest first.
    pub fn list_destinations(&self) -> Result<Vec<Destination>> {
        Ok(destination_repo::list_active(&self.db)?)
    }

    /// Creates a destination after validating it. The email must not belong
    /// to another live destination.
    pub fn create_destination(&self, input: NewDestination) -> Result<Destination> {
        let name = required("name", &input.name)?;
        let email = required("email", &input.email)?;
        if !looks_like_email(&email) {
            return Err(AdminError::Validation(format!(
                "'{}' is not an email address",
                email
            )));
        }

        let now = now_rfc3339();
        let destination = Destination {
            id: Uuid::new_v4().to_string(),
            name,
            email,
            keywords: normalize_keywords(&input.keywords),
            is_active: input.is_active.unwrap_or(true),
            created_at: now.clone(),
            updated_at: now,
            deleted_at: None,
        };
        destination_repo::insert(&self.db, &destination).map_err(duplicate_email)?;

        log::info!(
            "Created destination '{}' <{}>",
            destination.name,
            destination.email
        );
        Ok(destination)
    }

    /// Applies a partial update to a live destination.
    pub fn update_destination(&self, id: &str, update: DestinationUpdate) -> Result<Destination> {
        let mut destination = destination_repo::find_by_id(&self.db, id)?
            .ok_or_else(|| AdminError::NotFound(id.to_string()))?;

        if let Some(name) = update.name {
            destination.name = required("name", &name)?;
        }
        if let Some(email) = update.email {
            let email = required("email", &email)?;
            if !looks_like_email(&email) {
                return Err(AdminError::Validation(format!(
                    "'{}' is not an email address",
                    email
                )));
            }
            destination.email = email;
        }
        if let Some(keywords) = update.keywords {
            destination.keywords = normalize_keywords(&keywords);
        }
        if let Some(is_active) = update.is_active {
            destination.is_active = is_active;
        }
        destination.updated_at = now_rfc3339();

        if !destination_repo::update(&self.db, &destination).map_err(duplicate_email)? {
            return Err(AdminError::NotFound(id.to_string()));
        }
        Ok(destination)
    }

    /// Soft-deletes a destination; it disappears from listings and matching.
    pub fn delete_destination(&self, id: &str) -> Result<()> {
        if !destination_repo::soft_delete(&self.db, id, &now_rfc3339())? {
            return Err(AdminError::NotFound(id.to_string()));
        }
        log::info!("Deleted destination {}", id);
        Ok(())
    }

    /// Lists processing records, newest first.
    ///
    /// `page` below 1 becomes 1 and a `page_size` outside 1..=100 becomes 20.
    /// An empty `status` means no filter.
    pub fn list_records(&self, page: i64, page_size: i64, status: Option<&str>) -> Result<RecordPage> {
        let page = if page < 1 { 1 } else { page as u64 };
        let page_size = if (1..=MAX_PAGE_SIZE as i64).contains(&page_size) {
            page_size as u64
        } else {
            DEFAULT_PAGE_SIZE
        };

        let status = match status.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => Some(
                s.parse::<RecordStatus>()
                    .map_err(|_| AdminError::InvalidStatus(s.to_string()))?,
            ),
            None => None,
        };

        let filter = RecordFilter {
            status,
            limit: Some(page_size),
            offset: Some((page - 1) * page_size),
        };
        let (records, total) = record_repo::query(&self.db, &filter)?;

        Ok(RecordPage {
            records,
            pagination: Pagination {
                page,
                page_size,
                total,
                total_pages: total.div_ceil(page_size),
            },
        })
    }

    /// Record counts by status plus the active destination count.
    pub fn stats(&self) -> Result<ProcessingStats> {
        Ok(stats_repo::summary(&self.db)?)
    }

    /// Creates the default destinations when no live destination exists.
    /// Returns how many were created.
    pub fn seed_defaults(&self) -> Result<usize> {
        if destination_repo::count_live(&self.db)? > 0 {
            return Ok(0);
        }

        for (name, email, keywords) in DEFAULT_DESTINATIONS {
            self.create_destination(NewDestination {
                name: name.to_string(),
                email: email.to_string(),
                keywords: keywords.to_string(),
                is_active: Some(true),
            })?;
        }

        log::info!("Seeded {} default destinations", DEFAULT_DESTINATIONS.len());
        Ok(DEFAULT_DESTINATIONS.len())
    }
}

/// Address syntax accepted for destinations and the mailbox user: a bare
/// `local@domain.tld` address without display text, domain literals or a
/// quoted local part.
pub fn looks_like_email(value: &str) -> bool {
    let options = Options::default()
        .with_required_tld()
        .without_display_text()
        .without_domain_literal();
    match EmailAddress::parse_with_options(value, options) {
        Ok(address) => !address.local_part().starts_with('"'),
        Err(_) => false,
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AdminError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// Trims entries and drops blank ones, keeping order.
fn normalize_keywords(keywords: &str) -> String {
    keywords
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}
