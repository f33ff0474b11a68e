//! Destination resolution: exact name first, then fuzzy name containment.

use thiserror::Error;
use tracing::debug;

use crate::db::destination_repo::{self, Destination};
use crate::db::{Database, DatabaseError};

/// Errors raised while resolving a destination.
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("no matching destination for keyword '{keyword}' and target '{target}'")]
    NoDestination { keyword: String, target: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// True when `keyword` contains one of the destination's keyword entries,
/// ignoring case. Blank entries never match.
pub fn matches_keyword(keyword: &str, keyword_list: &str) -> bool {
    let keyword = keyword.to_lowercase();
    keyword_list
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .any(|entry| keyword.contains(&entry.to_lowercase()))
}

/// Resolves the forwarding destination for a parsed subject.
///
/// 1. An active destination named exactly `target` whose keywords match.
/// 2. Otherwise the first active destination, oldest first, whose name
///    contains `target` (case-insensitive) and whose keywords match.
pub fn resolve(db: &Database, keyword: &str, target: &str) -> Result<Destination, RoutingError> {
    if let Some(dest) = destination_repo::find_active_by_name(db, target)? {
        if matches_keyword(keyword, &dest.keywords) {
            debug!(destination = %dest.name, "Exact destination match");
            return Ok(dest);
        }
    }

    let target_lower = target.to_lowercase();
    let fuzzy = destination_repo::list_active(db)?.into_iter().find(|dest| {
        dest.name.to_lowercase().contains(&target_lower) && matches_keyword(keyword, &dest.keywords)
    });

    match fuzzy {
        Some(dest) => {
            debug!(destination = %dest.name, "Fuzzy destination match");
            Ok(dest)
        }
        None => Err(RoutingError::NoDestination {
            keyword: keyword.to_string(),
            target: target.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(db: &Database, id: &str, name: &str, keywords: &str, active: bool, created_at: &str) {
        destination_repo::insert(
            db,
            &Destination {
                id: id.to_string(),
                name: name.to_string(),
                email: format!("{}@company.com", id),
                keywords: keywords.to_string(),
                is_active: active,
                created_at: created_at.to_string(),
                updated_at: created_at.to_string(),
                deleted_at: None,
            },
        )
        .unwrap();
    }

    #[test]
    fn test_matches_keyword_substring_and_case() {
        assert!(matches_keyword("投诉咨询", "客户,投诉"));
        assert!(matches_keyword("Critical BUG", "技术, bug ,故障"));
        assert!(!matches_keyword("销售", "客户,投诉"));
    }

    #[test]
    fn test_matches_keyword_ignores_blank_entries() {
        assert!(!matches_keyword("anything", ""));
        assert!(!matches_keyword("anything", " , ,"));
    }

    #[test]
    fn test_exact_match() {
        let db = Database::open_in_memory().unwrap();
        add(&db, "cs", "客服部门", "客户,投诉", true, "2024-01-01T00:00:00Z");

        let dest = resolve(&db, "投诉咨询", "客服部门").unwrap();
        assert_eq!(dest.id, "cs");
    }

    #[test]
    fn test_exact_name_with_wrong_keyword_falls_back_to_fuzzy() {
        let db = Database::open_in_memory().unwrap();
        add(&db, "a", "客服", "投诉", true, "2024-01-01T00:00:00Z");
        add(&db, "b", "客服二组", "咨询", true, "2024-01-02T00:00:00Z");

        let dest = resolve(&db, "咨询", "客服").unwrap();
        assert_eq!(dest.id, "b");
    }

    #[test]
    fn test_fuzzy_match() {
        let db = Database::open_in_memory().unwrap();
        add(&db, "cs", "客服部门", "客户,投诉", true, "2024-01-01T00:00:00Z");

        let dest = resolve(&db, "投诉", "客服").unwrap();
        assert_eq!(dest.id, "cs");
    }

    #[test]
    fn test_fuzzy_match_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        add(&db, "sales", "Sales Team", "deal", true, "2024-01-01T00:00:00Z");

        assert_eq!(resolve(&db, "Big DEAL", "sales").unwrap().id, "sales");
    }

    #[test]
    fn test_inactive_destinations_are_ignored() {
        let db = Database::open_in_memory().unwrap();
        add(&db, "cs", "客服部门", "投诉", false, "2024-01-01T00:00:00Z");

        assert!(matches!(
            resolve(&db, "投诉", "客服部门"),
            Err(RoutingError::NoDestination { .. })
        ));
    }

    #[test]
    fn test_not_found_echoes_inputs() {
        let db = Database::open_in_memory().unwrap();
        add(&db, "cs", "客服部门", "客户,投诉", true, "2024-01-01T00:00:00Z");

        let err = resolve(&db, "销售", "市场部").unwrap_err();
        match &err {
            RoutingError::NoDestination { keyword, target } => {
                assert_eq!(keyword, "销售");
                assert_eq!(target, "市场部");
            }
            other => panic!("unexpected error: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains("销售"));
        assert!(message.contains("市场部"));
    }
}
