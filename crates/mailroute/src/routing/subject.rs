//! Subject-line routing convention: `<keyword> - <target name>`.

use std::sync::LazyLock;

use regex::Regex;

/// Non-greedy keyword, then a hyphen with whitespace on at least one side,
/// then the rest of the line as the target name.
static SUBJECT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)(?:\s+-\s*|\s*-\s+)(.+)$").unwrap());

/// A routing directive extracted from a subject line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectRoute {
    pub keyword: String,
    pub target: String,
}

impl SubjectRoute {
    /// True when the subject did not follow the convention.
    pub fn is_empty(&self) -> bool {
        self.keyword.is_empty() || self.target.is_empty()
    }
}

/// Splits a subject into keyword and target name.
///
/// Both fields are empty when the subject does not follow the convention or
/// either side is blank after trimming.
pub fn parse_subject(subject: &str) -> SubjectRoute {
    let Some(caps) = SUBJECT_PATTERN.captures(subject.trim()) else {
        return SubjectRoute::default();
    };

    let keyword = caps.get(1).map_or("", |m| m.as_str()).trim();
    let target = caps.get(2).map_or("", |m| m.as_str()).trim();
    if keyword.is_empty() || target.is_empty() {
        return SubjectRoute::default();
    }

    SubjectRoute {
        keyword: keyword.to_string(),
        target: target.to_string(),
    }
}
