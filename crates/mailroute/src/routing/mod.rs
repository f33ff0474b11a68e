//! Subject-line routing and destination resolution.

pub mod resolver;
pub mod subject;

pub use resolver::{matches_keyword, resolve, RoutingError};
pub use subject::{parse_subject, SubjectRoute};
