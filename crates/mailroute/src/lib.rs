pub mod admin;
pub mod config;
pub mod db;
pub mod error;
pub mod intake;
pub mod mailbox;
pub mod routing;
pub mod scheduler;
pub mod secrets;

pub use admin::{AdminError, AdminService};
pub use config::{load_config, Config};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, MailrouteError, Result};
pub use intake::{BatchFetcher, FetchedMessage, ForwardTemplate, IntakePipeline, PipelineError, RunSummary};
pub use mailbox::{GmailClient, Mailbox, MailboxError, RefreshTokenProvider, StaticToken, TokenProvider};
pub use routing::{parse_subject, resolve, RoutingError};
pub use scheduler::IntakeScheduler;
pub use secrets::{SecretError, SecretSource};
