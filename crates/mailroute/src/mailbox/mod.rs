//! Remote mailbox access.
//!
//! [`Mailbox`] is the seam between the intake pipeline and the mail
//! service; [`GmailClient`] is the production implementation.

pub mod auth;
pub mod client;
pub mod error;
pub mod gmail;
pub mod model;

pub use auth::{RefreshTokenProvider, StaticToken, TokenProvider};
pub use client::{HttpSettings, Mailbox};
pub use error::MailboxError;
pub use gmail::GmailClient;
pub use model::{Header, MessagePage, MessagePart, MessageRef, PartBody, RawMessage, UNREAD_QUERY};
