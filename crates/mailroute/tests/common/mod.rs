//! Shared test utilities for mailroute integration tests.
//!
//! This module provides:
//! - `FakeMailbox`, an in-memory `Mailbox` with scripted listings and
//!   failure injection
//! - Builders for provider messages and a pipeline wired to the fake

#![allow(dead_code)]

pub mod builders;
pub mod fake_mailbox;

pub use builders::*;
pub use fake_mailbox::{FakeMailbox, SentMessage};
