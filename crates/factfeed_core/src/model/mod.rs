//! Domain model for the content feed.
//!
//! # Responsibility
//! - Define content pool items, user preferences/accounts and ledger records.
//! - Keep validation next to the types it protects.
//!
//! # Invariants
//! - Every content item and user is identified by a stable UUID.
//! - A (user, content item) pair is delivered at most once.

pub mod account;
pub mod content;
pub mod delivery;
pub mod preferences;
pub mod validation;
