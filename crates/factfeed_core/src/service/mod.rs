//! Delivery use-case services.
//!
//! # Responsibility
//! - Orchestrate slot planning, selection and ledger calls into the
//!   operations callers see.
//! - Keep the CLI and other front ends decoupled from storage details.

pub mod delivery_service;
pub mod envelope;
