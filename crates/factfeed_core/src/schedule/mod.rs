//! Pure scheduling computation.
//!
//! # Responsibility
//! - Compute the slots a request window needs (`slots`).
//! - Plan and pull a ratio-balanced undelivered selection (`selection`).
//! - Bind selected items to slot instants (`assign`).
//!
//! # Invariants
//! - Nothing here reads the clock; `now` is always an input.
//! - Only `selection` touches storage, and only through `ContentPool` reads.

pub mod assign;
pub mod selection;
pub mod slots;
