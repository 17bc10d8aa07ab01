//! fxgate Common Types
//!
//! This crate contains shared types used across the fxgate workspace,
//! including identifiers, currency types, persisted records and the clock
//! abstraction used by the cache and the rate limiter.

pub mod identifiers;
pub mod monetary;
pub mod records;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use records::*;
pub use time::*;
