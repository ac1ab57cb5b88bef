//! Referral hierarchy core.
//!
//! Builds an immutable partner tree snapshot from a flat relationship feed,
//! answers hierarchy queries against it, promotes partners through the
//! qualification levels and aggregates sales and bonus performance from an
//! external ledger.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
