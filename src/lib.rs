//! sitback: a personal task tracker.
//!
//! Todos live under a hierarchical tag taxonomy, depend on each other through
//! predecessor edges, and are handed out to workers under time-limited leases.
//! Everything is stored in one SQLite file behind [`db::Database`].

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod types;
pub mod validate;
