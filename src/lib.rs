//! Offline-first data layer for course rosters.
//!
//! Student records live in a local SQLite cache that remains readable and
//! writable without the remote authority. Every local mutation is tagged
//! with a reconciliation state; a sync pass drains pending adds, updates and
//! deletes in that order, and a connectivity monitor triggers the drain when
//! the remote becomes reachable again. Fetches report where their data came
//! from so callers can tell fresh truth from cached fallback.

pub mod cli;
pub mod config;
pub mod connectivity;
pub mod courses;
pub mod database;
pub mod error;
pub mod monitor;
pub mod remote;
pub mod roster;
pub mod sync;
pub mod telemetry;
