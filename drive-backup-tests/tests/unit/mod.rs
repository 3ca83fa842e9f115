//! Unit tests for drive-backup
//!
//! Configuration handling, archive producers and retention selection,
//! exercised through the public API.

mod config;
mod retention;
mod sources;
