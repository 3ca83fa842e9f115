//! Command tests for drive-backup
//!
//! These tests verify run and validation behavior using mocked dependencies.

mod run;
mod schedule;
mod validate;
