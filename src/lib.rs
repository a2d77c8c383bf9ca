//! gatherdata library
//!
//! This module exposes the data readers, caches, CLI and routines for use by
//! the binary and in integration tests.

pub mod cache;
pub mod cli;
pub mod data;
pub mod routines;
