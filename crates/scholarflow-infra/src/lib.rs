//! Infrastructure layer for Scholarflow.
//!
//! Contains implementations of the ports defined in `scholarflow-core`:
//! SQLite checkpoint storage, data-directory and `config.toml` handling, and
//! the deterministic offline collaborators used when no external agent or
//! search service is wired in.

pub mod config;
pub mod filesystem;
pub mod local;
pub mod sqlite;
