//! Shared domain types for Scholarflow.
//!
//! This crate contains the data model threaded through the research pipeline:
//! the workflow state record, the append-only agent message log, the
//! per-stage research records, configuration, and the status projection
//! handed to polling clients.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod message;
pub mod research;
pub mod state;
pub mod status;
