//! Business logic for Scholarflow: the research workflow engine.
//!
//! - [`collaborator`]: narrow async ports to the LLM agents and external services.
//! - [`repository`]: storage port for workflow checkpoints.
//! - [`workflow`]: nodes, routers, retry policy, interrupt controller, and the engine.
//! - [`service`]: the engine-facing API consumed by the CLI.

pub mod collaborator;
pub mod repository;
pub mod service;
pub mod workflow;
