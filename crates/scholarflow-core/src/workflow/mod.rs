//! Workflow engine core: state deltas, nodes, routing, recovery, and execution.
//!
//! - `delta` -- Partial state updates merged by the engine
//! - `node` -- Node contract, step outcomes, and the per-call collaborator guard
//! - `nodes` -- The fourteen research pipeline stages
//! - `router` -- Pure routing decisions (errors, conflicts, refinement loop)
//! - `retry` -- Bounded per-node retry policy (error handler)
//! - `interrupt` -- Human-in-the-loop shortlist review suspend/resume
//! - `checkpoint` -- Versioned state snapshots and the in-memory store
//! - `graph` -- Transition table with startup validation
//! - `engine` -- Drives a workflow from entry to terminal or suspend

pub mod checkpoint;
pub mod delta;
pub mod engine;
pub mod graph;
pub mod interrupt;
pub mod node;
pub mod nodes;
pub mod retry;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;
