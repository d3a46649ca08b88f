//! Engine-facing use cases.
//!
//! Services wrap the engine with request defaults and client-facing
//! projections. They depend on the repository port only, never on a
//! concrete storage backend.

pub mod research;
