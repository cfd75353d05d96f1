//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (memoria-infra) implements. The core crate never depends on any
//! specific storage technology.

pub mod checkpoint;
pub mod task;
pub mod topic;
