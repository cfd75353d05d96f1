//! The memory extraction orchestrator.
//!
//! `normalize` canonicalizes trigger payloads, `service` is the dedup gate
//! that owns the ledger record, `dispatcher` fans a batch out into
//! `topic_job` runs, and `scheduler` hands a gated batch to the runtime.

pub mod collaborator;
pub mod dispatcher;
pub mod normalize;
pub mod scheduler;
pub mod service;
pub mod topic_job;

#[cfg(test)]
pub(crate) mod testing;
