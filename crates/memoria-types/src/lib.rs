//! Shared domain types for Memoria.
//!
//! This crate contains the core domain types used across the extraction
//! orchestrator: memory layers, extraction requests and per-topic jobs, the
//! async-task ledger record, durable workflow records, and their error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod extraction;
pub mod memory;
pub mod task;
pub mod workflow;

/// Opaque user identifier as issued by the chat application.
pub type UserId = String;

/// Opaque chat topic identifier.
pub type TopicId = String;
