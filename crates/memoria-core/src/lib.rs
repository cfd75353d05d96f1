//! Extraction orchestration logic and repository trait definitions for Memoria.
//!
//! This crate defines the "ports" (repository and collaborator traits) that
//! the infrastructure layer implements, plus the in-process durable runtime
//! the orchestrator runs on. It depends only on `memoria-types` -- never on
//! `memoria-infra` or any database/IO crate.

pub mod durable;
pub mod extraction;
pub mod repository;
