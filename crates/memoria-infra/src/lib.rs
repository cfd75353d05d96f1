//! Infrastructure layer for Memoria.
//!
//! Contains implementations of the ports defined in `memoria-core`: SQLite
//! storage for the extraction ledger, chat topics and workflow checkpoints,
//! HTTP adapters for the extractor and persona collaborators, and config
//! loading from the data directory.

pub mod config;
pub mod http;
pub mod sqlite;
