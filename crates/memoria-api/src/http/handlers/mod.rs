//! Request handlers, one module per resource.

pub mod extraction;
pub mod health;
pub mod task;
pub mod workflow;
