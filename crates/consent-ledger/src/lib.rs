//! Per-tenant policy versioning, consent tracking and consent-link collection.

pub mod config;
pub mod consent;
pub mod error;
pub mod telemetry;
