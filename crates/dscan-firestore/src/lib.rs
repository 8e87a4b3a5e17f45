//! Firestore REST API client.
//!
//! This crate provides:
//! - Document CRUD with merge updates and `updateTime` preconditions
//! - The change-feed cursor store
//! - The job registry with atomic claims
//! - Task probe receipts
//! - Request metrics and tracing spans

pub mod client;
pub mod cursor_repo;
pub mod error;
pub mod job_repo;
pub mod metrics;
pub mod probe_repo;
pub mod types;

pub use client::{FirestoreClient, FirestoreConfig};
pub use cursor_repo::CursorRepository;
pub use error::{FirestoreError, FirestoreResult};
pub use job_repo::JobRepository;
pub use probe_repo::ProbeRepository;
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
