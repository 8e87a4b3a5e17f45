//! Incremental discovery, deduplication and dispatch.
//!
//! This crate provides:
//! - The reconciliation loop over a stored change cursor
//! - Candidate selection for change-feed and full-listing discovery
//! - Atomic registry claims followed by batched task creation
//! - Trait seams over Drive, Firestore and Cloud Tasks, with in-memory fakes
//!   behind the `test-util` feature

pub mod adapters;
pub mod config;
pub mod discovery;
pub mod dispatcher;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod metrics;
pub mod ports;
pub mod reconciler;

pub use config::{DiscoveryStrategy, ScannerConfig, StrategyKind};
pub use discovery::select_candidates;
pub use dispatcher::{partition, Candidate, DispatchReport, Dispatcher, FailedBatch};
pub use error::{ScanError, ScanResult};
pub use ports::{ChangeSource, CursorStore, JobRegistry, ProbeSink, TaskQueue};
pub use reconciler::{Reconciler, ScanPhase, ScanReport};
