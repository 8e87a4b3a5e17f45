//! Cloud Tasks client.
//!
//! Wraps scan batches as HTTP-callback tasks that carry an OIDC identity
//! token for a fixed service account and target the extraction worker.

pub mod client;
pub mod error;
pub mod naming;

pub use client::{TaskHandle, TasksClient, TasksConfig};
pub use error::{TasksError, TasksResult};
pub use naming::task_id_for;
