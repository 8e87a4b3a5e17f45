//! Google Drive v3 client.
//!
//! Read-only access to the two discovery sources the scanner uses:
//! - the `changes` feed, drained across pages, with start-token bootstrap
//! - a full listing of one folder's video files

pub mod client;
pub mod error;
pub mod types;

pub use client::{ChangePage, DriveClient, DriveConfig};
pub use error::{DriveError, DriveResult};
