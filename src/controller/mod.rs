//! # Controller
//!
//! Core controller modules for the Work Replica Set Controller.
//!
//! - `backoff`: Exponential backoff for failed passes
//! - `index`: Placement to replica set correlation index
//! - `keys`: Queue-key derivation for every watched kind
//! - `patch`: JSON merge patch helpers
//! - `reconciler`: Reconciliation pipeline and sync entry point
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod index;
pub mod keys;
pub mod patch;
pub mod reconciler;
pub mod server;
