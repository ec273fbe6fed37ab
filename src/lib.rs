//! Work Replica Set Controller Library
//!
//! Reconciles `WorkReplicaSet` resources: each one carries manifest templates
//! and placement references, and the controller keeps exactly one
//! `DeliveryWork` per selected cluster in step with them.
//!
//! ## Quick Start
//!
//! ```rust
//! use workset_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod placement;
pub mod prelude;
pub mod runtime;
pub mod store;
