//! # Runtime
//!
//! Controller runtime: initialization, the watch loop, the placement index
//! watch and the error policy.
//!
//! - `initialization.rs` - rustls, tracing, metrics, server and client setup
//! - `watch_loop.rs` - `Controller` wiring and the reconcile entry point
//! - `index_watch.rs` - Keeps the placement index in step with replica sets
//! - `error_policy.rs` - Requeue decisions for failed passes and stream errors

pub mod error_policy;
pub mod index_watch;
pub mod initialization;
pub mod watch_loop;

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use initialization::InitializationResult;

/// Run the controller until shutdown
///
/// The index watch runs for the lifetime of the process; the watch loop returns
/// once a shutdown signal has been received.
pub async fn run(init: InitializationResult) -> Result<()> {
    let index_task = tokio::spawn(index_watch::run_index_watch(
        init.client.clone(),
        Arc::clone(&init.context.index),
        Arc::clone(&init.server_state),
        Arc::clone(&init.context.config),
    ));

    let result = watch_loop::run_watch_loop(
        init.client,
        Arc::clone(&init.context),
        Arc::clone(&init.server_state),
    )
    .await;

    index_task.abort();
    init.server_state.mark_ready(false);

    if let Err(e) = &result {
        error!(error = %e, "controller stopped with error");
    } else {
        info!("controller stopped");
    }
    result
}
