//! # Watch Loop
//!
//! Controller watch loop. Replica sets are watched directly; delivery works,
//! placements and placement decisions are mapped back onto the owning replica
//! set keys and enqueued on the same controller queue.
//!
//! The controller queue deduplicates keys and never runs two passes for the
//! same key at once, which is what makes per-key passes serial.

use crate::constants::REPLICA_SET_LABEL;
use crate::controller::keys::{
    keys_for_decision, keys_for_placement, own_key, owner_key_from_work, QueueKey,
};
use crate::controller::reconciler::{sync, Context, ReconcilerError, SyncError};
use crate::controller::server::ServerState;
use crate::crd::{DeliveryWork, Placement, PlacementDecision, WorkReplicaSet};
use crate::observability;
use crate::runtime::error_policy::{handle_reconciliation_error, StreamErrorPolicy};
use futures::StreamExt;
use kube::api::Api;
use kube::runtime::reflector::ObjectRef;
use kube::Client;
use kube_runtime::{controller, controller::Action, watcher, Controller};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};

/// Run the controller watch loop
///
/// Handles graceful shutdown on SIGTERM/SIGINT and restarts the controller
/// when its stream ends for any other reason.
pub async fn run_watch_loop(
    client: Client,
    ctx: Arc<Context>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let config = Arc::clone(&ctx.config);
    let stream_errors = Arc::new(StreamErrorPolicy::new(Arc::clone(&config)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_server_state.mark_ready(false);
        if shutdown_tx.send(true).is_err() {
            debug!("watch loop already stopped");
        }
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    loop {
        if *shutdown_rx.borrow() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        let mut shutdown = shutdown_rx.clone();
        let stream_errors = Arc::clone(&stream_errors);
        let stream_ctx = Arc::clone(&ctx);
        let placement_index = Arc::clone(&ctx.index);
        let decision_index = Arc::clone(&ctx.index);

        let works: Api<DeliveryWork> = Api::all(client.clone());
        let placements: Api<Placement> = Api::all(client.clone());
        let decisions: Api<PlacementDecision> = Api::all(client.clone());

        let concurrency = u16::try_from(config.max_concurrent_reconciliations).unwrap_or(u16::MAX);

        async {
            info!(concurrency, "Starting controller watch loop...");
            Controller::new(
                Api::<WorkReplicaSet>::all(client.clone()),
                watcher::Config::default().any_semantic(),
            )
            .watches(
                works,
                watcher::Config::default().labels(REPLICA_SET_LABEL),
                |work: DeliveryWork| -> Vec<ObjectRef<WorkReplicaSet>> {
                    owner_key_from_work(&work)
                        .iter()
                        .map(ObjectRef::from)
                        .collect()
                },
            )
            .watches(
                placements,
                watcher::Config::default(),
                move |placement: Placement| -> Vec<ObjectRef<WorkReplicaSet>> {
                    keys_for_placement(&placement_index, &placement)
                        .iter()
                        .map(ObjectRef::from)
                        .collect()
                },
            )
            .watches(
                decisions,
                watcher::Config::default(),
                move |decision: PlacementDecision| -> Vec<ObjectRef<WorkReplicaSet>> {
                    keys_for_decision(&decision_index, &decision)
                        .iter()
                        .map(ObjectRef::from)
                        .collect()
                },
            )
            .with_config(controller::Config::default().concurrency(concurrency))
            .graceful_shutdown_on(async move {
                if shutdown.wait_for(|stop| *stop).await.is_err() {
                    debug!("shutdown channel closed");
                }
            })
            .run(reconcile, handle_reconciliation_error, Arc::clone(&ctx))
            .for_each(|result| {
                let stream_errors = Arc::clone(&stream_errors);
                let ctx = Arc::clone(&stream_ctx);
                async move {
                    match result {
                        Ok((object, _)) => {
                            stream_errors.reset();
                            debug!(resource = %object, "watch.event.success");
                        }
                        // Already logged and requeued by the error policy
                        Err(controller::Error::ReconcilerFailed(_, object)) => {
                            debug!(resource = %object, "reconciliation failed, requeued with backoff");
                        }
                        Err(controller::Error::ObjectNotFound(object)) => {
                            debug!(resource = %object, "object gone before reconciliation");
                            let mut typed = ObjectRef::<WorkReplicaSet>::new(&object.name);
                            typed.namespace = object.namespace.clone();
                            forget_backoff(&ctx, &typed);
                        }
                        Err(controller::Error::QueueError(e)) => {
                            stream_errors.handle(&e.to_string()).await;
                        }
                        Err(e) => {
                            warn!(error = %e, "controller runner error");
                        }
                    }
                }
            })
            .await;
        }
        .instrument(watch_span)
        .await;

        if *shutdown_rx.borrow() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = config.watch_restart_delay_after_end_duration();
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Drop the backoff of a replica set that no longer exists
pub fn forget_backoff(ctx: &Context, object: &ObjectRef<WorkReplicaSet>) {
    let Some(namespace) = object.namespace.as_deref() else {
        return;
    };
    let key = QueueKey::new(namespace, object.name.as_str());
    if ctx.reset_backoff(&key) {
        debug!(resource = %key, "backoff dropped for deleted replica set");
    }
}

/// Reconcile one replica set under the configured deadline
///
/// A clean pass requeues after the resync interval and resets the key's
/// backoff; a failed or timed-out pass goes to the error policy.
pub async fn reconcile(
    rs: Arc<WorkReplicaSet>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcilerError> {
    let Some(key) = own_key(&rs) else {
        return Ok(Action::await_change());
    };

    let reconcile_span = tracing::span!(
        tracing::Level::INFO,
        "controller.watch.reconcile",
        resource.name = %key.name,
        resource.namespace = %key.namespace,
        resource.version = rs.metadata.resource_version.as_deref().unwrap_or("unknown"),
        resource.generation = rs.metadata.generation.unwrap_or(0),
        resource.observed_generation = rs
            .status
            .as_ref()
            .and_then(|s| s.observed_generation)
            .unwrap_or(0),
    );

    async move {
        observability::metrics::increment_reconciliations();
        let start = Instant::now();
        let timeout = ctx.config.reconcile_timeout();

        let result = tokio::time::timeout(timeout, sync(&ctx, &key.to_string())).await;
        observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

        match result {
            Err(_) => Err(SyncError::Timeout(timeout).into()),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(())) => {
                if ctx.reset_backoff(&key) {
                    info!("pass succeeded, backoff reset");
                }
                observability::metrics::increment_requeues_total("resync");
                Ok(Action::requeue(ctx.config.resync_interval()))
            }
        }
    }
    .instrument(reconcile_span)
    .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
