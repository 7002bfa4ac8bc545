//! Background loop driving the dispatcher's sealing/dispatch tick, and the
//! periodic re-sleep sweep for the Master role.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::context::CoreContext;

/// Runs until `shutdown` is cancelled; errors from a single tick are logged
/// and do not stop the loop, since a transient peer failure should not halt
/// the Master. Cancellation lets `main` finish resealing the store before
/// the process exits, instead of racing an in-flight tick.
pub async fn run(context: Arc<CoreContext>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(context.block_timer_seconds));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(err) = context.dispatcher.tick().await {
                    tracing::warn!(error = %err, "scheduler tick failed");
                }
            }
            _ = shutdown.cancelled() => {
                tracing::info!("scheduler loop shutting down");
                return;
            }
        }
    }
}
