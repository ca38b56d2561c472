use std::future::Future;
use std::io;

use tracing::{info, warn};

use crate::services::CalculationQueue;

/// Resolves once `signal` fires, after rejecting every queued calculation so
/// waiting requests can answer before the server stops. A signal that could not
/// be installed never fires.
pub async fn drain_on<S>(signal: S, queue: CalculationQueue)
where
    S: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }

    info!("shutdown requested");
    let rejected = queue.clear().await;
    if rejected > 0 {
        warn!("{} calculations were still queued at shutdown", rejected);
    }
}
