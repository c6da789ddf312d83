use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::warn;

use algo_wc_core::{
    ClockPort, NetworkSubmitPort, PushSubscriptionPort, SessionCoordinator, SigningPort,
    WalletConnectPort, WalletStatePort,
};

/// Runs `sweep_expired` every `interval_ms` until the returned task is aborted.
pub fn spawn_expiry_sweeper<W, S, N, P, A, C>(
    coordinator: Arc<SessionCoordinator<W, S, N, P, A, C>>,
    interval_ms: u64,
) -> JoinHandle<()>
where
    W: WalletConnectPort + 'static,
    S: SigningPort + 'static,
    N: NetworkSubmitPort + 'static,
    P: PushSubscriptionPort + 'static,
    A: WalletStatePort + 'static,
    C: ClockPort + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        loop {
            ticker.tick().await;
            if let Err(e) = coordinator.sweep_expired() {
                warn!(error = %e, "expiry sweep failed");
            }
        }
    })
}
