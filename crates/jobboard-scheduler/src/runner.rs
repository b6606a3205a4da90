//! Periodic reconciliation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::{ReconcileReport, Reconciler};

/// Runs a sweep every interval and publishes the latest report.
pub struct ReconcileLoop {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    reports: watch::Sender<Option<Arc<ReconcileReport>>>,
}

impl ReconcileLoop {
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration) -> Self {
        let (reports, _) = watch::channel(None);
        Self {
            reconciler,
            interval,
            reports,
        }
    }

    /// Receiver for the report of the most recent successful sweep.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ReconcileReport>>> {
        self.reports.subscribe()
    }

    /// Sweep until `shutdown` resolves. The first sweep runs immediately.
    ///
    /// A failed sweep is logged and retried on the next tick.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        info!(interval_secs = self.interval.as_secs(), "Starting reconcile loop");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    match self.reconciler.sweep().await {
                        Ok(report) => {
                            self.reports.send_replace(Some(Arc::new(report)));
                        }
                        Err(e) => warn!(error = %e, "Reconciliation sweep failed"),
                    }
                }
            }
        }

        info!("Reconcile loop stopped");
    }
}
