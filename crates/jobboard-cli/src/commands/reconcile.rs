//! Reconciliation command.

use std::sync::Arc;

use anyhow::Result;
use jobboard_config::JobBoardConfig;
use jobboard_scheduler::{ReconcileLoop, ReconcileReport, Reconciler};
use tracing::info;

use super::connect_store;

/// Sweep once, or on the configured interval until Ctrl-C.
pub async fn run(config: &JobBoardConfig, repeat: bool) -> Result<()> {
    let store = Arc::new(connect_store(config).await?);
    let reconciler = Arc::new(Reconciler::new(store.clone(), store));

    if !repeat {
        let report = reconciler.sweep().await?;
        print_report(&report)?;
        return Ok(());
    }

    info!(interval = ?config.reconcile_interval, "Sweeping until interrupted");
    let runner = ReconcileLoop::new(reconciler, config.reconcile_interval);
    let mut reports = runner.subscribe();
    let handle = tokio::spawn(runner.run(async {
        let _ = tokio::signal::ctrl_c().await;
    }));

    // Ends once the loop stops and drops its sender.
    while reports.changed().await.is_ok() {
        let latest = reports.borrow_and_update().clone();
        if let Some(report) = latest {
            print_report(&report)?;
        }
    }

    handle.await?;
    Ok(())
}

fn print_report(report: &ReconcileReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
