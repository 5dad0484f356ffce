//! One reconciliation pass over the configured stores.
//!
//! Prints the report as JSON on stdout and exits non-zero when any item
//! could not be repaired.
//!
//! The per-user locks are process-local, so this process does not exclude the
//! bot. Repairs apply only their removals to a row re-read right before the
//! write, which narrows that window without closing it; prefer the bot's
//! scheduled pass (`RECONCILE_INTERVAL_SECS`). A single pass never deletes
//! orphans, since deletion needs a confirming second pass.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use shb_core::{
    config::Config,
    locks::UserLocks,
    reconcile::{ReconcileReport, Reconciler},
};

fn render(report: &ReconcileReport) -> anyhow::Result<String> {
    serde_json::to_string_pretty(report).context("serialize reconcile report")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shb_core::logging::init("shb-reconcile")?;

    let cfg = Config::load().context("load config")?;
    if cfg.reconcile_delete_orphans {
        info!("orphans are only reported by a one-shot pass; the bot's scheduled pass deletes them");
    }
    let (devices, users) = shb_api::stores_from_config(&cfg).context("build stores")?;

    let reconciler = Reconciler::new(
        devices,
        users,
        Arc::new(UserLocks::new()),
        cfg.reconcile_config(),
    );
    let report = reconciler.run().await.context("reconciliation pass")?;

    println!("{}", render(&report)?);

    if !report.failures.is_empty() {
        warn!(failures = report.failures.len(), "some items were not repaired");
        anyhow::bail!("{} item(s) could not be repaired", report.failures.len());
    }
    Ok(())
}
