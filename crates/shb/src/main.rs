use std::sync::Arc;

use tracing::info;

use shb_core::{config::Config, ownership::OwnershipSynchronizer, reconcile::Reconciler};

#[tokio::main]
async fn main() -> Result<(), shb_core::Error> {
    shb_core::logging::init("shb")?;

    let cfg = Arc::new(Config::load()?);
    cfg.require_bot_token()?;

    let (devices, users) = shb_api::stores_from_config(&cfg)?;
    let sync = Arc::new(OwnershipSynchronizer::new(
        devices.clone(),
        users.clone(),
        cfg.sync_config(),
    ));

    // Shares the synchronizer's lock table, so repairs never race an attach or detach.
    if !cfg.reconcile_interval.is_zero() {
        let reconciler = Arc::new(Reconciler::new(
            devices,
            users,
            sync.locks(),
            cfg.reconcile_config(),
        ));
        reconciler.spawn_periodic(cfg.reconcile_interval);
        info!(every_secs = cfg.reconcile_interval.as_secs(), "scheduled reconciliation enabled");
    }

    shb_telegram::router::run_polling(cfg, sync)
        .await
        .map_err(|e| shb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
