use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{info, warn};

use shb_core::{config::Config, ownership::OwnershipSynchronizer, ports::MessagingPort};

use crate::{
    dialog::{DialogLimits, DialogStore},
    handlers, TelegramMessenger,
};

#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<OwnershipSynchronizer>,
    pub messenger: Arc<dyn MessagingPort>,
    pub dialogs: Arc<DialogStore>,
}

impl AppState {
    pub fn new(
        cfg: &Config,
        sync: Arc<OwnershipSynchronizer>,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        let dialogs = Arc::new(DialogStore::new(DialogLimits::from(cfg)));
        Self {
            sync,
            messenger,
            dialogs,
        }
    }
}

pub async fn run_polling(cfg: Arc<Config>, sync: Arc<OwnershipSynchronizer>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.require_bot_token()?);

    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "bot started"),
        Err(e) => warn!(error = %e, "get_me failed; continuing"),
    }
    info!(
        backend = ?cfg.store_backend,
        serialize_membership_writes = cfg.serialize_membership_writes,
        "device ownership sync ready"
    );

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let state = Arc::new(AppState::new(&cfg, sync, messenger));

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
