use shb_core::{actions::BotAction, Result};
use tracing::debug;

use crate::router::AppState;

use super::{devices, Sender};

pub(super) async fn handle_action(
    state: &AppState,
    who: &Sender,
    callback_id: &str,
    data: &str,
) -> Result<()> {
    let Some(action) = BotAction::parse(data) else {
        debug!(data, "unknown callback data");
        return state
            .messenger
            .answer_callback_query(callback_id, Some("Unknown action"))
            .await;
    };

    // Clear the button spinner before doing any store work.
    state.messenger.answer_callback_query(callback_id, None).await?;

    match action {
        BotAction::ListDevices => devices::show_devices(state, who).await,
        BotAction::AddDevice => devices::begin_add(state, who).await,
        BotAction::Device(id) => devices::show_device(state, who, id).await,
        BotAction::Toggle(id) => devices::toggle(state, who, id).await,
        BotAction::Delete(id) => devices::delete(state, who, id).await,
        BotAction::Help => devices::show_help(state, who).await,
        BotAction::MainMenu => devices::show_main_menu(state, who).await,
    }
}
