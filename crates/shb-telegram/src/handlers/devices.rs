//! Device flows shared by commands, callbacks and the add-device dialog.

use tracing::info;

use shb_core::{
    access::Guarded,
    actions::InlineKeyboard,
    domain::{DeviceId, User},
    formatting::{self, escape_html, HELP_TEXT, MAIN_MENU_TEXT},
    Result,
};

use crate::{dialog::Advance, router::AppState};

use super::Sender;

const NOT_REGISTERED: &str = "❌ You are not registered. Use /start";
const BANNED: &str = "❌ Your account is blocked. Contact the administrator.";
const NO_ACCESS: &str = "❌ Device not found or you have no access to it.";
const BUTTON_LABEL_MAX: usize = 30;

async fn say(state: &AppState, who: &Sender, html: &str) -> Result<()> {
    state.messenger.send_html(who.chat_id, html).await
}

/// The sender's row if they may use device actions; otherwise replies and gives `None`.
async fn active_user(state: &AppState, who: &Sender) -> Result<Option<User>> {
    match state.sync.registry().get(who.user_id).await? {
        None => {
            say(state, who, NOT_REGISTERED).await?;
            Ok(None)
        }
        Some(user) if user.is_banned() => {
            say(state, who, BANNED).await?;
            Ok(None)
        }
        Some(user) => Ok(Some(user)),
    }
}

pub(super) async fn start(state: &AppState, who: &Sender) -> Result<()> {
    let tag = who
        .username
        .clone()
        .unwrap_or_else(|| format!("user_{}", who.user_id));
    let reg = state.sync.register_user(who.user_id, &tag).await?;

    if reg.created {
        info!(user_id = who.user_id.0, "new user started the bot");
        say(
            state,
            who,
            "👋 Welcome to the smart home bot!\n\nYou are registered.\n\nUse /help to see the commands.",
        )
        .await?;
    } else if reg.user.is_banned() {
        return say(state, who, BANNED).await;
    } else {
        say(state, who, "👋 Welcome back!\n\nUse /help to see the commands.").await?;
    }
    show_main_menu(state, who).await
}

pub(super) async fn show_help(state: &AppState, who: &Sender) -> Result<()> {
    say(state, who, HELP_TEXT).await
}

pub(super) async fn show_main_menu(state: &AppState, who: &Sender) -> Result<()> {
    state
        .messenger
        .send_inline_keyboard(who.chat_id, MAIN_MENU_TEXT, InlineKeyboard::main_menu())
        .await
}

pub(super) async fn show_devices(state: &AppState, who: &Sender) -> Result<()> {
    if active_user(state, who).await?.is_none() {
        return Ok(());
    }
    let devices = state.sync.list_owned_devices(who.user_id).await?;
    if devices.is_empty() {
        return say(state, who, &formatting::device_list(&devices)).await;
    }
    state
        .messenger
        .send_inline_keyboard(
            who.chat_id,
            &formatting::device_list(&devices),
            InlineKeyboard::device_list(&devices, BUTTON_LABEL_MAX),
        )
        .await
}

pub(super) async fn show_device(state: &AppState, who: &Sender, device_id: DeviceId) -> Result<()> {
    if active_user(state, who).await?.is_none() {
        return Ok(());
    }
    match state.sync.guard().owned_device(who.user_id, device_id).await? {
        Some(device) => {
            state
                .messenger
                .send_inline_keyboard(
                    who.chat_id,
                    &formatting::device_card(&device),
                    InlineKeyboard::device_card(&device),
                )
                .await
        }
        None => say(state, who, NO_ACCESS).await,
    }
}

pub(super) async fn toggle(state: &AppState, who: &Sender, device_id: DeviceId) -> Result<()> {
    if active_user(state, who).await?.is_none() {
        return Ok(());
    }
    match state.sync.toggle_owned(who.user_id, device_id).await? {
        Guarded::Granted(device) => {
            let status = if device.active { "turned on" } else { "turned off" };
            say(state, who, &format!("✅ Device {status}.")).await?;
            show_devices(state, who).await
        }
        Guarded::Denied => say(state, who, NO_ACCESS).await,
    }
}

pub(super) async fn delete(state: &AppState, who: &Sender, device_id: DeviceId) -> Result<()> {
    if active_user(state, who).await?.is_none() {
        return Ok(());
    }
    match state.sync.detach_owned(who.user_id, device_id).await? {
        Guarded::Granted(device) => {
            say(
                state,
                who,
                &format!("✅ Device '{}' deleted.", escape_html(&device.title)),
            )
            .await?;
            show_devices(state, who).await
        }
        Guarded::Denied => say(state, who, NO_ACCESS).await,
    }
}

pub(super) async fn begin_add(state: &AppState, who: &Sender) -> Result<()> {
    if active_user(state, who).await?.is_none() {
        return Ok(());
    }
    let question = state.dialogs.begin(who.chat_id).await;
    say(state, who, question).await
}

pub(super) async fn cancel_add(state: &AppState, who: &Sender) -> Result<()> {
    if state.dialogs.cancel(who.chat_id).await {
        say(state, who, "Adding the device was cancelled.").await
    } else {
        say(state, who, "Nothing to cancel.").await
    }
}

/// Plain text: the next dialog answer, or a hint when no dialog runs.
pub(super) async fn dialog_input(state: &AppState, who: &Sender, text: &str) -> Result<()> {
    match state.dialogs.advance(who.chat_id, text).await {
        Advance::Idle => say(state, who, "Use /menu to manage your devices.").await,
        Advance::Next(question) => say(state, who, question).await,
        Advance::Retry(reason) => say(state, who, &reason).await,
        Advance::Done(draft) => {
            if active_user(state, who).await?.is_none() {
                return Ok(());
            }
            let device = state
                .sync
                .attach_device(who.user_id, &draft.title, &draft.description, &draft.address)
                .await?;
            say(state, who, &formatting::device_created(&device)).await
        }
    }
}
