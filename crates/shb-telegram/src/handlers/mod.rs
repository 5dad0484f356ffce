//! Telegram update handlers.
//!
//! The teloxide endpoints only extract the sender and the payload; the flows
//! in [`devices`] talk to the core and reply through the MessagingPort.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};
use tracing::warn;

use shb_core::{
    domain::{ChatId, UserId},
    errors::Error,
};

use crate::router::AppState;

mod callback;
mod commands;
mod devices;

#[cfg(test)]
mod testing;

/// Who sent an update, and where replies go.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
}

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let data = q.data.clone().unwrap_or_default();
    let Some(chat_id) = q.message.as_ref().map(|m| m.chat.id) else {
        let _ = state.messenger.answer_callback_query(&q.id, None).await;
        return Ok(());
    };

    let who = Sender {
        chat_id: ChatId(chat_id.0),
        user_id: UserId(q.from.id.0 as i64),
        username: q.from.username.clone(),
    };
    on_callback(&state, &who, &q.id, &data).await;
    Ok(())
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let (Some(from), Some(text)) = (msg.from(), msg.text()) else {
        return Ok(());
    };

    let who = Sender {
        chat_id: ChatId(msg.chat.id.0),
        user_id: UserId(from.id.0 as i64),
        username: from.username.clone(),
    };
    on_text(&state, &who, text).await;
    Ok(())
}

pub(crate) async fn on_text(state: &AppState, who: &Sender, text: &str) {
    let res = if text.starts_with('/') {
        commands::handle_command(state, who, text).await
    } else {
        devices::dialog_input(state, who, text).await
    };
    if let Err(e) = res {
        report_error(state, who.chat_id, &e).await;
    }
}

pub(crate) async fn on_callback(state: &AppState, who: &Sender, callback_id: &str, data: &str) {
    if let Err(e) = callback::handle_action(state, who, callback_id, data).await {
        report_error(state, who.chat_id, &e).await;
    }
}

const FAILURE_TEXT: &str = "❌ Something went wrong. Please try again later.";

async fn report_error(state: &AppState, chat_id: ChatId, err: &Error) {
    // Inconsistencies were already logged at error level where they happened.
    if err.inconsistency_kind().is_none() {
        warn!(chat_id = chat_id.0, kind = err.kind(), error = %err, "handler failed");
    }
    let _ = state.messenger.send_html(chat_id, FAILURE_TEXT).await;
}

#[cfg(test)]
mod tests {
    use super::testing::{sender, Harness};
    use super::*;
    use shb_core::domain::DeviceId;
    use shb_core::errors::InconsistencyKind;

    async fn add_device(h: &Harness, who: &Sender, title: &str) -> DeviceId {
        on_text(&h.state, who, "/add_device").await;
        on_text(&h.state, who, title).await;
        on_text(&h.state, who, "on the desk").await;
        on_text(&h.state, who, "room 1").await;
        let devices = h.state.sync.list_owned_devices(who.user_id).await.unwrap();
        devices
            .iter()
            .find(|d| d.title == title)
            .map(|d| d.device_id)
            .unwrap()
    }

    #[tokio::test]
    async fn start_registers_then_welcomes_back() {
        let h = Harness::new();
        let alice = sender(1);

        on_text(&h.state, &alice, "/start").await;
        let sent = h.out.take();
        assert!(sent[0].html.contains("You are registered"));
        assert_eq!(sent[0].chat_id, alice.chat_id);
        assert!(sent[1].keyboard.is_some(), "main menu follows the greeting");

        on_text(&h.state, &alice, "/start").await;
        assert!(h.out.take_text().contains("Welcome back"));

        let user = h.state.sync.registry().get(alice.user_id).await.unwrap().unwrap();
        assert_eq!(user.tag, "tester1");
    }

    #[tokio::test]
    async fn unregistered_and_banned_users_are_refused() {
        let h = Harness::new();
        let bob = sender(2);

        on_text(&h.state, &bob, "/devices").await;
        assert!(h.out.take_text().contains("not registered"));

        on_text(&h.state, &bob, "/start").await;
        h.state.sync.registry().set_active(bob.user_id, false).await.unwrap();
        h.out.take();

        on_text(&h.state, &bob, "/add_device").await;
        assert!(h.out.take_text().contains("blocked"));
        assert!(!h.state.dialogs.is_active(bob.chat_id).await);

        on_text(&h.state, &bob, "/start").await;
        let text = h.out.take_text();
        assert!(text.contains("blocked"));
        assert!(!text.contains("Main menu"));
    }

    #[tokio::test]
    async fn add_device_dialog_attaches_to_the_sender() {
        let h = Harness::new();
        let alice = sender(1);
        on_text(&h.state, &alice, "/start").await;
        h.out.take();

        let id = add_device(&h, &alice, "Lamp").await;
        assert!(h.out.take_text().contains("Device added"));

        let user = h.state.sync.registry().get(alice.user_id).await.unwrap().unwrap();
        assert_eq!(user.devices, vec![id]);
        assert_eq!(user.device_counter, 1);
    }

    #[tokio::test]
    async fn cancel_stops_the_dialog() {
        let h = Harness::new();
        let alice = sender(1);
        on_text(&h.state, &alice, "/start").await;
        on_text(&h.state, &alice, "/add_device").await;
        on_text(&h.state, &alice, "/cancel").await;
        h.out.take();

        on_text(&h.state, &alice, "Lamp").await;
        assert!(h.out.take_text().contains("/menu"));
        assert!(h
            .state
            .sync
            .list_owned_devices(alice.user_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn foreign_device_buttons_are_denied() {
        let h = Harness::new();
        let alice = sender(1);
        let mallory = sender(3);
        on_text(&h.state, &alice, "/start").await;
        on_text(&h.state, &mallory, "/start").await;
        let id = add_device(&h, &alice, "Lamp").await;
        h.out.take();

        on_callback(&h.state, &mallory, "cb1", &format!("toggle_{id}")).await;
        on_callback(&h.state, &mallory, "cb2", &format!("delete_{id}")).await;
        on_callback(&h.state, &mallory, "cb3", &format!("device_{id}")).await;
        let text = h.out.take_text();
        assert_eq!(text.matches("no access").count(), 3);

        let devices = h.state.sync.list_owned_devices(alice.user_id).await.unwrap();
        assert_eq!(devices.len(), 1);
        assert!(!devices[0].active);
    }

    #[tokio::test]
    async fn owner_toggles_and_deletes_via_buttons() {
        let h = Harness::new();
        let alice = sender(1);
        on_text(&h.state, &alice, "/start").await;
        let id = add_device(&h, &alice, "Lamp").await;
        h.out.take();

        on_callback(&h.state, &alice, "cb1", &format!("toggle_{id}")).await;
        assert!(h.out.take_text().contains("turned on"));

        on_callback(&h.state, &alice, "cb2", &format!("delete_{id}")).await;
        let text = h.out.take_text();
        assert!(text.contains("'Lamp' deleted"));
        assert!(text.contains("no devices yet"));

        let user = h.state.sync.registry().get(alice.user_id).await.unwrap().unwrap();
        assert!(user.devices.is_empty());
        assert_eq!(user.device_counter, 0);
    }

    #[tokio::test]
    async fn unknown_callbacks_are_answered_not_failed() {
        let h = Harness::new();
        on_callback(&h.state, &sender(1), "cb", "reboot_all").await;
        assert_eq!(
            h.out.answers.lock().unwrap().as_slice(),
            &[Some("Unknown action".to_string())]
        );
        assert!(h.out.take().is_empty());
    }

    #[tokio::test]
    async fn inconsistencies_get_the_generic_reply() {
        let h = Harness::new();
        let chat = sender(1).chat_id;
        let orphan = Error::OwnershipInconsistency {
            kind: InconsistencyKind::Orphan,
            user_id: UserId(1),
            device_id: DeviceId(2),
            cause: Box::new(Error::Store("down".to_string())),
        };

        report_error(&h.state, chat, &orphan).await;
        report_error(&h.state, chat, &Error::Store("down".to_string())).await;

        let sent = h.out.take();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| m.html == FAILURE_TEXT));
    }
}
