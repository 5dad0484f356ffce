//! In-process bot harness: memory stores plus a messenger that records replies.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use shb_core::{
    actions::InlineKeyboard,
    config::Config,
    domain::{ChatId, UserId},
    ownership::OwnershipSynchronizer,
    ports::MessagingPort,
    store::memory::{MemoryDeviceStore, MemoryUserStore},
    Result,
};

use crate::router::AppState;

use super::Sender;

#[derive(Clone, Debug)]
pub(crate) struct Sent {
    pub chat_id: ChatId,
    pub html: String,
    pub keyboard: Option<InlineKeyboard>,
}

#[derive(Default)]
pub(crate) struct RecordingMessenger {
    pub sent: Mutex<Vec<Sent>>,
    pub answers: Mutex<Vec<Option<String>>>,
}

impl RecordingMessenger {
    pub fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn take_text(&self) -> String {
        self.take()
            .into_iter()
            .map(|s| s.html)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()> {
        self.sent.lock().unwrap().push(Sent {
            chat_id,
            html: html.to_string(),
            keyboard: None,
        });
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()> {
        self.sent.lock().unwrap().push(Sent {
            chat_id,
            html: html.to_string(),
            keyboard: Some(keyboard),
        });
        Ok(())
    }

    async fn answer_callback_query(&self, _callback_id: &str, text: Option<&str>) -> Result<()> {
        self.answers
            .lock()
            .unwrap()
            .push(text.map(|t| t.to_string()));
        Ok(())
    }
}

pub(crate) struct Harness {
    pub state: AppState,
    pub out: Arc<RecordingMessenger>,
}

impl Harness {
    pub fn new() -> Self {
        let cfg = Config::for_tests();
        let sync = Arc::new(OwnershipSynchronizer::new(
            Arc::new(MemoryDeviceStore::new()),
            Arc::new(MemoryUserStore::new()),
            cfg.sync_config(),
        ));
        let out = Arc::new(RecordingMessenger::default());
        let state = AppState::new(&cfg, sync, out.clone());
        Self { state, out }
    }
}

pub(crate) fn sender(user_id: i64) -> Sender {
    Sender {
        chat_id: ChatId(user_id),
        user_id: UserId(user_id),
        username: Some(format!("tester{user_id}")),
    }
}
