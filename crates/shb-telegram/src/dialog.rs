//! Per-chat add-device dialog: title, then description, then address.
//!
//! State lives in memory only; a restart drops half-finished dialogs.

use std::collections::HashMap;

use tokio::sync::Mutex;

use shb_core::{config::Config, domain::ChatId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DialogLimits {
    pub title: usize,
    pub description: usize,
    pub address: usize,
}

impl From<&Config> for DialogLimits {
    fn from(cfg: &Config) -> Self {
        Self {
            title: cfg.device_title_max_len,
            description: cfg.device_description_max_len,
            address: cfg.device_address_max_len,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Step {
    Title,
    Description { title: String },
    Address { title: String, description: String },
}

/// Everything needed to attach a device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceDraft {
    pub title: String,
    pub description: String,
    pub address: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Advance {
    /// No dialog is running in this chat.
    Idle,
    /// Input accepted; ask the next question.
    Next(&'static str),
    /// Input rejected; the same question stands.
    Retry(String),
    Done(DeviceDraft),
}

pub const ASK_TITLE: &str = "➕ <b>Adding a new device</b>\n\nEnter the device title:";
pub const ASK_DESCRIPTION: &str = "Enter the device description:";
pub const ASK_ADDRESS: &str = "Enter the device address (room, IP address, etc.):";

pub struct DialogStore {
    limits: DialogLimits,
    chats: Mutex<HashMap<ChatId, Step>>,
}

impl DialogStore {
    pub fn new(limits: DialogLimits) -> Self {
        Self {
            limits,
            chats: Mutex::new(HashMap::new()),
        }
    }

    /// Start (or restart) the dialog in `chat_id`.
    pub async fn begin(&self, chat_id: ChatId) -> &'static str {
        self.chats.lock().await.insert(chat_id, Step::Title);
        ASK_TITLE
    }

    /// Drop the dialog; true if one was running.
    pub async fn cancel(&self, chat_id: ChatId) -> bool {
        self.chats.lock().await.remove(&chat_id).is_some()
    }

    pub async fn is_active(&self, chat_id: ChatId) -> bool {
        self.chats.lock().await.contains_key(&chat_id)
    }

    /// Feed one user message into the dialog.
    pub async fn advance(&self, chat_id: ChatId, input: &str) -> Advance {
        let mut chats = self.chats.lock().await;
        let Some(step) = chats.remove(&chat_id) else {
            return Advance::Idle;
        };
        let input = input.trim();
        let limits = self.limits;

        let (next, outcome) = match step {
            Step::Title => {
                if input.is_empty() || too_long(input, limits.title) {
                    (
                        Some(Step::Title),
                        Advance::Retry(format!(
                            "❌ The title must be 1 to {} characters. Try again:",
                            limits.title
                        )),
                    )
                } else {
                    (
                        Some(Step::Description {
                            title: input.to_string(),
                        }),
                        Advance::Next(ASK_DESCRIPTION),
                    )
                }
            }
            Step::Description { title } => {
                if too_long(input, limits.description) {
                    (
                        Some(Step::Description { title }),
                        Advance::Retry(format!(
                            "❌ The description must be at most {} characters. Try again:",
                            limits.description
                        )),
                    )
                } else {
                    (
                        Some(Step::Address {
                            title,
                            description: input.to_string(),
                        }),
                        Advance::Next(ASK_ADDRESS),
                    )
                }
            }
            Step::Address { title, description } => {
                if input.is_empty() || too_long(input, limits.address) {
                    (
                        Some(Step::Address { title, description }),
                        Advance::Retry(format!(
                            "❌ The address must be 1 to {} characters. Try again:",
                            limits.address
                        )),
                    )
                } else {
                    (
                        None,
                        Advance::Done(DeviceDraft {
                            title,
                            description,
                            address: input.to_string(),
                        }),
                    )
                }
            }
        };

        if let Some(next) = next {
            chats.insert(chat_id, next);
        }
        outcome
    }
}

fn too_long(s: &str, max: usize) -> bool {
    s.chars().count() > max
}
