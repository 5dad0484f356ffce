//! Callback-data codec and messenger-neutral inline keyboards.

use std::fmt;

use crate::domain::{Device, DeviceId};

/// Everything an inline button can ask the bot to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BotAction {
    ListDevices,
    AddDevice,
    Device(DeviceId),
    Toggle(DeviceId),
    Delete(DeviceId),
    Help,
    MainMenu,
}

impl BotAction {
    /// Decode callback data. Unknown or malformed payloads give `None`.
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "list_devices" => return Some(BotAction::ListDevices),
            "add_device" => return Some(BotAction::AddDevice),
            "help" => return Some(BotAction::Help),
            "main_menu" => return Some(BotAction::MainMenu),
            _ => {}
        }

        let (prefix, id) = data.split_once('_')?;
        let id = DeviceId(id.parse::<i64>().ok()?);
        match prefix {
            "device" => Some(BotAction::Device(id)),
            "toggle" => Some(BotAction::Toggle(id)),
            "delete" => Some(BotAction::Delete(id)),
            _ => None,
        }
    }

    pub fn encode(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BotAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotAction::ListDevices => f.write_str("list_devices"),
            BotAction::AddDevice => f.write_str("add_device"),
            BotAction::Device(id) => write!(f, "device_{id}"),
            BotAction::Toggle(id) => write!(f, "toggle_{id}"),
            BotAction::Delete(id) => write!(f, "delete_{id}"),
            BotAction::Help => f.write_str("help"),
            BotAction::MainMenu => f.write_str("main_menu"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, action: BotAction) -> Self {
        Self {
            label: label.into(),
            callback_data: action.encode(),
        }
    }
}

/// Rows of inline buttons, one button per row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }

    pub fn main_menu() -> Self {
        Self::new(vec![
            InlineButton::new("📱 My devices", BotAction::ListDevices),
            InlineButton::new("➕ Add device", BotAction::AddDevice),
            InlineButton::new("ℹ️ Help", BotAction::Help),
        ])
    }

    /// One button per device, then "add" and "back".
    pub fn device_list(devices: &[Device], max_label_len: usize) -> Self {
        let mut buttons: Vec<InlineButton> = devices
            .iter()
            .map(|d| {
                let lamp = if d.active { "🟢" } else { "🔴" };
                InlineButton::new(
                    format!("{} ({lamp})", truncate_label(&d.title, max_label_len)),
                    BotAction::Device(d.device_id),
                )
            })
            .collect();
        buttons.push(InlineButton::new("➕ Add device", BotAction::AddDevice));
        buttons.push(InlineButton::new("🔙 Main menu", BotAction::MainMenu));
        Self::new(buttons)
    }

    pub fn device_card(device: &Device) -> Self {
        let toggle = if device.active {
            "🔴 Turn off"
        } else {
            "🟢 Turn on"
        };
        Self::new(vec![
            InlineButton::new(toggle, BotAction::Toggle(device.device_id)),
            InlineButton::new("🗑 Delete", BotAction::Delete(device.device_id)),
            InlineButton::new("🔙 Back to list", BotAction::ListDevices),
        ])
    }
}

fn truncate_label(label: &str, max_len: usize) -> String {
    if label.chars().count() > max_len {
        format!("{}...", label.chars().take(max_len).collect::<String>())
    } else {
        label.to_string()
    }
}
