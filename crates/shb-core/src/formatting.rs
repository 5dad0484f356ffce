//! Telegram HTML message bodies.

use crate::domain::Device;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn status_label(active: bool) -> &'static str {
    if active {
        "🟢 On"
    } else {
        "🔴 Off"
    }
}

pub const HELP_TEXT: &str = "📋 <b>Available commands:</b>\n\n\
/start - Start using the bot\n\
/help - Show this help\n\
/devices - Show your devices\n\
/add_device - Add a new device\n\
/menu - Show the main menu\n\
/cancel - Abort adding a device\n\n\
💡 Use the menu buttons for quick access.";

pub const MAIN_MENU_TEXT: &str = "🏠 <b>Main menu</b>\n\nChoose an action:";

const SEPARATOR: &str = "────────────────────";

/// Full card shown when a device is opened.
pub fn device_card(device: &Device) -> String {
    let description = if device.description.trim().is_empty() {
        "not set".to_string()
    } else {
        escape_html(&device.description)
    };
    format!(
        "<b>{}</b>\n\nID: {}\nDescription: {}\nAddress: {}\nStatus: {}\nCreated: {}",
        escape_html(&device.title),
        device.device_id,
        description,
        escape_html(&device.address),
        status_label(device.active),
        device.create_time.format("%Y-%m-%d %H:%M"),
    )
}

pub fn device_list(devices: &[Device]) -> String {
    if devices.is_empty() {
        return "📱 <b>Your devices</b>\n\nYou have no devices yet.\n\
                Use /add_device to add one."
            .to_string();
    }

    let mut out = String::from("📱 <b>Your devices:</b>\n\n");
    for d in devices {
        out.push_str(&format!("<b>{}</b>\nID: {}\n", escape_html(&d.title), d.device_id));
        if !d.description.trim().is_empty() {
            out.push_str(&format!("Description: {}\n", escape_html(&d.description)));
        }
        out.push_str(&format!(
            "Status: {}\nAddress: {}\n{SEPARATOR}\n",
            status_label(d.active),
            escape_html(&d.address)
        ));
    }
    out
}

pub fn device_created(device: &Device) -> String {
    format!(
        "✅ <b>Device added!</b>\n\nTitle: {}\nID: {}\nAddress: {}",
        escape_html(&device.title),
        device.device_id,
        escape_html(&device.address)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{now_naive, DeviceId};

    fn lamp(description: &str) -> Device {
        Device {
            device_id: DeviceId(4),
            title: "<Lamp & co>".to_string(),
            description: description.to_string(),
            address: "room \"1\"".to_string(),
            active: true,
            create_time: now_naive(),
        }
    }

    #[test]
    fn escapes_html() {
        assert_eq!(escape_html("<b>&\"x\"</b>"), "&lt;b&gt;&amp;&quot;x&quot;&lt;/b&gt;");
    }

    #[test]
    fn card_escapes_user_text() {
        let card = device_card(&lamp(""));
        assert!(card.starts_with("<b>&lt;Lamp &amp; co&gt;</b>"));
        assert!(card.contains("Description: not set"));
        assert!(card.contains("Address: room &quot;1&quot;"));
        assert!(card.contains("Status: 🟢 On"));
    }

    #[test]
    fn list_skips_empty_descriptions() {
        let text = device_list(&[lamp(""), lamp("by the bed")]);
        assert_eq!(text.matches("Description:").count(), 1);
        assert_eq!(text.matches(SEPARATOR).count(), 2);
        assert!(device_list(&[]).contains("no devices yet"));
    }
}
