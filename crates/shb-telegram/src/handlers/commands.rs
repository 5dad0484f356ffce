use shb_core::Result;

use crate::router::AppState;

use super::{devices, Sender};

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub(super) async fn handle_command(state: &AppState, who: &Sender, text: &str) -> Result<()> {
    let (cmd, _args) = parse_command(text);
    match cmd.as_str() {
        "start" => devices::start(state, who).await,
        "help" => devices::show_help(state, who).await,
        "menu" => devices::show_main_menu(state, who).await,
        "devices" => devices::show_devices(state, who).await,
        "add_device" => devices::begin_add(state, who).await,
        "cancel" => devices::cancel_add(state, who).await,
        _ => {
            state
                .messenger
                .send_html(who.chat_id, "Unknown command. Use /help to see what I can do.")
                .await
        }
    }
}
