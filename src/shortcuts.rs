//! Global shortcuts through the XDG desktop portal

use anyhow::{Context, Result};
use ashpd::desktop::global_shortcuts::{GlobalShortcuts, NewShortcut};
use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;

pub const TOGGLE_SHORTCUT_ID: &str = "toggle-enabled";
pub const DEBUG_SHORTCUT_ID: &str = "open-debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    ToggleEnabled,
    OpenDebug,
}

impl HotkeyAction {
    pub fn from_shortcut_id(id: &str) -> Option<Self> {
        match id {
            TOGGLE_SHORTCUT_ID => Some(HotkeyAction::ToggleEnabled),
            DEBUG_SHORTCUT_ID => Some(HotkeyAction::OpenDebug),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShortcutConfig {
    pub toggle: String,
    pub debug: String,
}

/// Convert shortcut format: "CommandOrControl+Shift+J" -> "<Control><Shift>j"
pub fn convert_shortcut_format(shortcut: &str) -> String {
    let mut result = String::new();
    let parts: Vec<&str> = shortcut.split('+').collect();

    for (i, part) in parts.iter().enumerate() {
        let normalized = match part.trim() {
            "CommandOrControl" | "Ctrl" | "Control" => "<Control>",
            "Command" | "Super" | "Meta" => "<Super>",
            "Alt" => "<Alt>",
            "Shift" => "<Shift>",
            key => {
                if i == parts.len() - 1 {
                    result.push_str(&key.to_lowercase());
                }
                continue;
            }
        };
        result.push_str(normalized);
    }

    result
}

/// Bind both shortcuts and forward activations until the portal goes away.
///
/// Registration failure is returned to the caller; the service keeps
/// running without hotkeys.
pub async fn listen(config: ShortcutConfig, actions: UnboundedSender<HotkeyAction>) -> Result<()> {
    let proxy = GlobalShortcuts::new()
        .await
        .context("Failed to create GlobalShortcuts proxy")?;
    let session = proxy
        .create_session()
        .await
        .context("Failed to create session")?;

    let toggle = convert_shortcut_format(&config.toggle);
    let debug = convert_shortcut_format(&config.debug);
    let shortcuts = [
        NewShortcut::new(TOGGLE_SHORTCUT_ID, "Toggle random jumpscares")
            .preferred_trigger(Some(toggle.as_str())),
        NewShortcut::new(DEBUG_SHORTCUT_ID, "Open the debug console")
            .preferred_trigger(Some(debug.as_str())),
    ];

    let request = proxy
        .bind_shortcuts(&session, &shortcuts, None)
        .await
        .context("Failed to create bind request")?;
    request
        .response()
        .context("Failed to get portal response")?;

    log::info!(
        "Registered global shortcuts: {} toggles, {} opens debug",
        config.toggle,
        config.debug
    );

    let mut stream = proxy
        .receive_activated()
        .await
        .context("Failed to listen for shortcut activations")?;

    while let Some(activated) = stream.next().await {
        match HotkeyAction::from_shortcut_id(activated.shortcut_id()) {
            Some(action) => {
                if actions.send(action).is_err() {
                    break;
                }
            }
            None => log::debug!("Ignoring unknown shortcut {}", activated.shortcut_id()),
        }
    }

    drop(session);
    Ok(())
}

/// Run the listener in the background, logging instead of failing
pub fn spawn(config: ShortcutConfig, actions: UnboundedSender<HotkeyAction>) {
    tokio::spawn(async move {
        if let Err(e) = listen(config, actions).await {
            log::warn!(
                "Global shortcuts unavailable ({:#}); use `scarify toggle` and `scarify debug` instead",
                e
            );
        }
    });
}
