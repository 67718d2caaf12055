use crate::debug_log::DebugLogEntry;
use crate::orchestrator::{DebugStatus, TriggerOutcome};
use crate::settings::{Settings, SettingsUpdate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from clients (consoles, CLI, external overlays) to the service
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Manual test trigger (bypasses the disabled check)
    Trigger { id: Uuid },
    /// An overlay finished its episode
    Complete { id: Uuid },
    GetSettings { id: Uuid },
    UpdateSettings {
        id: Uuid,
        #[serde(default)]
        update: SettingsUpdate,
    },
    GetDebugLogs { id: Uuid },
    GetDebugStatus { id: Uuid },
    /// Become the debug observer; entries are pushed until disconnect
    SubscribeDebug { id: Uuid },
    /// Client-side failure to record in the debug log
    ReportError {
        id: Uuid,
        #[serde(default)]
        info: serde_json::Value,
    },
    ToggleEnabled { id: Uuid },
    OpenDebug { id: Uuid },
    OpenSettings { id: Uuid },
}

impl ClientMessage {
    pub fn id(&self) -> Uuid {
        match self {
            ClientMessage::Trigger { id }
            | ClientMessage::Complete { id }
            | ClientMessage::GetSettings { id }
            | ClientMessage::UpdateSettings { id, .. }
            | ClientMessage::GetDebugLogs { id }
            | ClientMessage::GetDebugStatus { id }
            | ClientMessage::SubscribeDebug { id }
            | ClientMessage::ReportError { id, .. }
            | ClientMessage::ToggleEnabled { id }
            | ClientMessage::OpenDebug { id }
            | ClientMessage::OpenSettings { id } => *id,
        }
    }

    pub fn new_trigger() -> Self {
        ClientMessage::Trigger { id: Uuid::new_v4() }
    }

    pub fn new_complete() -> Self {
        ClientMessage::Complete { id: Uuid::new_v4() }
    }

    pub fn new_get_settings() -> Self {
        ClientMessage::GetSettings { id: Uuid::new_v4() }
    }

    pub fn new_update_settings(update: SettingsUpdate) -> Self {
        ClientMessage::UpdateSettings {
            id: Uuid::new_v4(),
            update,
        }
    }

    pub fn new_get_debug_logs() -> Self {
        ClientMessage::GetDebugLogs { id: Uuid::new_v4() }
    }

    pub fn new_get_debug_status() -> Self {
        ClientMessage::GetDebugStatus { id: Uuid::new_v4() }
    }

    pub fn new_subscribe_debug() -> Self {
        ClientMessage::SubscribeDebug { id: Uuid::new_v4() }
    }

    pub fn new_report_error(info: serde_json::Value) -> Self {
        ClientMessage::ReportError {
            id: Uuid::new_v4(),
            info,
        }
    }

    pub fn new_toggle_enabled() -> Self {
        ClientMessage::ToggleEnabled { id: Uuid::new_v4() }
    }

    pub fn new_open_debug() -> Self {
        ClientMessage::OpenDebug { id: Uuid::new_v4() }
    }

    pub fn new_open_settings() -> Self {
        ClientMessage::OpenSettings { id: Uuid::new_v4() }
    }
}

/// Messages sent from the service to clients
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Fire-and-forget request was queued
    Ack { id: Uuid },
    TriggerResult { id: Uuid, outcome: TriggerOutcome },
    Settings { id: Uuid, settings: Settings },
    DebugLogs {
        id: Uuid,
        entries: Vec<DebugLogEntry>,
    },
    DebugStatus { id: Uuid, status: DebugStatus },
    Subscribed { id: Uuid },
    /// Pushed to the debug observer for each new log entry
    DebugEntry { entry: DebugLogEntry },
    Error { id: Uuid, error: String },
    Enabled { id: Uuid, enabled: bool },
}

impl ServerMessage {
    pub fn new_error(id: Uuid, error: impl Into<String>) -> Self {
        ServerMessage::Error {
            id,
            error: error.into(),
        }
    }
}
