//! Requests into the service loop
//!
//! Connection tasks never touch core state. They send a `Command` to the
//! loop that owns the orchestrator and await the reply on a oneshot channel.

use crate::console::ConsoleKind;
use crate::debug_log::DebugLogEntry;
use crate::display::SurfaceFactory;
use crate::orchestrator::{DebugStatus, Orchestrator, TriggerOutcome};
use crate::settings::{Settings, SettingsUpdate};
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

type Reply<T> = oneshot::Sender<T>;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service loop has stopped")]
    Stopped,
    #[error("Service dropped the request without replying")]
    NoReply,
}

pub enum Command {
    /// Manual test trigger, always forced
    Trigger { reply: Reply<TriggerOutcome> },
    Complete,
    GetSettings { reply: Reply<Settings> },
    UpdateSettings {
        update: SettingsUpdate,
        reply: Reply<Settings>,
    },
    GetDebugLogs { reply: Reply<Vec<DebugLogEntry>> },
    GetDebugStatus { reply: Reply<DebugStatus> },
    SubscribeDebug {
        reply: Reply<UnboundedReceiver<DebugLogEntry>>,
    },
    ReportError { info: serde_json::Value },
    ToggleEnabled { reply: Reply<bool> },
    OpenConsole { kind: ConsoleKind },
}

impl Command {
    /// Run the command against the core, replying if a reply was requested
    pub fn apply<F: SurfaceFactory>(self, core: &mut Orchestrator<F>) {
        // A closed reply channel means the client went away; nothing to do.
        match self {
            Command::Trigger { reply } => {
                let _ = reply.send(core.manual_trigger());
            }
            Command::Complete => core.report_complete(),
            Command::GetSettings { reply } => {
                let _ = reply.send(core.settings());
            }
            Command::UpdateSettings { update, reply } => {
                let _ = reply.send(core.update_settings(&update));
            }
            Command::GetDebugLogs { reply } => {
                let _ = reply.send(core.debug_logs());
            }
            Command::GetDebugStatus { reply } => {
                let _ = reply.send(core.debug_status());
            }
            Command::SubscribeDebug { reply } => {
                let _ = reply.send(core.subscribe_debug());
            }
            Command::ReportError { info } => core.report_client_error(info),
            Command::ToggleEnabled { reply } => {
                let _ = reply.send(core.toggle_enabled());
            }
            Command::OpenConsole { kind } => {
                core.open_console(kind);
            }
        }
    }
}

/// Cloneable sender side used by connection tasks
#[derive(Clone)]
pub struct ServiceHandle {
    tx: UnboundedSender<Command>,
}

impl ServiceHandle {
    pub fn new(tx: UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    fn send(&self, command: Command) -> Result<(), ServiceError> {
        self.tx.send(command).map_err(|_| ServiceError::Stopped)
    }

    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply))?;
        rx.await.map_err(|_| ServiceError::NoReply)
    }

    pub async fn request_trigger(&self) -> Result<TriggerOutcome, ServiceError> {
        self.call(|reply| Command::Trigger { reply }).await
    }

    pub fn report_complete(&self) -> Result<(), ServiceError> {
        self.send(Command::Complete)
    }

    pub async fn get_settings(&self) -> Result<Settings, ServiceError> {
        self.call(|reply| Command::GetSettings { reply }).await
    }

    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<Settings, ServiceError> {
        self.call(|reply| Command::UpdateSettings { update, reply })
            .await
    }

    pub async fn debug_logs(&self) -> Result<Vec<DebugLogEntry>, ServiceError> {
        self.call(|reply| Command::GetDebugLogs { reply }).await
    }

    pub async fn debug_status(&self) -> Result<DebugStatus, ServiceError> {
        self.call(|reply| Command::GetDebugStatus { reply }).await
    }

    pub async fn subscribe_debug(
        &self,
    ) -> Result<UnboundedReceiver<DebugLogEntry>, ServiceError> {
        self.call(|reply| Command::SubscribeDebug { reply }).await
    }

    pub fn report_error(&self, info: serde_json::Value) -> Result<(), ServiceError> {
        self.send(Command::ReportError { info })
    }

    pub async fn toggle_enabled(&self) -> Result<bool, ServiceError> {
        self.call(|reply| Command::ToggleEnabled { reply }).await
    }

    pub fn open_console(&self, kind: ConsoleKind) -> Result<(), ServiceError> {
        self.send(Command::OpenConsole { kind })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ConsoleLauncher;
    use crate::display::testing::FakeFactory;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn test_handle_round_trip() {
        let (tx, mut rx) = unbounded_channel();
        let handle = ServiceHandle::new(tx);
        let mut core = Orchestrator::new(
            FakeFactory::default(),
            Settings::default(),
            ConsoleLauncher::disabled(),
        );

        let client = async {
            let outcome = handle.request_trigger().await.unwrap();
            handle.report_complete().unwrap();
            let status = handle.debug_status().await.unwrap();
            (outcome, status)
        };
        let driver = async {
            while let Some(command) = rx.recv().await {
                command.apply(&mut core);
            }
        };

        let (outcome, status) = tokio::select! {
            result = client => result,
            _ = driver => unreachable!("driver ends only when senders drop"),
        };
        assert!(outcome.accepted);
        assert!(!status.active);

        let logs = core.debug_logs();
        assert!(logs.iter().any(|e| e.message == "Manual test trigger"));
    }

    #[tokio::test]
    async fn test_stopped_service() {
        let (tx, rx) = unbounded_channel();
        drop(rx);
        let handle = ServiceHandle::new(tx);
        assert!(matches!(
            handle.get_settings().await,
            Err(ServiceError::Stopped)
        ));
    }
}
