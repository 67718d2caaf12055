//! Core state owner
//!
//! The orchestrator holds every piece of mutable process state (settings,
//! trigger state, overlay surfaces, debug log, console handles) and exposes
//! the operations the service loop dispatches to. It is owned by a single
//! task, so none of these fields need synchronization.

use crate::console::{ConsoleKind, ConsoleLauncher, ConsoleOutcome};
use crate::debug_log::{DebugLog, DebugLogEntry, LogKind};
use crate::display::{Display, DisplayId, DisplayRegistry, ShowCommand, SurfaceFactory};
use crate::settings::{Settings, SettingsStore, SettingsUpdate};
use crate::timer::Roll;
use crate::trigger::{BlockReason, Decision, TriggerMachine, TriggerState};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

/// Answer to a trigger request
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerOutcome {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<BlockReason>,
    pub surfaces: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DebugStatus {
    pub active: bool,
    pub enabled: bool,
    pub surface_count: usize,
    pub settings: Settings,
}

pub struct Orchestrator<F: SurfaceFactory> {
    settings: SettingsStore,
    trigger: TriggerMachine,
    displays: DisplayRegistry<F>,
    log: DebugLog,
    consoles: ConsoleLauncher,
}

impl<F: SurfaceFactory> Orchestrator<F> {
    pub fn new(factory: F, settings: Settings, consoles: ConsoleLauncher) -> Self {
        Self {
            settings: SettingsStore::new(settings),
            trigger: TriggerMachine::new(),
            displays: DisplayRegistry::new(factory),
            log: DebugLog::new(),
            consoles,
        }
    }

    pub fn trigger_state(&self) -> TriggerState {
        self.trigger.state()
    }

    pub fn surface_count(&self) -> usize {
        self.displays.len()
    }

    /// Start an episode on every display if policy allows it
    pub fn request_trigger(&mut self, force: bool) -> TriggerOutcome {
        let enabled = self.settings.enabled();
        let state = self.trigger.state();

        match self.trigger.request(enabled, force) {
            Decision::Blocked(reason) => {
                log::debug!("Trigger blocked: {}", reason.as_str());
                self.log.append(
                    LogKind::Info,
                    format!("Trigger blocked: {}", reason.as_str()),
                    Some(json!({
                        "enabled": enabled,
                        "force": force,
                        "state": state.as_str(),
                    })),
                );
                TriggerOutcome {
                    accepted: false,
                    reason: Some(reason),
                    surfaces: self.displays.len(),
                }
            }
            Decision::Accepted => {
                let settings = self.settings.get();
                let command = ShowCommand {
                    duration_ms: settings.duration_ms,
                    audio_enabled: settings.audio_enabled,
                };
                let surfaces = self.displays.broadcast(&command);
                log::info!("Jumpscare triggered on {} surface(s)", surfaces);
                self.log.append(
                    LogKind::Trigger,
                    "Jumpscare triggered",
                    Some(json!({
                        "enabled": enabled,
                        "force": force,
                        "state": state.as_str(),
                        "surfaces": surfaces,
                        "durationMs": command.duration_ms,
                        "audioEnabled": command.audio_enabled,
                    })),
                );
                TriggerOutcome {
                    accepted: true,
                    reason: None,
                    surfaces,
                }
            }
        }
    }

    /// Trigger requested by a person (test action), bypassing the disabled check
    pub fn manual_trigger(&mut self) -> TriggerOutcome {
        log::info!("Manual test trigger");
        self.log.append(LogKind::Info, "Manual test trigger", None);
        self.request_trigger(true)
    }

    /// End the current episode regardless of which surface finished
    pub fn report_complete(&mut self) {
        let previous = self.trigger.complete();
        self.log.append(
            LogKind::Info,
            "Jumpscare completed",
            Some(json!({
                "enabled": self.settings.enabled(),
                "state": previous.as_str(),
            })),
        );
    }

    /// One timer fire. Returns the roll when the system was armed.
    pub fn tick<R: Rng>(&mut self, rng: &mut R) -> Option<Roll> {
        if !self.settings.enabled() {
            return None;
        }
        let roll = Roll::draw(rng, self.settings.get().chance_denominator);
        self.apply_roll(roll);
        Some(roll)
    }

    pub fn apply_roll(&mut self, roll: Roll) {
        let data = Some(json!({ "roll": roll.roll, "chance": roll.chance }));
        if roll.success {
            self.log.append(LogKind::Info, "Roll success", data);
            self.request_trigger(false);
        } else {
            self.log.append(LogKind::Tick, "Periodic roll check", data);
        }
    }

    pub fn settings(&self) -> Settings {
        self.settings.get()
    }

    pub fn update_settings(&mut self, update: &SettingsUpdate) -> Settings {
        let was_enabled = self.settings.enabled();
        let settings = self.settings.update(update);
        self.log.append(
            LogKind::Info,
            "Settings updated",
            serde_json::to_value(settings).ok(),
        );
        if was_enabled != settings.enabled {
            log::info!("Jumpscare status changed: {}", settings.enabled);
        }
        settings
    }

    /// Flip the armed flag; an episode already showing is left alone
    pub fn toggle_enabled(&mut self) -> bool {
        let enabled = !self.settings.enabled();
        self.settings.set_enabled(enabled);
        log::info!("Jumpscare status changed: {}", enabled);
        self.log
            .append(LogKind::Info, format!("Jumpscare status changed: {}", enabled), None);
        enabled
    }

    pub fn sync_displays(&mut self, live: &[Display]) {
        let report = self.displays.sync(live);
        for (id, error) in &report.failed {
            log::error!("Failed to create overlay for display {}: {}", id, error);
            self.log.append(
                LogKind::Error,
                "Overlay creation failed",
                Some(json!({ "display": id, "error": error })),
            );
        }
        if !report.is_noop() || !report.updated.is_empty() {
            log::info!(
                "Displays synced: {} created, {} removed, {} updated, {} surface(s)",
                report.created.len(),
                report.removed.len(),
                report.updated.len(),
                self.displays.len()
            );
            self.log.append(
                LogKind::Info,
                "Displays synced",
                Some(json!({
                    "created": report.created,
                    "removed": report.removed,
                    "updated": report.updated,
                    "surfaces": self.displays.len(),
                })),
            );
        }
    }

    pub fn debug_logs(&self) -> Vec<DebugLogEntry> {
        self.log.snapshot()
    }

    pub fn debug_status(&self) -> DebugStatus {
        let settings = self.settings.get();
        DebugStatus {
            active: self.trigger.is_active(),
            enabled: settings.enabled,
            surface_count: self.displays.len(),
            settings,
        }
    }

    pub fn subscribe_debug(&mut self) -> UnboundedReceiver<DebugLogEntry> {
        let rx = self.log.attach();
        self.log.append(LogKind::Info, "Debug observer attached", None);
        rx
    }

    /// Failure observed by a client or a surface
    pub fn report_client_error(&mut self, info: serde_json::Value) {
        log::warn!("Renderer error reported: {}", info);
        self.log
            .append(LogKind::Error, "Renderer error reported", Some(info));
    }

    pub fn report_surface_error(&mut self, display: DisplayId, message: &str) {
        self.report_client_error(json!({ "display": display, "message": message }));
    }

    /// The backend dropped a surface on its own; forget it so `sync()` rebuilds it
    pub fn surface_lost(&mut self, display: DisplayId, message: &str) {
        let tracked = self.displays.forget(display);
        log::warn!("Overlay for display {} lost: {}", display, message);
        self.log.append(
            LogKind::Error,
            "Overlay lost",
            Some(json!({
                "display": display,
                "message": message,
                "tracked": tracked,
                "surfaces": self.displays.len(),
            })),
        );
    }

    /// Fault caught at the service boundary
    pub fn record_fault(&mut self, message: &str, stack: Option<String>) {
        log::error!("Core fault: {}", message);
        self.log.append(
            LogKind::Error,
            "Core fault",
            Some(json!({ "message": message, "stack": stack })),
        );
    }

    pub fn open_console(&mut self, kind: ConsoleKind) -> ConsoleOutcome {
        let outcome = self.consoles.open(kind);
        let name = kind.as_str();
        match &outcome {
            ConsoleOutcome::Spawned { pid } => {
                log::info!("Opened {} console (pid {})", name, pid);
                self.log.append(
                    LogKind::Info,
                    format!("Opened {} console", name),
                    Some(json!({ "pid": pid })),
                );
            }
            ConsoleOutcome::AlreadyOpen { pid } => {
                self.log.append(
                    LogKind::Info,
                    format!("{} console already open", name),
                    Some(json!({ "pid": pid })),
                );
            }
            ConsoleOutcome::NotConfigured => {
                log::warn!("No {} console command configured", name);
                self.log.append(
                    LogKind::Warn,
                    format!("No {} console command configured", name),
                    None,
                );
            }
            ConsoleOutcome::Failed(error) => {
                log::error!("Failed to open {} console: {}", name, error);
                self.log.append(
                    LogKind::Error,
                    format!("Failed to open {} console", name),
                    Some(json!({ "error": error })),
                );
            }
        }
        outcome
    }

    pub fn shutdown(&mut self) {
        self.log.append(LogKind::Info, "Shutting down", None);
        self.displays.close_all();
    }
}
