//! Startup configuration for the `service` subcommand

use crate::console::ConsoleLauncher;
use crate::settings::{Settings, SettingsStore, SettingsUpdate};
use crate::shortcuts::ShortcutConfig;
use crate::socket::{DEFAULT_SOCKET_PATH, expand_socket_path};
use crate::timer::TICK_INTERVAL;
use clap::Args;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Debug, Clone)]
pub struct ServiceConfig {
    /// Unix socket path
    #[arg(long, env = "SCARIFY_SOCKET_PATH", default_value = DEFAULT_SOCKET_PATH)]
    pub socket_path: String,

    /// A jumpscare fires with probability 1/N per tick
    #[arg(long, env = "SCARIFY_CHANCE_DENOMINATOR", default_value = "10000")]
    pub chance_denominator: f64,

    /// How long each overlay stays on screen
    #[arg(long, env = "SCARIFY_DURATION_MS", default_value = "2000")]
    pub duration_ms: f64,

    /// Ask overlays not to play audio
    #[arg(long, env = "SCARIFY_NO_AUDIO")]
    pub no_audio: bool,

    /// Start with random triggering switched off
    #[arg(long, env = "SCARIFY_START_DISABLED")]
    pub start_disabled: bool,

    /// Interval between random rolls, in milliseconds
    #[arg(long, env = "SCARIFY_TICK_MS", default_value_t = TICK_INTERVAL.as_millis() as u64)]
    pub tick_ms: u64,

    #[arg(long, env = "SCARIFY_TOGGLE_SHORTCUT", default_value = "CommandOrControl+Shift+J")]
    pub toggle_shortcut: String,

    #[arg(long, env = "SCARIFY_DEBUG_SHORTCUT", default_value = "CommandOrControl+Shift+D")]
    pub debug_shortcut: String,

    /// Skip global shortcut registration
    #[arg(long, env = "SCARIFY_NO_SHORTCUTS")]
    pub no_shortcuts: bool,

    /// Shell command that opens the settings console
    #[arg(long, env = "SCARIFY_SETTINGS_CONSOLE")]
    pub settings_console: Option<String>,

    /// Shell command that opens the debug console
    #[arg(long, env = "SCARIFY_DEBUG_CONSOLE")]
    pub debug_console: Option<String>,
}

impl ServiceConfig {
    pub fn socket_path(&self) -> PathBuf {
        PathBuf::from(expand_socket_path(&self.socket_path))
    }

    /// Initial settings, coerced through the same path as runtime updates
    pub fn initial_settings(&self) -> Settings {
        let mut store = SettingsStore::new(Settings::default());
        store.update(&SettingsUpdate {
            chance_denominator: Some(json!(self.chance_denominator)),
            duration_ms: Some(json!(self.duration_ms)),
            audio_enabled: Some(json!(!self.no_audio)),
            enabled: Some(json!(!self.start_disabled)),
        })
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn shortcuts(&self) -> Option<ShortcutConfig> {
        if self.no_shortcuts {
            return None;
        }
        Some(ShortcutConfig {
            toggle: self.toggle_shortcut.clone(),
            debug: self.debug_shortcut.clone(),
        })
    }

    pub fn consoles(&self) -> ConsoleLauncher {
        ConsoleLauncher::new(self.settings_console.clone(), self.debug_console.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: ServiceConfig,
    }

    fn parse(args: &[&str]) -> ServiceConfig {
        let mut argv = vec!["scarify"];
        argv.extend_from_slice(args);
        TestCli::parse_from(argv).config
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.initial_settings(), Settings::default());
        assert_eq!(config.tick_interval(), Duration::from_millis(1000));
        assert!(config.shortcuts().is_some());
    }

    #[test]
    fn test_initial_settings_are_coerced() {
        let config = parse(&[
            "--chance-denominator",
            "0.2",
            "--duration-ms=-5",
            "--no-audio",
            "--start-disabled",
        ]);
        let settings = config.initial_settings();
        assert_eq!(settings.chance_denominator, 1);
        assert_eq!(settings.duration_ms, 100);
        assert!(!settings.audio_enabled);
        assert!(!settings.enabled);
    }

    #[test]
    fn test_tick_interval_floor() {
        let config = parse(&["--tick-ms", "0"]);
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_no_shortcuts() {
        let config = parse(&["--no-shortcuts"]);
        assert!(config.shortcuts().is_none());
    }
}
