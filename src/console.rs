//! Singleton console surfaces (settings and debug)
//!
//! Each console is an external process started from a configured shell
//! command. At most one process per kind is alive at a time.

use serde::{Deserialize, Serialize};
use std::process::{Child, Command, Stdio};

/// Handles that can report whether the thing they point at still exists
pub trait Liveness {
    fn is_alive(&mut self) -> bool;
}

/// Optional handle with a factory: zero or one live instance
#[derive(Debug)]
pub struct Singleton<T> {
    slot: Option<T>,
}

impl<T: Liveness> Singleton<T> {
    pub fn new() -> Self {
        Self { slot: None }
    }

    /// Live instance, discarding the registration if the handle died
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.slot.as_mut().is_some_and(|handle| !handle.is_alive()) {
            self.slot = None;
        }
        self.slot.as_mut()
    }

    /// Return the live instance, or build and register a new one.
    ///
    /// The boolean is `true` when the instance was created by this call.
    pub fn get_or_create<E>(
        &mut self,
        create: impl FnOnce() -> Result<T, E>,
    ) -> Result<(&mut T, bool), E> {
        let created = self.get_mut().is_none();
        let handle = match self.slot.take() {
            Some(existing) => self.slot.insert(existing),
            None => self.slot.insert(create()?),
        };
        Ok((handle, created))
    }

    pub fn replace(&mut self, value: T) -> Option<T> {
        self.slot.replace(value)
    }

    pub fn clear(&mut self) -> Option<T> {
        self.slot.take()
    }
}

impl<T: Liveness> Default for Singleton<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleKind {
    Settings,
    Debug,
}

impl ConsoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsoleKind::Settings => "settings",
            ConsoleKind::Debug => "debug",
        }
    }
}

pub struct ConsoleProcess {
    child: Child,
}

impl ConsoleProcess {
    fn spawn(command: &str) -> std::io::Result<Self> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .spawn()?;
        Ok(Self { child })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl Liveness for ConsoleProcess {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

impl Drop for ConsoleProcess {
    fn drop(&mut self) {
        // Reap an exited child; a running console is left alone.
        let _ = self.child.try_wait();
    }
}

/// Result of asking for a console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleOutcome {
    Spawned { pid: u32 },
    AlreadyOpen { pid: u32 },
    NotConfigured,
    Failed(String),
}

pub struct ConsoleLauncher {
    settings_command: Option<String>,
    debug_command: Option<String>,
    settings: Singleton<ConsoleProcess>,
    debug: Singleton<ConsoleProcess>,
}

impl ConsoleLauncher {
    pub fn new(settings_command: Option<String>, debug_command: Option<String>) -> Self {
        Self {
            settings_command,
            debug_command,
            settings: Singleton::new(),
            debug: Singleton::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    pub fn open(&mut self, kind: ConsoleKind) -> ConsoleOutcome {
        let (command, slot) = match kind {
            ConsoleKind::Settings => (self.settings_command.as_deref(), &mut self.settings),
            ConsoleKind::Debug => (self.debug_command.as_deref(), &mut self.debug),
        };

        let Some(command) = command else {
            return ConsoleOutcome::NotConfigured;
        };

        match slot.get_or_create(|| ConsoleProcess::spawn(command)) {
            Ok((process, true)) => ConsoleOutcome::Spawned { pid: process.pid() },
            Ok((process, false)) => ConsoleOutcome::AlreadyOpen { pid: process.pid() },
            Err(e) => ConsoleOutcome::Failed(e.to_string()),
        }
    }
}
