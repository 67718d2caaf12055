//! Trigger state machine: at most one jumpscare episode at a time

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerState {
    #[default]
    Idle,
    Active,
}

impl TriggerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerState::Idle => "idle",
            TriggerState::Active => "active",
        }
    }
}

/// Why a trigger request was turned down
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BlockReason {
    Disabled,
    InProgress,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::Disabled => "disabled",
            BlockReason::InProgress => "in-progress",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    Blocked(BlockReason),
}

#[derive(Debug, Default)]
pub struct TriggerMachine {
    state: TriggerState,
}

impl TriggerMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TriggerState::Active
    }

    /// Decide a trigger request and move to `Active` on acceptance.
    ///
    /// `force` only bypasses the disabled check; an active episode always blocks.
    pub fn request(&mut self, enabled: bool, force: bool) -> Decision {
        if !enabled && !force {
            return Decision::Blocked(BlockReason::Disabled);
        }
        if self.is_active() {
            return Decision::Blocked(BlockReason::InProgress);
        }
        self.state = TriggerState::Active;
        Decision::Accepted
    }

    /// End the current episode. Returns the state before the call.
    pub fn complete(&mut self) -> TriggerState {
        std::mem::replace(&mut self.state, TriggerState::Idle)
    }
}
