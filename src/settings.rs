//! Volatile jumpscare settings with coercing partial updates

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_CHANCE_DENOMINATOR: u64 = 10_000;
pub const DEFAULT_DURATION_MS: u64 = 2_000;
pub const MIN_DURATION_MS: u64 = 100;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Reciprocal of the per-tick trigger probability (>= 1)
    pub chance_denominator: u64,
    /// How long each overlay stays up (>= 100)
    pub duration_ms: u64,
    pub audio_enabled: bool,
    /// Armed for autonomous triggers
    pub enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chance_denominator: DEFAULT_CHANCE_DENOMINATOR,
            duration_ms: DEFAULT_DURATION_MS,
            audio_enabled: true,
            enabled: true,
        }
    }
}

/// Partial update as received from a client.
///
/// Fields stay as raw JSON so a wrong-typed field can be skipped instead of
/// failing the whole request.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chance_denominator: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_enabled: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<Value>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.chance_denominator.is_none()
            && self.duration_ms.is_none()
            && self.audio_enabled.is_none()
            && self.enabled.is_none()
    }
}

pub struct SettingsStore {
    current: Settings,
}

impl SettingsStore {
    pub fn new(initial: Settings) -> Self {
        let mut store = Self {
            current: Settings::default(),
        };
        // Route the initial values through the same coercion as client updates.
        store.update(&SettingsUpdate {
            chance_denominator: Some(initial.chance_denominator.into()),
            duration_ms: Some(initial.duration_ms.into()),
            audio_enabled: Some(initial.audio_enabled.into()),
            enabled: Some(initial.enabled.into()),
        });
        store
    }

    pub fn get(&self) -> Settings {
        self.current
    }

    pub fn enabled(&self) -> bool {
        self.current.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.current.enabled = enabled;
    }

    /// Apply every present, correctly typed field and return the result
    pub fn update(&mut self, update: &SettingsUpdate) -> Settings {
        if let Some(value) = update.chance_denominator.as_ref().and_then(rounded_at_least(1)) {
            self.current.chance_denominator = value;
        }
        if let Some(value) = update
            .duration_ms
            .as_ref()
            .and_then(rounded_at_least(MIN_DURATION_MS))
        {
            self.current.duration_ms = value;
        }
        if let Some(value) = update.audio_enabled.as_ref().and_then(Value::as_bool) {
            self.current.audio_enabled = value;
        }
        if let Some(value) = update.enabled.as_ref().and_then(Value::as_bool) {
            self.current.enabled = value;
        }
        self.current
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

fn rounded_at_least(floor: u64) -> impl Fn(&Value) -> Option<u64> {
    move |value| {
        let number = value.as_f64()?;
        if !number.is_finite() {
            return None;
        }
        // Float-to-int `as` saturates, so huge values land on u64::MAX.
        Some((number.round().max(floor as f64)) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn update_from(value: Value) -> SettingsUpdate {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_chance_denominator_floor() {
        let mut store = SettingsStore::default();
        let settings = store.update(&update_from(json!({"chanceDenominator": 0})));
        assert_eq!(settings.chance_denominator, 1);

        let settings = store.update(&update_from(json!({"chanceDenominator": -40})));
        assert_eq!(settings.chance_denominator, 1);
    }

    #[test]
    fn test_duration_floor() {
        let mut store = SettingsStore::default();
        let settings = store.update(&update_from(json!({"durationMs": 50})));
        assert_eq!(settings.duration_ms, 100);
    }

    #[test]
    fn test_rounding() {
        let mut store = SettingsStore::default();
        let settings = store.update(&update_from(json!({
            "chanceDenominator": 12.6,
            "durationMs": 1500.4
        })));
        assert_eq!(settings.chance_denominator, 13);
        assert_eq!(settings.duration_ms, 1500);
    }

    #[test]
    fn test_wrong_types_are_ignored() {
        let mut store = SettingsStore::default();
        let before = store.get();
        let after = store.update(&update_from(json!({
            "chanceDenominator": "5",
            "durationMs": null,
            "audioEnabled": 1,
            "enabled": "false"
        })));
        assert_eq!(before, after);
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let mut store = SettingsStore::default();
        let settings = store.update(&update_from(json!({"audioEnabled": false})));
        assert!(!settings.audio_enabled);
        assert_eq!(settings.chance_denominator, DEFAULT_CHANCE_DENOMINATOR);
        assert_eq!(settings.duration_ms, DEFAULT_DURATION_MS);
        assert!(settings.enabled);
    }

    #[test]
    fn test_no_ceiling() {
        let mut store = SettingsStore::default();
        let settings = store.update(&update_from(json!({"durationMs": 86_400_000u64})));
        assert_eq!(settings.duration_ms, 86_400_000);
    }

    #[test]
    fn test_initial_settings_are_coerced() {
        let store = SettingsStore::new(Settings {
            chance_denominator: 0,
            duration_ms: 10,
            audio_enabled: false,
            enabled: false,
        });
        let settings = store.get();
        assert_eq!(settings.chance_denominator, 1);
        assert_eq!(settings.duration_ms, MIN_DURATION_MS);
        assert!(!settings.enabled);
    }

    #[test]
    fn test_camel_case_wire_format() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["chanceDenominator"], 10_000);
        assert_eq!(json["durationMs"], 2_000);
        assert_eq!(json["audioEnabled"], true);
        assert_eq!(json["enabled"], true);
    }
}
