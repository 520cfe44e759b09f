use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{FanMode, HvacMode};

pub const DEFAULT_TARGET_TEMP_C: i32 = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub boot_settle_ms: u64,
    pub debounce_ms: u64,
    pub min_reconcile_interval_ms: u64,
    pub state_publish_interval_ms: u64,
    pub min_temp_c: i32,
    pub max_temp_c: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            boot_settle_ms: 2_000,
            debounce_ms: 1_000,
            min_reconcile_interval_ms: 2_000,
            state_publish_interval_ms: 10_000,
            min_temp_c: 16,
            max_temp_c: 30,
        }
    }
}

impl EngineConfig {
    pub fn sanitize(&mut self) {
        self.boot_settle_ms = self.boot_settle_ms.min(60_000);
        self.debounce_ms = self.debounce_ms.clamp(50, 60_000);
        self.min_reconcile_interval_ms = self.min_reconcile_interval_ms.min(600_000);
        self.state_publish_interval_ms = self.state_publish_interval_ms.max(1_000);
        if self.min_temp_c > self.max_temp_c {
            std::mem::swap(&mut self.min_temp_c, &mut self.max_temp_c);
        }
    }
}

/// Raw tokens a power sensor reports. Matching is case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PowerTokens {
    pub on: Vec<String>,
    pub off: Vec<String>,
}

impl Default for PowerTokens {
    fn default() -> Self {
        Self {
            on: vec!["on".to_string(), "true".to_string(), "ligado".to_string()],
            off: vec![
                "off".to_string(),
                "false".to_string(),
                "desligado".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SensorBinding {
    pub entity_id: String,
    pub state_topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum TransportConfig {
    Broadlink {
        #[serde(default)]
        controller: String,
        #[serde(default)]
        controlled_device: String,
        #[serde(default = "default_broadlink_topic")]
        command_topic: String,
    },
    Qa {
        #[serde(default)]
        qa_profile: String,
        #[serde(default)]
        controlled_device: String,
        #[serde(default)]
        qa_entity: String,
        #[serde(default = "default_qa_topic")]
        command_topic: String,
    },
}

fn default_broadlink_topic() -> String {
    "irclimate/remote/send_command".to_string()
}

fn default_qa_topic() -> String {
    "irclimate/qa/send_command".to_string()
}

impl TransportConfig {
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Broadlink { .. } => "broadlink",
            Self::Qa { .. } => "qa",
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required: Vec<(&'static str, &str)> = match self {
            Self::Broadlink {
                controller,
                controlled_device,
                command_topic,
            } => vec![
                ("controller", controller.as_str()),
                ("controlled_device", controlled_device.as_str()),
                ("command_topic", command_topic.as_str()),
            ],
            Self::Qa {
                qa_profile,
                controlled_device,
                qa_entity,
                command_topic,
            } => vec![
                ("qa_profile", qa_profile.as_str()),
                ("controlled_device", controlled_device.as_str()),
                ("qa_entity", qa_entity.as_str()),
                ("command_topic", command_topic.as_str()),
            ],
        };

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingTransportParameter {
                    backend: self.backend(),
                    field,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{backend} transport is missing required parameter '{field}'")]
    MissingTransportParameter {
        backend: &'static str,
        field: &'static str,
    },
    #[error("climate name must not be empty")]
    EmptyName,
    #[error("duplicate climate name '{0}'")]
    DuplicateName(String),
    #[error("climate name '{0}' must not contain '/', '+' or '#'")]
    InvalidName(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClimateConfig {
    pub name: String,
    #[serde(default = "default_hvac_modes")]
    pub hvac_modes: Vec<HvacMode>,
    #[serde(default = "default_fan_modes")]
    pub fan_modes: Vec<FanMode>,
    #[serde(default)]
    pub temp_sensor: Option<SensorBinding>,
    #[serde(default)]
    pub power_sensor: Option<SensorBinding>,
    #[serde(default)]
    pub power_tokens: PowerTokens,
    pub transport: TransportConfig,
}

/// Maps a climate name to its state file stem: anything outside
/// `[A-Za-z0-9_-]` becomes `_`.
pub fn storage_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn dedup_in_order<T: PartialEq + Clone>(items: &mut Vec<T>) {
    let mut seen: Vec<T> = Vec::with_capacity(items.len());
    items.retain(|item| {
        if seen.contains(item) {
            return false;
        }
        seen.push(item.clone());
        true
    });
}

fn default_hvac_modes() -> Vec<HvacMode> {
    HvacMode::ALL.to_vec()
}

fn default_fan_modes() -> Vec<FanMode> {
    FanMode::known().to_vec()
}

impl ClimateConfig {
    pub fn new(name: impl Into<String>, transport: TransportConfig) -> Self {
        Self {
            name: name.into(),
            hvac_modes: default_hvac_modes(),
            fan_modes: default_fan_modes(),
            temp_sensor: None,
            power_sensor: None,
            power_tokens: PowerTokens::default(),
            transport,
        }
    }

    pub fn supports_mode(&self, mode: HvacMode) -> bool {
        self.hvac_modes.contains(&mode)
    }

    /// File-system safe key for the state store. Distinct climates must
    /// not share a key.
    pub fn storage_key(&self) -> String {
        storage_key(&self.name)
    }

    /// Empty allowed sets fall back to the full tables; OFF is always offered.
    pub fn sanitize(&mut self) {
        if self.hvac_modes.is_empty() {
            self.hvac_modes = default_hvac_modes();
        }
        if !self.hvac_modes.contains(&HvacMode::Off) {
            self.hvac_modes.insert(0, HvacMode::Off);
        }
        dedup_in_order(&mut self.hvac_modes);

        if self.fan_modes.is_empty() {
            self.fan_modes = default_fan_modes();
        }
        dedup_in_order(&mut self.fan_modes);

        if self.power_tokens.on.is_empty() {
            self.power_tokens.on = PowerTokens::default().on;
        }
        if self.power_tokens.off.is_empty() {
            self.power_tokens.off = PowerTokens::default().off;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub client_id: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            client_id: "irclimate-controller".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub climates: Vec<ClimateConfig>,
}

impl RuntimeConfig {
    /// Drops climates that cannot be addressed and reports why.
    pub fn sanitize(&mut self) -> Vec<ConfigError> {
        self.engine.sanitize();

        let mut errors = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        self.climates.retain_mut(|climate| {
            if climate.name.trim().is_empty() {
                errors.push(ConfigError::EmptyName);
                return false;
            }
            // Names become MQTT topic levels.
            if climate.name.contains(['/', '+', '#']) {
                errors.push(ConfigError::InvalidName(climate.name.clone()));
                return false;
            }
            let key = climate.storage_key();
            if seen.contains(&key) {
                errors.push(ConfigError::DuplicateName(climate.name.clone()));
                return false;
            }
            seen.push(key);
            climate.sanitize();
            true
        });
        errors
    }
}

/// Last known desired state, as written to the state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub mode: HvacMode,
    #[serde(rename = "targetTemperature")]
    pub target_temperature: i32,
    pub fan: FanMode,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            mode: HvacMode::Off,
            target_temperature: DEFAULT_TARGET_TEMP_C,
            fan: FanMode::Low,
        }
    }
}

impl PersistedState {
    /// Lenient decode: every missing or malformed field falls back to its
    /// default independently.
    pub fn from_value(value: &Value) -> Self {
        let defaults = Self::default();

        let mode = value
            .get("mode")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse::<HvacMode>().ok())
            .unwrap_or(defaults.mode);

        let target_temperature = value
            .get("targetTemperature")
            .or_else(|| value.get("temperature"))
            .and_then(|raw| {
                raw.as_i64()
                    .or_else(|| raw.as_f64().filter(|t| t.is_finite()).map(|t| t as i64))
            })
            .and_then(|t| i32::try_from(t).ok())
            .unwrap_or(defaults.target_temperature);

        let fan = value
            .get("fan")
            .or_else(|| value.get("fan_mode"))
            .and_then(Value::as_str)
            .map(FanMode::from)
            .unwrap_or(defaults.fan);

        Self {
            mode,
            target_temperature,
            fan,
        }
    }

    pub fn from_slice(raw: &[u8]) -> Self {
        serde_json::from_slice::<Value>(raw)
            .map(|value| Self::from_value(&value))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn broadlink() -> TransportConfig {
        TransportConfig::Broadlink {
            controller: "remote.living_room".to_string(),
            controlled_device: "split".to_string(),
            command_topic: default_broadlink_topic(),
        }
    }

    #[test]
    fn restore_reads_all_fields() {
        let restored = PersistedState::from_value(&json!({
            "mode": "heat",
            "targetTemperature": 19,
            "fan": "medium",
        }));

        assert_eq!(
            restored,
            PersistedState {
                mode: HvacMode::Heat,
                target_temperature: 19,
                fan: FanMode::Medium,
            }
        );
    }

    #[test]
    fn restore_falls_back_per_field() {
        let restored = PersistedState::from_value(&json!({
            "mode": "blast",
            "temperature": 21.7,
            "fan_mode": "turbo",
        }));

        assert_eq!(restored.mode, HvacMode::Off);
        assert_eq!(restored.target_temperature, 21);
        assert_eq!(restored.fan, FanMode::Other("turbo".to_string()));
    }

    #[test]
    fn corrupt_snapshot_yields_defaults() {
        assert_eq!(PersistedState::from_slice(b"{not json"), PersistedState::default());
        assert_eq!(
            PersistedState::from_value(&json!({"mode": 3, "targetTemperature": "hot"})),
            PersistedState::default()
        );
    }

    #[test]
    fn transport_validation_names_missing_field() {
        assert_eq!(broadlink().validate(), Ok(()));

        let qa = TransportConfig::Qa {
            qa_profile: "lg".to_string(),
            controlled_device: " ".to_string(),
            qa_entity: "text.qa_hub".to_string(),
            command_topic: default_qa_topic(),
        };
        assert_eq!(
            qa.validate(),
            Err(ConfigError::MissingTransportParameter {
                backend: "qa",
                field: "controlled_device",
            })
        );
    }

    #[test]
    fn transport_config_deserializes_by_backend_tag() {
        let parsed: TransportConfig = serde_json::from_value(json!({
            "backend": "broadlink",
            "controller": "remote.rm4",
        }))
        .unwrap();

        assert_eq!(
            parsed,
            TransportConfig::Broadlink {
                controller: "remote.rm4".to_string(),
                controlled_device: String::new(),
                command_topic: default_broadlink_topic(),
            }
        );
        assert!(parsed.validate().is_err());
    }

    #[test]
    fn sanitize_drops_unnamed_and_duplicate_climates() {
        let mut runtime = RuntimeConfig {
            climates: vec![
                ClimateConfig::new("bedroom", broadlink()),
                ClimateConfig::new("", broadlink()),
                ClimateConfig::new("bedroom", broadlink()),
            ],
            ..RuntimeConfig::default()
        };

        let errors = runtime.sanitize();

        assert_eq!(runtime.climates.len(), 1);
        assert_eq!(
            errors,
            vec![
                ConfigError::EmptyName,
                ConfigError::DuplicateName("bedroom".to_string()),
            ]
        );
    }

    #[test]
    fn sanitize_always_offers_off() {
        let mut climate = ClimateConfig::new("office", broadlink());
        climate.hvac_modes = vec![HvacMode::Cool];
        climate.fan_modes.clear();

        climate.sanitize();

        assert_eq!(climate.hvac_modes, vec![HvacMode::Off, HvacMode::Cool]);
        assert_eq!(climate.fan_modes, FanMode::known().to_vec());
    }

    #[test]
    fn sanitize_drops_repeated_entries_keeping_first_order() {
        let mut climate = ClimateConfig::new("office", broadlink());
        climate.hvac_modes = vec![HvacMode::Cool, HvacMode::Off, HvacMode::Cool, HvacMode::Dry];
        climate.fan_modes = vec![FanMode::High, FanMode::Low, FanMode::High];

        climate.sanitize();

        assert_eq!(
            climate.hvac_modes,
            vec![HvacMode::Cool, HvacMode::Off, HvacMode::Dry]
        );
        assert_eq!(climate.fan_modes, vec![FanMode::High, FanMode::Low]);
    }

    #[test]
    fn sanitize_rejects_names_sharing_a_state_file() {
        let mut runtime = RuntimeConfig {
            climates: vec![
                ClimateConfig::new("living room", broadlink()),
                ClimateConfig::new("living_room", broadlink()),
                ClimateConfig::new("living-room", broadlink()),
            ],
            ..RuntimeConfig::default()
        };

        let errors = runtime.sanitize();

        assert_eq!(
            errors,
            vec![ConfigError::DuplicateName("living_room".to_string())]
        );
        let names: Vec<&str> = runtime.climates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["living room", "living-room"]);
        assert_eq!(runtime.climates[0].storage_key(), "living_room");
    }

    #[test]
    fn sanitize_rejects_topic_wildcards_in_names() {
        let mut runtime = RuntimeConfig {
            climates: vec![
                ClimateConfig::new("floor1/bedroom", broadlink()),
                ClimateConfig::new("attic+", broadlink()),
                ClimateConfig::new("#", broadlink()),
                ClimateConfig::new("kitchen", broadlink()),
            ],
            ..RuntimeConfig::default()
        };

        let errors = runtime.sanitize();

        assert_eq!(
            errors,
            vec![
                ConfigError::InvalidName("floor1/bedroom".to_string()),
                ConfigError::InvalidName("attic+".to_string()),
                ConfigError::InvalidName("#".to_string()),
            ]
        );
        assert_eq!(runtime.climates.len(), 1);
        assert_eq!(runtime.climates[0].name, "kitchen");
    }
}
