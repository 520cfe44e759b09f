use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Cool,
    Heat,
    Dry,
    FanOnly,
    Auto,
}

impl HvacMode {
    pub const ALL: [HvacMode; 6] = [
        Self::Off,
        Self::Cool,
        Self::Heat,
        Self::Dry,
        Self::FanOnly,
        Self::Auto,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Cool => "cool",
            Self::Heat => "heat",
            Self::Dry => "dry",
            Self::FanOnly => "fan_only",
            Self::Auto => "auto",
        }
    }
}

impl Default for HvacMode {
    fn default() -> Self {
        Self::Off
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown hvac mode '{0}'")]
pub struct UnknownHvacMode(pub String);

impl FromStr for HvacMode {
    type Err = UnknownHvacMode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "cool" => Ok(Self::Cool),
            "heat" => Ok(Self::Heat),
            "dry" => Ok(Self::Dry),
            "fan_only" => Ok(Self::FanOnly),
            "auto" => Ok(Self::Auto),
            _ => Err(UnknownHvacMode(value.to_string())),
        }
    }
}

/// Fan speed. Values outside the known table are kept verbatim in `Other`
/// so a restored or externally supplied speed survives a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FanMode {
    Low,
    Medium,
    High,
    Auto,
    Focus,
    Other(String),
}

impl FanMode {
    pub fn known() -> [FanMode; 5] {
        [
            Self::Low,
            Self::Medium,
            Self::High,
            Self::Auto,
            Self::Focus,
        ]
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Auto => "auto",
            Self::Focus => "focus",
            Self::Other(raw) => raw,
        }
    }
}

impl Default for FanMode {
    fn default() -> Self {
        Self::Low
    }
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for FanMode {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            "auto" => Self::Auto,
            "focus" => Self::Focus,
            _ => Self::Other(value.to_string()),
        }
    }
}

impl From<String> for FanMode {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl Serialize for FanMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FanMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebouncePhase {
    Booting,
    Idle,
    PendingTimer,
    Reconciling,
}

impl DebouncePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Booting => "BOOTING",
            Self::Idle => "IDLE",
            Self::PendingTimer => "PENDING_TIMER",
            Self::Reconciling => "RECONCILING",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClimateStatus {
    pub name: String,
    pub mode: HvacMode,
    #[serde(rename = "fanMode")]
    pub fan_mode: FanMode,
    #[serde(rename = "targetTemp")]
    pub target_temp_c: i32,
    #[serde(rename = "currentTemp")]
    pub current_temp_c: Option<f32>,
    #[serde(rename = "hvacModes")]
    pub hvac_modes: Vec<HvacMode>,
    #[serde(rename = "fanModes")]
    pub fan_modes: Vec<FanMode>,
    #[serde(rename = "minTemp")]
    pub min_temp_c: i32,
    #[serde(rename = "maxTemp")]
    pub max_temp_c: i32,
    #[serde(rename = "tempStep")]
    pub temp_step_c: i32,
    pub phase: &'static str,
    #[serde(rename = "powerSensor")]
    pub power_sensor: Option<String>,
    #[serde(rename = "tempSensor")]
    pub temp_sensor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClimateStatePayload {
    pub mode: &'static str,
    pub fan: String,
    pub target: i32,
    pub temp: Option<f32>,
    pub command: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hvac_mode_parses_case_insensitively() {
        assert_eq!("COOL".parse::<HvacMode>(), Ok(HvacMode::Cool));
        assert_eq!(" fan_only ".parse::<HvacMode>(), Ok(HvacMode::FanOnly));
        assert!("turbo".parse::<HvacMode>().is_err());
    }

    #[test]
    fn unknown_fan_speed_is_kept_verbatim() {
        let fan = FanMode::from("Turbo");
        assert_eq!(fan, FanMode::Other("Turbo".to_string()));
        assert_eq!(fan.as_str(), "Turbo");
        assert_eq!(FanMode::from("MEDIUM"), FanMode::Medium);
    }

    #[test]
    fn fan_mode_serializes_as_plain_string() {
        let json = serde_json::to_string(&vec![FanMode::Focus, FanMode::Other("quiet".into())])
            .unwrap();
        assert_eq!(json, r#"["focus","quiet"]"#);

        let back: FanMode = serde_json::from_str(r#""high""#).unwrap();
        assert_eq!(back, FanMode::High);
    }
}
