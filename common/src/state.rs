use crate::{
    config::PersistedState,
    types::{FanMode, HvacMode},
};

/// Desired climate state. Setters report whether the value changed and do
/// not check membership in the configured allowed sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClimateState {
    mode: HvacMode,
    fan: FanMode,
    target_temperature: i32,
}

impl ClimateState {
    pub fn new() -> Self {
        Self::from(PersistedState::default())
    }

    pub fn mode(&self) -> HvacMode {
        self.mode
    }

    pub fn fan(&self) -> &FanMode {
        &self.fan
    }

    pub fn target_temperature(&self) -> i32 {
        self.target_temperature
    }

    pub fn set_mode(&mut self, mode: HvacMode) -> bool {
        if self.mode != mode {
            self.mode = mode;
            true
        } else {
            false
        }
    }

    pub fn set_fan(&mut self, fan: FanMode) -> bool {
        if self.fan != fan {
            self.fan = fan;
            true
        } else {
            false
        }
    }

    pub fn set_target_temperature(&mut self, temp_c: i32) -> bool {
        if self.target_temperature != temp_c {
            self.target_temperature = temp_c;
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> PersistedState {
        PersistedState {
            mode: self.mode,
            target_temperature: self.target_temperature,
            fan: self.fan.clone(),
        }
    }
}

impl Default for ClimateState {
    fn default() -> Self {
        Self::new()
    }
}

impl From<PersistedState> for ClimateState {
    fn from(persisted: PersistedState) -> Self {
        Self {
            mode: persisted.mode,
            fan: persisted.fan,
            target_temperature: persisted.target_temperature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_off_low_24() {
        let state = ClimateState::new();
        assert_eq!(state.mode(), HvacMode::Off);
        assert_eq!(state.fan(), &FanMode::Low);
        assert_eq!(state.target_temperature(), 24);
    }

    #[test]
    fn setters_report_changes_only() {
        let mut state = ClimateState::new();

        assert!(!state.set_mode(HvacMode::Off));
        assert!(state.set_mode(HvacMode::Dry));
        assert!(!state.set_fan(FanMode::Low));
        assert!(state.set_fan(FanMode::Other("turbo".into())));
        assert!(!state.set_target_temperature(24));
        assert!(state.set_target_temperature(-3));

        assert_eq!(
            state.snapshot(),
            PersistedState {
                mode: HvacMode::Dry,
                target_temperature: -3,
                fan: FanMode::Other("turbo".into()),
            }
        );
    }
}
