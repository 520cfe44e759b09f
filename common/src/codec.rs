//! Command key derivation.
//!
//! A key is an opaque identifier for a learned or derivable IR signal. The
//! transport maps it to an actual emission; this module only guarantees that
//! equal states map to equal keys and that every OFF state maps to `"off"`.

use crate::{
    state::ClimateState,
    types::{FanMode, HvacMode},
};

pub const OFF_COMMAND: &str = "off";

pub fn derive_command(state: &ClimateState) -> String {
    if state.mode() == HvacMode::Off {
        return OFF_COMMAND.to_string();
    }

    format!(
        "{}_{}_{}",
        state.mode().as_str(),
        fan_token(state.fan()),
        state.target_temperature()
    )
}

pub fn is_off_command(key: &str) -> bool {
    key == OFF_COMMAND
}

fn fan_token(fan: &FanMode) -> &'static str {
    match fan {
        FanMode::Low => "low",
        FanMode::Medium => "medium",
        FanMode::High => "high",
        FanMode::Auto => "auto",
        FanMode::Focus => "focus",
        FanMode::Other(_) => "auto",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::config::PersistedState;

    fn state(mode: HvacMode, fan: FanMode, target: i32) -> ClimateState {
        ClimateState::from(PersistedState {
            mode,
            target_temperature: target,
            fan,
        })
    }

    #[test]
    fn formats_mode_fan_temperature() {
        assert_eq!(
            derive_command(&state(HvacMode::Cool, FanMode::Low, 23)),
            "cool_low_23"
        );
        assert_eq!(
            derive_command(&state(HvacMode::FanOnly, FanMode::Focus, 18)),
            "fan_only_focus_18"
        );
    }

    #[test]
    fn off_collapses_regardless_of_fan_and_temperature() {
        for fan in FanMode::known() {
            for target in [16, 24, 30] {
                assert_eq!(derive_command(&state(HvacMode::Off, fan.clone(), target)), "off");
            }
        }
    }

    #[test]
    fn unknown_fan_lowers_to_auto() {
        assert_eq!(
            derive_command(&state(HvacMode::Heat, FanMode::Other("turbo".into()), 20)),
            "heat_auto_20"
        );
    }

    #[test]
    fn distinct_triples_yield_distinct_keys() {
        let mut seen = HashSet::new();
        let mut count = 0;

        for mode in HvacMode::ALL.into_iter().filter(|m| *m != HvacMode::Off) {
            for fan in FanMode::known() {
                for target in 16..=30 {
                    let key = derive_command(&state(mode, fan.clone(), target));
                    assert_eq!(key, derive_command(&state(mode, fan.clone(), target)));
                    seen.insert(key);
                    count += 1;
                }
            }
        }

        assert_eq!(seen.len(), count);
        assert!(!seen.contains(OFF_COMMAND));
    }
}
