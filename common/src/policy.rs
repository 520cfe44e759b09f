use crate::{config::PowerTokens, types::HvacMode};

/// Mode assumed when the sensor reports the unit powered on while the
/// desired state is OFF. Split units power up in cooling.
pub const REENTRY_MODE: HvacMode = HvacMode::Cool;

/// Decides whether the desired mode must follow the power sensor.
///
/// Only the two disagreeing quadrants produce a transition.
pub fn reconcile(current: HvacMode, observed_on: bool) -> Option<HvacMode> {
    match (current, observed_on) {
        (HvacMode::Off, true) => Some(REENTRY_MODE),
        (HvacMode::Off, false) => None,
        (_, false) => Some(HvacMode::Off),
        (_, true) => None,
    }
}

impl PowerTokens {
    pub fn is_on(&self, raw: &str) -> bool {
        matches_token(&self.on, raw)
    }

    /// True only for a token positively known to mean off. Unknown or
    /// unavailable readings are neither on nor off.
    pub fn is_off(&self, raw: &str) -> bool {
        matches_token(&self.off, raw)
    }
}

fn matches_token(tokens: &[String], raw: &str) -> bool {
    let raw = raw.trim();
    tokens.iter().any(|token| token.eq_ignore_ascii_case(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truth_table() {
        assert_eq!(reconcile(HvacMode::Cool, false), Some(HvacMode::Off));
        assert_eq!(reconcile(HvacMode::Heat, false), Some(HvacMode::Off));
        assert_eq!(reconcile(HvacMode::Off, true), Some(HvacMode::Cool));
        assert_eq!(reconcile(HvacMode::Dry, true), None);
        assert_eq!(reconcile(HvacMode::Off, false), None);
    }

    #[test]
    fn every_non_off_mode_follows_a_closed_sensor() {
        for mode in HvacMode::ALL {
            let expected = (mode != HvacMode::Off).then_some(HvacMode::Off);
            assert_eq!(reconcile(mode, false), expected, "mode {mode}");
        }
    }

    #[test]
    fn default_tokens_accept_synonyms() {
        let tokens = PowerTokens::default();

        assert!(tokens.is_on("on"));
        assert!(tokens.is_on("TRUE"));
        assert!(tokens.is_on(" ligado "));
        assert!(!tokens.is_on("unavailable"));

        assert!(tokens.is_off("Off"));
        assert!(tokens.is_off("desligado"));
        assert!(!tokens.is_off("unknown"));
        assert!(!tokens.is_off(""));
    }

    #[test]
    fn configured_engaged_token() {
        let tokens = PowerTokens {
            on: vec!["running".to_string()],
            off: vec!["idle".to_string()],
        };

        assert!(tokens.is_on("Running"));
        assert!(!tokens.is_on("on"));
        assert!(tokens.is_off("idle"));
    }
}
