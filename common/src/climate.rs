use crate::{
    codec::{derive_command, is_off_command},
    config::{ClimateConfig, EngineConfig, PersistedState},
    debounce::{DebounceGuard, PassGate, PendingPass, SensorEventOutcome},
    policy::reconcile,
    state::ClimateState,
    types::{ClimateStatePayload, ClimateStatus, FanMode, HvacMode},
};

/// What the host should do with a derived command key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineAction {
    Send(String),
    /// OFF while the power sensor already reports off.
    SuppressOff,
}

/// An effective change of the desired state: the key to dispatch and the
/// snapshot to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub key: String,
    pub snapshot: PersistedState,
}

/// Desired-state owner for one climate unit.
///
/// Pure and clock-free: every time-dependent call takes `now_ms`, and sensor
/// readings are passed in by the host at the moment they are needed.
#[derive(Debug, Clone)]
pub struct ClimateEngine {
    config: ClimateConfig,
    engine_config: EngineConfig,
    state: ClimateState,
    guard: DebounceGuard,
}

impl ClimateEngine {
    pub fn new(config: ClimateConfig, engine_config: EngineConfig, now_ms: u64) -> Self {
        let guard = DebounceGuard::new(&engine_config, now_ms);
        Self {
            config,
            engine_config,
            state: ClimateState::new(),
            guard,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ClimateConfig {
        &self.config
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine_config
    }

    pub fn state(&self) -> &ClimateState {
        &self.state
    }

    pub fn guard(&self) -> &DebounceGuard {
        &self.guard
    }

    pub fn restore(&mut self, snapshot: PersistedState) {
        self.state = ClimateState::from(snapshot);
    }

    pub fn command_key(&self) -> String {
        derive_command(&self.state)
    }

    pub fn set_mode(&mut self, mode: HvacMode) -> Option<StateChange> {
        self.state.set_mode(mode).then(|| self.change())
    }

    pub fn set_fan_mode(&mut self, fan: FanMode) -> Option<StateChange> {
        self.state.set_fan(fan).then(|| self.change())
    }

    pub fn set_target_temperature(&mut self, temp_c: i32) -> Option<StateChange> {
        self.state.set_target_temperature(temp_c).then(|| self.change())
    }

    /// Applies the OFF suppression rule. `power_raw` is the power sensor's
    /// current raw state, read just before dispatch.
    pub fn plan_dispatch(&self, key: String, power_raw: Option<&str>) -> EngineAction {
        let sensor_reads_off = self.config.power_sensor.is_some()
            && power_raw.is_some_and(|raw| self.config.power_tokens.is_off(raw));

        if is_off_command(&key) && sensor_reads_off {
            EngineAction::SuppressOff
        } else {
            EngineAction::Send(key)
        }
    }

    pub fn on_power_sensor_event(&mut self, now_ms: u64) -> SensorEventOutcome {
        self.guard.on_sensor_event(now_ms)
    }

    /// Ends the boot-settle window. With a power sensor configured, an
    /// immediate pass is scheduled to pick up whatever the sensor reports.
    pub fn settle(&mut self, now_ms: u64) -> Option<PendingPass> {
        if !self.guard.settle(now_ms) || self.config.power_sensor.is_none() {
            return None;
        }
        Some(self.guard.schedule(now_ms, 0))
    }

    pub fn begin_reconciliation(&mut self, generation: u64, now_ms: u64) -> PassGate {
        self.guard.begin_pass(generation, now_ms)
    }

    /// Evaluates the policy against the power sensor's raw state read at
    /// fire time. A sensor without any state yet produces no change.
    pub fn reconcile_with(&mut self, power_raw: Option<&str>) -> Option<StateChange> {
        let raw = power_raw?;
        let observed_on = self.config.power_tokens.is_on(raw);
        let next = reconcile(self.state.mode(), observed_on)?;
        self.set_mode(next)
    }

    pub fn finish_reconciliation(&mut self, now_ms: u64) {
        self.guard.finish_pass(now_ms);
    }

    pub fn cancel_pending(&mut self) -> Option<PendingPass> {
        self.guard.cancel()
    }

    pub fn current_temperature(&self, temp_raw: Option<&str>) -> Option<f32> {
        temp_raw?
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|temp| temp.is_finite())
    }

    pub fn status(&self, current_temp_c: Option<f32>) -> ClimateStatus {
        ClimateStatus {
            name: self.config.name.clone(),
            mode: self.state.mode(),
            fan_mode: self.state.fan().clone(),
            target_temp_c: self.state.target_temperature(),
            current_temp_c,
            hvac_modes: self.config.hvac_modes.clone(),
            fan_modes: self.config.fan_modes.clone(),
            min_temp_c: self.engine_config.min_temp_c,
            max_temp_c: self.engine_config.max_temp_c,
            temp_step_c: 1,
            phase: self.guard.phase().as_str(),
            power_sensor: self
                .config
                .power_sensor
                .as_ref()
                .map(|sensor| sensor.entity_id.clone()),
            temp_sensor: self
                .config
                .temp_sensor
                .as_ref()
                .map(|sensor| sensor.entity_id.clone()),
        }
    }

    pub fn state_payload(&self, current_temp_c: Option<f32>) -> ClimateStatePayload {
        ClimateStatePayload {
            mode: self.state.mode().as_str(),
            fan: self.state.fan().to_string(),
            target: self.state.target_temperature(),
            temp: current_temp_c,
            command: self.command_key(),
        }
    }

    fn change(&self) -> StateChange {
        StateChange {
            key: self.command_key(),
            snapshot: self.state.snapshot(),
        }
    }
}
