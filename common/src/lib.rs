pub mod climate;
pub mod codec;
pub mod config;
pub mod debounce;
pub mod policy;
pub mod state;
pub mod topics;
pub mod types;

pub use climate::{ClimateEngine, EngineAction, StateChange};
pub use codec::{derive_command, OFF_COMMAND};
pub use config::{
    storage_key, ClimateConfig, ConfigError, EngineConfig, NetworkConfig, PersistedState,
    PowerTokens, RuntimeConfig, SensorBinding, TransportConfig,
};
pub use debounce::{DebounceGuard, PassGate, PendingPass, SensorEventOutcome};
pub use policy::reconcile;
pub use state::ClimateState;
pub use topics::*;
pub use types::{ClimateStatePayload, ClimateStatus, DebouncePhase, FanMode, HvacMode};
