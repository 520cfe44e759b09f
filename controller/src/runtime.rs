use std::{
    sync::{Arc, Mutex as StdMutex, Weak},
    time::Duration,
};

use tokio::{
    sync::{Mutex, Notify},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use irclimate_common::{
    ClimateConfig, ClimateEngine, ClimateStatePayload, ClimateStatus, EngineConfig, FanMode,
    HvacMode, PassGate, PendingPass, SensorEventOutcome, StateChange,
};

use crate::{
    sensors::SensorCache,
    store::SnapshotStore,
    transport::{Dispatcher, TransportDiagnostics},
};

/// Async host for one [`ClimateEngine`]: owns its timers, reads sensors from
/// the shared cache, dispatches through the transport and persists changes.
pub struct ClimateRuntime {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    engine: Mutex<ClimateEngine>,
    /// Serializes user commands so they apply and dispatch in call order.
    commands: Mutex<()>,
    /// Held from dispatch through persist, by user commands and passes alike.
    dispatch: Mutex<()>,
    dispatcher: Dispatcher,
    sensors: SensorCache,
    store: Arc<dyn SnapshotStore>,
    power_entity: Option<String>,
    temp_entity: Option<String>,
    started: Instant,
    timer: StdMutex<Option<JoinHandle<()>>>,
    boot_timer: StdMutex<Option<JoinHandle<()>>>,
    changed: Notify,
}

impl ClimateRuntime {
    pub async fn start(
        config: ClimateConfig,
        engine_config: EngineConfig,
        dispatcher: Dispatcher,
        sensors: SensorCache,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        let started = Instant::now();
        let name = config.name.clone();
        let power_entity = config
            .power_sensor
            .as_ref()
            .map(|sensor| sensor.entity_id.clone());
        let temp_entity = config
            .temp_sensor
            .as_ref()
            .map(|sensor| sensor.entity_id.clone());
        let boot_settle = Duration::from_millis(engine_config.boot_settle_ms);

        let mut engine = ClimateEngine::new(config, engine_config, 0);
        match store.load_snapshot(&name).await {
            Ok(Some(snapshot)) => {
                engine.restore(snapshot);
                info!("[{name}] restored state, command {}", engine.command_key());
            }
            Ok(None) => info!("[{name}] no stored state, starting from defaults"),
            Err(err) => warn!("[{name}] failed to restore state, using defaults: {err:#}"),
        }

        let inner = Arc::new(Inner {
            name,
            engine: Mutex::new(engine),
            commands: Mutex::new(()),
            dispatch: Mutex::new(()),
            dispatcher,
            sensors,
            store,
            power_entity,
            temp_entity,
            started,
            timer: StdMutex::new(None),
            boot_timer: StdMutex::new(None),
            changed: Notify::new(),
        });

        let weak = Arc::downgrade(&inner);
        let boot_timer = tokio::spawn(async move {
            tokio::time::sleep(boot_settle).await;
            if let Some(inner) = weak.upgrade() {
                inner.settle().await;
            }
        });
        if let Ok(mut slot) = inner.boot_timer.lock() {
            *slot = Some(boot_timer);
        }

        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn watches_power(&self, entity_id: &str) -> bool {
        self.inner.power_entity.as_deref() == Some(entity_id)
    }

    pub fn watches_temp(&self, entity_id: &str) -> bool {
        self.inner.temp_entity.as_deref() == Some(entity_id)
    }

    pub async fn set_mode(&self, mode: HvacMode) -> bool {
        self.command(|engine| engine.set_mode(mode)).await
    }

    pub async fn set_fan_mode(&self, fan: FanMode) -> bool {
        self.command(|engine| engine.set_fan_mode(fan)).await
    }

    pub async fn set_target_temperature(&self, temp_c: i32) -> bool {
        self.command(|engine| engine.set_target_temperature(temp_c))
            .await
    }

    /// The power sensor's cached state changed.
    pub async fn handle_power_event(&self) {
        let inner = &self.inner;
        let mut engine = inner.engine.lock().await;
        match engine.on_power_sensor_event(inner.now_ms()) {
            SensorEventOutcome::IgnoredBooting => {
                debug!("[{}] power sensor changed during boot settle, ignored", inner.name);
            }
            SensorEventOutcome::Scheduled {
                pass,
                delay_ms,
                replaced,
            } => {
                if replaced {
                    debug!("[{}] power sensor changed again, debounce restarted", inner.name);
                }
                inner.arm_timer(pass, delay_ms);
            }
        }
        drop(engine);
        inner.changed.notify_waiters();
    }

    pub fn handle_temperature_event(&self) {
        self.inner.changed.notify_waiters();
    }

    pub async fn status(&self) -> ClimateStatus {
        let temp = self.inner.read_temperature_raw();
        let engine = self.inner.engine.lock().await;
        let current = engine.current_temperature(temp.as_deref());
        engine.status(current)
    }

    pub async fn state_payload(&self) -> ClimateStatePayload {
        let temp = self.inner.read_temperature_raw();
        let engine = self.inner.engine.lock().await;
        let current = engine.current_temperature(temp.as_deref());
        engine.state_payload(current)
    }

    pub async fn config(&self) -> ClimateConfig {
        self.inner.engine.lock().await.config().clone()
    }

    pub async fn engine_config(&self) -> EngineConfig {
        self.inner.engine.lock().await.engine_config().clone()
    }

    pub fn diagnostics(&self) -> TransportDiagnostics {
        self.inner.dispatcher.diagnostics()
    }

    /// Resolves on the next state, phase or temperature change.
    pub async fn changed(&self) {
        self.inner.changed.notified().await;
    }

    /// Cancels the boot timer and any pending reconciliation. A pass that is
    /// already dispatching runs to completion.
    pub async fn shutdown(&self) {
        self.inner.abort_timers();
        let cancelled = self.inner.engine.lock().await.cancel_pending();
        if cancelled.is_some() {
            debug!("[{}] pending reconciliation cancelled", self.inner.name);
        }
    }

    async fn command(&self, update: impl FnOnce(&mut ClimateEngine) -> Option<StateChange>) -> bool {
        let _order = self.inner.commands.lock().await;
        let change = {
            let mut engine = self.inner.engine.lock().await;
            update(&mut *engine)
        };
        let Some(change) = change else {
            return false;
        };
        self.inner.apply(change).await;
        true
    }
}

impl Drop for ClimateRuntime {
    fn drop(&mut self) {
        self.inner.abort_timers();
    }
}

impl Inner {
    fn now_ms(&self) -> u64 {
        self.started
            .elapsed()
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }

    fn read_power_raw(&self) -> Option<String> {
        self.sensors.read(self.power_entity.as_deref()?)
    }

    fn read_temperature_raw(&self) -> Option<String> {
        self.sensors.read(self.temp_entity.as_deref()?)
    }

    async fn settle(self: Arc<Self>) {
        let mut engine = self.engine.lock().await;
        let startup_sync = engine.settle(self.now_ms());
        if let Some(pass) = startup_sync {
            debug!("[{}] boot settled, syncing with power sensor", self.name);
            self.arm_timer(pass, 0);
        }
        drop(engine);
        self.changed.notify_waiters();
    }

    /// Must be called with the engine lock held so timer replacement follows
    /// generation order.
    fn arm_timer(self: &Arc<Self>, pass: PendingPass, delay_ms: u64) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if let Some(inner) = weak.upgrade() {
                // Detached so aborting a later timer never cuts a pass short.
                tokio::spawn(inner.run_pass(pass.generation));
            }
        });

        if let Ok(mut slot) = self.timer.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
    }

    async fn run_pass(self: Arc<Self>, generation: u64) {
        let change = {
            let mut engine = self.engine.lock().await;
            match engine.begin_reconciliation(generation, self.now_ms()) {
                PassGate::Proceed => {}
                PassGate::Stale => return,
                PassGate::AlreadyReconciling => {
                    debug!("[{}] reconciliation already running, pass dropped", self.name);
                    return;
                }
                PassGate::RateLimited { since_last_ms } => {
                    debug!(
                        "[{}] last reconciliation {since_last_ms} ms ago, pass skipped",
                        self.name
                    );
                    return;
                }
            }
            let power = self.read_power_raw();
            engine.reconcile_with(power.as_deref())
        };
        self.changed.notify_waiters();

        if let Some(change) = change {
            info!("[{}] power sensor disagrees, mode -> {}", self.name, change.snapshot.mode);
            self.apply(change).await;
        }

        self.engine
            .lock()
            .await
            .finish_reconciliation(self.now_ms());
        self.changed.notify_waiters();
    }

    /// Dispatches the new key, then persists the engine's state as it is at
    /// that point, which may already include a later change.
    async fn apply(&self, change: StateChange) {
        let _dispatch = self.dispatch.lock().await;
        let action = {
            let engine = self.engine.lock().await;
            let power = self.read_power_raw();
            engine.plan_dispatch(change.key, power.as_deref())
        };
        self.dispatcher.execute(action).await;

        let snapshot = self.engine.lock().await.state().snapshot();
        if let Err(err) = self.store.save_snapshot(&self.name, &snapshot).await {
            warn!("[{}] failed to persist state: {err:#}", self.name);
        }
        self.changed.notify_waiters();
    }

    fn abort_timers(&self) {
        for slot in [&self.boot_timer, &self.timer] {
            if let Ok(mut slot) = slot.lock() {
                if let Some(handle) = slot.take() {
                    handle.abort();
                }
            }
        }
    }
}
