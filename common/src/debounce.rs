use crate::{config::EngineConfig, types::DebouncePhase};

/// A scheduled, not yet fired reconciliation pass. The generation identifies
/// it; a fired timer whose generation no longer matches was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPass {
    pub generation: u64,
    pub due_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorEventOutcome {
    /// Still inside the boot-settle window; the event is dropped.
    IgnoredBooting,
    /// A pass was (re)scheduled `delay_ms` from now.
    Scheduled {
        pass: PendingPass,
        delay_ms: u64,
        replaced: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassGate {
    Proceed,
    /// The timer was cancelled or replaced after it fired.
    Stale,
    AlreadyReconciling,
    RateLimited { since_last_ms: u64 },
}

/// Boot-settle window, trailing-edge debounce, single-pass re-entrancy flag
/// and minimum inter-pass interval for sensor-driven reconciliation.
#[derive(Debug, Clone)]
pub struct DebounceGuard {
    debounce_ms: u64,
    min_interval_ms: u64,
    boot_until_ms: u64,

    booting: bool,
    reconciling: bool,
    last_reconcile_ms: Option<u64>,
    pending: Option<PendingPass>,
    generation: u64,
}

impl DebounceGuard {
    pub fn new(config: &EngineConfig, now_ms: u64) -> Self {
        Self {
            debounce_ms: config.debounce_ms,
            min_interval_ms: config.min_reconcile_interval_ms,
            boot_until_ms: now_ms.saturating_add(config.boot_settle_ms),
            booting: true,
            reconciling: false,
            last_reconcile_ms: None,
            pending: None,
            generation: 0,
        }
    }

    pub fn is_booting(&self) -> bool {
        self.booting
    }

    pub fn is_reconciling(&self) -> bool {
        self.reconciling
    }

    pub fn last_reconcile_ms(&self) -> Option<u64> {
        self.last_reconcile_ms
    }

    pub fn pending(&self) -> Option<PendingPass> {
        self.pending
    }

    pub fn phase(&self) -> DebouncePhase {
        if self.booting {
            DebouncePhase::Booting
        } else if self.reconciling {
            DebouncePhase::Reconciling
        } else if self.pending.is_some() {
            DebouncePhase::PendingTimer
        } else {
            DebouncePhase::Idle
        }
    }

    /// Ends the boot-settle window once it has elapsed. Returns true on the
    /// transition only.
    pub fn settle(&mut self, now_ms: u64) -> bool {
        if self.booting && now_ms >= self.boot_until_ms {
            self.booting = false;
            true
        } else {
            false
        }
    }

    pub fn on_sensor_event(&mut self, now_ms: u64) -> SensorEventOutcome {
        if self.booting && !self.settle(now_ms) {
            return SensorEventOutcome::IgnoredBooting;
        }

        let replaced = self.pending.is_some();
        let pass = self.schedule(now_ms, self.debounce_ms);
        SensorEventOutcome::Scheduled {
            pass,
            delay_ms: self.debounce_ms,
            replaced,
        }
    }

    /// Replaces any pending pass with a new one due after `delay_ms`.
    pub fn schedule(&mut self, now_ms: u64, delay_ms: u64) -> PendingPass {
        self.generation = self.generation.wrapping_add(1);
        let pass = PendingPass {
            generation: self.generation,
            due_ms: now_ms.saturating_add(delay_ms),
        };
        self.pending = Some(pass);
        pass
    }

    pub fn cancel(&mut self) -> Option<PendingPass> {
        self.pending.take()
    }

    /// Called when the timer for `generation` fires.
    pub fn begin_pass(&mut self, generation: u64, now_ms: u64) -> PassGate {
        match self.pending {
            Some(pass) if pass.generation == generation => self.pending = None,
            _ => return PassGate::Stale,
        }

        if self.reconciling {
            return PassGate::AlreadyReconciling;
        }

        if let Some(last) = self.last_reconcile_ms {
            let since_last_ms = now_ms.saturating_sub(last);
            if since_last_ms < self.min_interval_ms {
                return PassGate::RateLimited { since_last_ms };
            }
        }

        self.reconciling = true;
        PassGate::Proceed
    }

    pub fn finish_pass(&mut self, now_ms: u64) {
        self.reconciling = false;
        self.last_reconcile_ms = Some(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> DebounceGuard {
        DebounceGuard::new(&EngineConfig::default(), 0)
    }

    fn scheduled(outcome: SensorEventOutcome) -> PendingPass {
        match outcome {
            SensorEventOutcome::Scheduled { pass, .. } => pass,
            other => panic!("expected scheduled pass, got {other:?}"),
        }
    }

    #[test]
    fn events_during_boot_window_are_dropped() {
        let mut guard = guard();

        for now in [0, 500, 1_000, 1_999] {
            assert_eq!(guard.on_sensor_event(now), SensorEventOutcome::IgnoredBooting);
        }
        assert!(guard.pending().is_none());
        assert_eq!(guard.phase(), DebouncePhase::Booting);
    }

    #[test]
    fn settle_transitions_once() {
        let mut guard = guard();

        assert!(!guard.settle(1_999));
        assert!(guard.settle(2_000));
        assert!(!guard.settle(2_500));
        assert_eq!(guard.phase(), DebouncePhase::Idle);
    }

    #[test]
    fn event_after_window_settles_and_schedules() {
        let mut guard = guard();

        let outcome = guard.on_sensor_event(2_100);

        assert_eq!(
            outcome,
            SensorEventOutcome::Scheduled {
                pass: PendingPass {
                    generation: 1,
                    due_ms: 3_100,
                },
                delay_ms: 1_000,
                replaced: false,
            }
        );
        assert!(!guard.is_booting());
        assert_eq!(guard.phase(), DebouncePhase::PendingTimer);
    }

    #[test]
    fn burst_restarts_timer_and_only_last_generation_runs() {
        let mut guard = guard();
        guard.settle(2_000);

        let first = scheduled(guard.on_sensor_event(3_000));
        let second = scheduled(guard.on_sensor_event(3_400));
        let last = scheduled(guard.on_sensor_event(3_900));

        assert_eq!(last.due_ms, 4_900);
        assert_eq!(guard.begin_pass(first.generation, 4_000), PassGate::Stale);
        assert_eq!(guard.begin_pass(second.generation, 4_400), PassGate::Stale);
        assert_eq!(guard.begin_pass(last.generation, 4_900), PassGate::Proceed);
        assert_eq!(guard.phase(), DebouncePhase::Reconciling);

        guard.finish_pass(4_950);
        assert_eq!(guard.phase(), DebouncePhase::Idle);
        assert_eq!(guard.last_reconcile_ms(), Some(4_950));
    }

    #[test]
    fn second_pass_is_dropped_while_reconciling() {
        let mut guard = guard();
        guard.settle(2_000);

        let first = scheduled(guard.on_sensor_event(3_000));
        assert_eq!(guard.begin_pass(first.generation, 4_000), PassGate::Proceed);

        // An event mid-pass still schedules, but cannot overlap the running pass.
        let overlapping = scheduled(guard.on_sensor_event(4_100));
        assert_eq!(
            guard.begin_pass(overlapping.generation, 5_100),
            PassGate::AlreadyReconciling
        );
        assert!(guard.pending().is_none());
        assert!(guard.is_reconciling());

        guard.finish_pass(5_200);
        let retry = scheduled(guard.on_sensor_event(6_500));
        assert_eq!(guard.begin_pass(retry.generation, 7_500), PassGate::Proceed);
    }

    #[test]
    fn minimum_interval_skips_without_retry() {
        let mut guard = guard();
        guard.settle(2_000);

        let first = scheduled(guard.on_sensor_event(3_000));
        assert_eq!(guard.begin_pass(first.generation, 4_000), PassGate::Proceed);
        guard.finish_pass(4_000);

        let early = scheduled(guard.on_sensor_event(4_200));
        assert_eq!(
            guard.begin_pass(early.generation, 5_200),
            PassGate::RateLimited {
                since_last_ms: 1_200
            }
        );
        assert!(guard.pending().is_none());
        assert_eq!(guard.last_reconcile_ms(), Some(4_000));
    }

    #[test]
    fn cancel_makes_fired_timer_stale() {
        let mut guard = guard();
        guard.settle(2_000);

        let pass = scheduled(guard.on_sensor_event(3_000));
        assert_eq!(guard.cancel(), Some(pass));
        assert_eq!(guard.begin_pass(pass.generation, 4_000), PassGate::Stale);
        assert!(!guard.is_reconciling());
    }
}
