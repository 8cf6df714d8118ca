use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::state::{Job, JobClass, Ticks, UnitEntry, UnitId};

pub trait Clock: Send + Sync {
    fn now(&self) -> Ticks;
}

#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Ticks) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn advance(&self, delta: Ticks) -> Ticks {
        self.now.fetch_add(delta, Ordering::AcqRel) + delta
    }

    pub fn set(&self, now: Ticks) {
        self.now.store(now, Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Ticks {
        self.now.load(Ordering::Acquire)
    }
}

// Queried before a link, assigned after. A query never vetoes a link.
pub trait BudgetArbiter: Send {
    fn query_available(&self, unit: UnitId) -> u64;
    fn assign(&mut self, unit: UnitId, requested: u64);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnmeteredBudget;

impl BudgetArbiter for UnmeteredBudget {
    fn query_available(&self, _unit: UnitId) -> u64 {
        u64::MAX
    }

    fn assign(&mut self, _unit: UnitId, _requested: u64) {}
}

// Available to a unit: capacity minus what every other unit holds.
#[derive(Debug, Clone)]
pub struct BudgetLedger {
    capacity: u64,
    assigned: Vec<u64>,
    queries: Arc<AtomicU64>,
}

impl BudgetLedger {
    pub fn new(capacity: u64, num_units: usize) -> Self {
        Self {
            capacity,
            assigned: vec![0; num_units],
            queries: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn assigned(&self, unit: UnitId) -> u64 {
        self.assigned.get(unit).copied().unwrap_or(0)
    }

    pub fn query_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.queries)
    }
}

impl BudgetArbiter for BudgetLedger {
    fn query_available(&self, unit: UnitId) -> u64 {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let others: u64 = self
            .assigned
            .iter()
            .enumerate()
            .filter(|(id, _)| *id != unit)
            .map(|(_, amount)| *amount)
            .sum();
        self.capacity.saturating_sub(others)
    }

    fn assign(&mut self, unit: UnitId, requested: u64) {
        if let Some(slot) = self.assigned.get_mut(unit) {
            *slot = requested;
        }
    }
}

pub trait AffinityResolver: Send {
    fn nearest_available(
        &self,
        start: UnitId,
        units: &[UnitEntry],
        release_master: Option<UnitId>,
    ) -> Option<UnitId>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearAffinity;

impl AffinityResolver for LinearAffinity {
    fn nearest_available(
        &self,
        start: UnitId,
        units: &[UnitEntry],
        release_master: Option<UnitId>,
    ) -> Option<UnitId> {
        units
            .iter()
            .filter(|u| u.is_online() && u.linked().is_none() && Some(u.id()) != release_master)
            .min_by_key(|u| (u.id().abs_diff(start), u.id()))
            .map(UnitEntry::id)
    }
}

pub trait JobLifecycle: Send {
    fn is_runnable(&self, job: &Job) -> bool {
        job.runtime.runnable
    }

    fn in_np_section(&self, job: &Job) -> bool {
        job.runtime.np
    }

    fn budget_exhausted(&self, job: &Job) -> bool {
        job.params.budget_enforced && job.runtime.exec_time >= job.params.exec_cost
    }

    fn signaled_completion(&self, job: &Job) -> bool {
        job.runtime.completed
    }

    fn request_section_exit(&self, job: &mut Job) {
        job.runtime.exit_np_requested = true;
    }

    fn advance_to_next_period(&self, job: &mut Job) {
        let next = job.release().saturating_add(job.params.period);
        job.setup_release(next);
    }

    fn infer_sporadic_release(&self, job: &mut Job, now: Ticks) -> bool {
        if job.params.class == JobClass::Sporadic && job.is_tardy(now) {
            job.setup_release(now);
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodicLifecycle;

impl JobLifecycle for PeriodicLifecycle {}

// Requests coalesce until the unit takes its flag.
#[derive(Debug)]
pub struct ReschedSignals {
    pending: Vec<AtomicBool>,
}

impl ReschedSignals {
    pub fn new(num_units: usize) -> Self {
        Self {
            pending: (0..num_units).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub fn request(&self, unit: UnitId) {
        self.pending[unit].store(true, Ordering::Release);
    }

    pub fn take(&self, unit: UnitId) -> bool {
        self.pending[unit].swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self, unit: UnitId) -> bool {
        self.pending[unit].load(Ordering::Acquire)
    }

    pub fn any_pending(&self) -> bool {
        self.pending.iter().any(|flag| flag.load(Ordering::Acquire))
    }
}

pub struct Hooks {
    pub clock: Arc<dyn Clock>,
    pub budget: Box<dyn BudgetArbiter>,
    pub affinity: Option<Box<dyn AffinityResolver>>,
    pub lifecycle: Box<dyn JobLifecycle>,
    pub signals: Arc<ReschedSignals>,
}

impl Hooks {
    pub fn new(num_units: usize) -> Self {
        Self {
            clock: Arc::new(ManualClock::new(0)),
            budget: Box::new(UnmeteredBudget),
            affinity: None,
            lifecycle: Box::new(PeriodicLifecycle),
            signals: Arc::new(ReschedSignals::new(num_units)),
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("now", &self.clock.now())
            .field("affinity", &self.affinity.is_some())
            .field("signals", &self.signals)
            .finish_non_exhaustive()
    }
}
