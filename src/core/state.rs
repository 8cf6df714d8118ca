use std::cmp::Ordering;

use slotmap::{SlotMap, new_key_type};

use super::domain::RtDomain;
use super::event::EventLog;
use super::heap::UnitHeap;
use super::hooks::Hooks;
use crate::config::SchedConfig;

// Index into the unit table
pub type UnitId = usize;
pub type Ticks = u64;

new_key_type! {
    pub struct JobId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobClass {
    Periodic,
    // Wake-ups after the deadline start a fresh job at the wake-up instant
    Sporadic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobParams {
    pub period: Ticks,
    pub relative_deadline: Ticks,
    pub exec_cost: Ticks,
    pub mem_budget: u64,
    pub class: JobClass,
    pub budget_enforced: bool,
    pub early_release: bool,
}

impl JobParams {
    pub fn periodic(period: Ticks, exec_cost: Ticks) -> Self {
        Self {
            period,
            relative_deadline: period,
            exec_cost,
            mem_budget: 0,
            class: JobClass::Periodic,
            budget_enforced: false,
            early_release: false,
        }
    }

    pub fn with_deadline(mut self, relative_deadline: Ticks) -> Self {
        self.relative_deadline = relative_deadline;
        self
    }

    pub fn with_mem_budget(mut self, mem_budget: u64) -> Self {
        self.mem_budget = mem_budget;
        self
    }

    pub fn sporadic(mut self) -> Self {
        self.class = JobClass::Sporadic;
        self
    }

    pub fn enforced(mut self) -> Self {
        self.budget_enforced = true;
        self
    }

    pub fn early_releasing(mut self) -> Self {
        self.early_release = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobRuntime {
    pub runnable: bool,
    pub np: bool,
    pub exit_np_requested: bool,
    pub completed: bool,
    pub exec_time: Ticks,
}

// Linkage fields are only written under the global lock by the core.
#[derive(Debug, Clone)]
pub struct Job {
    pub(crate) id: JobId,
    pub params: JobParams,
    pub runtime: JobRuntime,
    pub(crate) release: Ticks,
    pub(crate) deadline: Ticks,
    pub(crate) job_no: u64,
    pub(crate) linked_on: Option<UnitId>,
    pub(crate) scheduled_on: Option<UnitId>,
    pub(crate) queued: bool,
    pub(crate) inherited_from: Option<JobId>,
    pub(crate) last_unit: Option<UnitId>,
}

impl Job {
    pub(crate) fn new(id: JobId, params: JobParams) -> Self {
        Self {
            id,
            params,
            runtime: JobRuntime {
                runnable: true,
                ..JobRuntime::default()
            },
            release: 0,
            deadline: 0,
            job_no: 0,
            linked_on: None,
            scheduled_on: None,
            queued: false,
            inherited_from: None,
            last_unit: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn release(&self) -> Ticks {
        self.release
    }

    pub fn deadline(&self) -> Ticks {
        self.deadline
    }

    pub fn job_no(&self) -> u64 {
        self.job_no
    }

    pub fn linked_on(&self) -> Option<UnitId> {
        self.linked_on
    }

    pub fn scheduled_on(&self) -> Option<UnitId> {
        self.scheduled_on
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }

    pub fn inherited_from(&self) -> Option<JobId> {
        self.inherited_from
    }

    pub fn last_unit(&self) -> Option<UnitId> {
        self.last_unit
    }

    pub fn is_released(&self, now: Ticks) -> bool {
        self.release <= now
    }

    pub fn is_tardy(&self, now: Ticks) -> bool {
        now >= self.deadline
    }

    pub fn setup_release(&mut self, release: Ticks) {
        self.release = release;
        self.deadline = release.saturating_add(self.params.relative_deadline);
        self.runtime.exec_time = 0;
        self.job_no += 1;
    }
}

// Smaller is more urgent: earlier deadline, then lower owner id. On a full
// tie an inherited copy beats the owner's own key, so a donor never preempts
// the job holding its priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrioKey {
    pub deadline: Ticks,
    pub owner: JobId,
    pub inherited: bool,
}

impl Ord for PrioKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then_with(|| self.owner.cmp(&other.owner))
            .then_with(|| other.inherited.cmp(&self.inherited))
    }
}

impl PartialOrd for PrioKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PrioKey {
    pub fn higher_than(&self, other: &PrioKey) -> bool {
        self < other
    }
}

#[derive(Debug, Clone)]
pub struct UnitEntry {
    pub(crate) id: UnitId,
    pub(crate) linked: Option<JobId>,
    pub(crate) scheduled: Option<JobId>,
    pub(crate) online: bool,
}

impl UnitEntry {
    fn new(id: UnitId) -> Self {
        Self {
            id,
            linked: None,
            scheduled: None,
            online: false,
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn linked(&self) -> Option<JobId> {
        self.linked
    }

    pub fn scheduled(&self) -> Option<JobId> {
        self.scheduled
    }

    pub fn is_online(&self) -> bool {
        self.online
    }
}

pub struct SchedCtx {
    pub(crate) jobs: SlotMap<JobId, Job>,
    pub(crate) units: Vec<UnitEntry>,
    pub(crate) heap: UnitHeap,
    pub(crate) domain: RtDomain,
    pub(crate) release_master: Option<UnitId>,
    pub(crate) hooks: Hooks,
    pub(crate) events: EventLog,
    pub(crate) active: bool,
    pub(crate) prefer_local: bool,
    pub(crate) trace_all: bool,
}

impl std::fmt::Debug for SchedCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedCtx")
            .field("jobs", &self.jobs.len())
            .field("units", &self.units)
            .field("heap", &self.heap)
            .field("domain", &self.domain)
            .field("release_master", &self.release_master)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl SchedCtx {
    pub fn new(config: &SchedConfig, hooks: Hooks) -> Self {
        Self {
            jobs: SlotMap::with_key(),
            units: (0..config.num_units).map(UnitEntry::new).collect(),
            heap: UnitHeap::new(),
            domain: RtDomain::new(),
            release_master: config.release_master,
            hooks,
            events: EventLog::new(config.record_events),
            active: false,
            prefer_local: config.prefer_local_linking,
            trace_all: config.trace_all_events,
        }
    }

    pub fn admit(&mut self, params: JobParams) -> JobId {
        self.jobs.insert_with_key(|id| Job::new(id, params))
    }

    pub fn job(&self, job: JobId) -> Option<&Job> {
        self.jobs.get(job)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn unit(&self, unit: UnitId) -> &UnitEntry {
        &self.units[unit]
    }

    pub fn units(&self) -> &[UnitEntry] {
        &self.units
    }

    pub fn release_master(&self) -> Option<UnitId> {
        self.release_master
    }

    pub fn domain(&self) -> &RtDomain {
        &self.domain
    }

    pub fn heap(&self) -> &UnitHeap {
        &self.heap
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_schedulable(&self, unit: UnitId) -> bool {
        unit < self.units.len() && self.units[unit].online && Some(unit) != self.release_master
    }

    pub fn lowest_prio_unit(&self) -> Option<UnitId> {
        self.heap.lowest()
    }

    pub fn effective_prio(&self, job: JobId) -> PrioKey {
        let entry = &self.jobs[job];
        match entry.inherited_from.filter(|&donor| self.jobs.contains_key(donor)) {
            Some(donor) => self.inherited_prio(donor),
            None => PrioKey {
                deadline: entry.deadline,
                owner: entry.id,
                inherited: false,
            },
        }
    }

    pub fn inherited_prio(&self, donor: JobId) -> PrioKey {
        let entry = &self.jobs[donor];
        PrioKey {
            deadline: entry.deadline,
            owner: entry.id,
            inherited: true,
        }
    }

    pub fn linked_prio(&self, unit: UnitId) -> Option<PrioKey> {
        self.units[unit].linked.map(|job| self.effective_prio(job))
    }
}
