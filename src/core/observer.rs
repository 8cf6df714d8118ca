use rustc_hash::FxHashMap;

use super::state::{JobId, SchedCtx, UnitId};

#[derive(Debug, Default)]
pub struct Observer {
    step: u64,
}

impl Observer {
    pub fn new() -> Self {
        Self { step: 0 }
    }

    pub fn steps(&self) -> u64 {
        self.step
    }

    pub fn observe(&mut self, ctx: &SchedCtx) {
        self.step += 1;
        let step = self.step;

        // Links point both ways, and no job is linked twice.
        let mut linked_to: FxHashMap<JobId, UnitId> = FxHashMap::default();
        for unit in ctx.units() {
            let Some(job) = unit.linked() else { continue };
            let entry = ctx
                .job(job)
                .unwrap_or_else(|| panic!("step {step}: unit {} links unknown {job:?}", unit.id()));
            debug_assert_eq!(
                entry.linked_on(),
                Some(unit.id()),
                "step {step}: unit {} links {job:?}, which points at {:?}",
                unit.id(),
                entry.linked_on()
            );
            let other = linked_to.insert(job, unit.id());
            debug_assert!(
                other.is_none(),
                "step {step}: {job:?} linked to both unit {other:?} and unit {}",
                unit.id()
            );
        }

        for entry in ctx.jobs() {
            let job = entry.id();
            if let Some(unit) = entry.linked_on() {
                debug_assert_eq!(
                    linked_to.get(&job),
                    Some(&unit),
                    "step {step}: {job:?} claims unit {unit}, which does not link it"
                );
            }
            debug_assert!(
                !(entry.is_queued() && entry.linked_on().is_some()),
                "step {step}: {job:?} is both queued and linked"
            );
            debug_assert_eq!(
                entry.is_queued(),
                ctx.domain().contains(job),
                "step {step}: queued flag of {job:?} disagrees with the domain"
            );
        }

        // Only meaningful between switches: `schedule` moves `scheduled_on`
        // before `finish_switch` moves the unit's slot.
        for unit in ctx.units() {
            if let Some(job) = unit.scheduled() {
                debug_assert_eq!(
                    ctx.job(job).and_then(|entry| entry.scheduled_on()),
                    Some(unit.id()),
                    "step {step}: unit {} runs {job:?}, which does not point back",
                    unit.id()
                );
            }
        }

        // Ready keys track effective priority.
        for (job, key) in ctx.domain().ready_jobs() {
            debug_assert_eq!(
                key,
                ctx.effective_prio(job),
                "step {step}: stale ready-queue key for {job:?}"
            );
        }

        // Heap ranks match the linked jobs, and the top is the minimum.
        let lowest = ctx.heap().lowest().map(|unit| ctx.heap().rank(unit));
        for rank in ctx.heap().ranks() {
            debug_assert!(
                ctx.is_schedulable(rank.unit),
                "step {step}: unit {} in the heap but not schedulable",
                rank.unit
            );
            debug_assert_eq!(
                rank.linked,
                ctx.linked_prio(rank.unit),
                "step {step}: heap rank of unit {} is stale",
                rank.unit
            );
            if let Some(Some(lowest)) = lowest {
                debug_assert!(
                    lowest >= rank,
                    "step {step}: unit {} ranks below the heap top",
                    rank.unit
                );
            }
        }
        let schedulable = (0..ctx.units().len())
            .filter(|&unit| ctx.is_schedulable(unit))
            .count();
        debug_assert_eq!(
            ctx.heap().len(),
            schedulable,
            "step {step}: heap does not hold every schedulable unit"
        );
    }

    // Only valid with no reschedule pending.
    pub fn check_edf_order(&self, ctx: &SchedCtx) {
        let Some((head, prio)) = ctx.domain().peek_ready() else {
            return;
        };
        for unit in ctx.units().iter().filter(|unit| ctx.is_schedulable(unit.id())) {
            let linked = ctx.linked_prio(unit.id());
            debug_assert!(
                linked.is_some_and(|linked| !prio.higher_than(&linked)),
                "step {}: ready {head:?} outranks {linked:?} on unit {}",
                self.step,
                unit.id()
            );
        }
    }
}
