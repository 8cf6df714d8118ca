use tracing::{debug, trace};

use super::event::SchedEvent;
use super::state::{JobId, SchedCtx, UnitId};

impl SchedCtx {
    pub(crate) fn set_priority_inheritance(
        &mut self,
        job: JobId,
        donor: JobId,
        local: Option<UnitId>,
    ) {
        assert!(
            self.jobs.contains_key(donor),
            "{job:?} inherits from {donor:?}, which does not exist"
        );
        debug!(job = ?job, donor = ?donor, "inherits priority");
        self.jobs[job].inherited_from = Some(donor);
        self.events.record(SchedEvent::Inherit { job, donor });

        if let Some(unit) = self.jobs[job].linked_on {
            // a raise is a key increase in the inverted heap
            trace!(job = ?job, unit, "linked; repositioning unit");
            self.update_unit_position(unit);
            return;
        }

        let check_preempt = if self.jobs[job].queued {
            let prio = self.effective_prio(job);
            self.domain.decrease_key(job, prio)
        } else {
            // whoever enqueues it next reads the new key
            trace!(job = ?job, "not queued; nothing to reorder");
            false
        };

        if check_preempt {
            self.check_for_preemptions(local);
        }
    }

    pub(crate) fn clear_priority_inheritance(&mut self, job: JobId, local: Option<UnitId>) {
        assert!(
            self.jobs[job].scheduled_on.is_some(),
            "{job:?} restores its priority but is not running"
        );
        debug!(job = ?job, "priority restored");
        self.jobs[job].inherited_from = None;
        self.events.record(SchedEvent::InheritCleared { job });

        // a lowered key has no incremental repair
        self.unlink(job);
        self.job_arrival(job, local);
    }

    // Heirs hold the donor's old deadline in the ready queue and unit heap.
    pub(crate) fn donor_deadline_moved(&mut self, donor: JobId, local: Option<UnitId>) {
        let heirs: Vec<JobId> = self
            .jobs
            .values()
            .filter(|entry| entry.inherited_from == Some(donor))
            .map(|entry| entry.id)
            .collect();
        if heirs.is_empty() {
            return;
        }

        for &heir in &heirs {
            let prio = self.effective_prio(heir);
            if let Some(unit) = self.jobs[heir].linked_on {
                self.update_unit_position(unit);
            } else if self.jobs[heir].queued {
                self.domain.rekey(heir, prio);
            }
            trace!(job = ?heir, donor = ?donor, deadline = prio.deadline, "heir re-keyed");
        }
        self.check_for_preemptions(local);
    }
}
