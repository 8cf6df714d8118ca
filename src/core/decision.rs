use tracing::trace;

use super::event::SchedEvent;
use super::state::{JobId, SchedCtx, UnitId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionFlags {
    pub exists: bool,
    pub blocks: bool,
    pub out_of_time: bool,
    pub np: bool,
    pub sleeps: bool,
    pub needs_switch: bool,
}

impl SchedCtx {
    pub fn decision_flags(&self, unit: UnitId) -> DecisionFlags {
        let entry = &self.units[unit];
        let lifecycle = &self.hooks.lifecycle;
        let scheduled = entry.scheduled.map(|job| &self.jobs[job]);
        DecisionFlags {
            exists: scheduled.is_some(),
            blocks: scheduled.is_some_and(|job| !lifecycle.is_runnable(job)),
            out_of_time: scheduled.is_some_and(|job| lifecycle.budget_exhausted(job)),
            np: scheduled.is_some_and(|job| lifecycle.in_np_section(job)),
            sleeps: scheduled.is_some_and(|job| lifecycle.signaled_completion(job)),
            needs_switch: entry.scheduled != entry.linked,
        }
    }

    // The unit's `scheduled` slot only moves in finish_switch
    pub(crate) fn schedule(&mut self, unit: UnitId, prev: Option<JobId>) -> Option<JobId> {
        let scheduled = self.units[unit].scheduled;
        assert_eq!(
            scheduled, prev,
            "unit {unit} records {scheduled:?} as running but the host reports {prev:?}"
        );

        let flags = self.decision_flags(unit);
        if self.trace_all {
            trace!(unit, ?prev, ?flags, "schedule invoked");
            if let (Some(linked), true) = (self.units[unit].linked, flags.needs_switch) {
                trace!(unit, ?prev, job = ?linked, "will be preempted");
            }
        }

        // A blocking job cannot keep running.
        if flags.blocks {
            if let Some(job) = scheduled {
                self.unlink(job);
            }
        }

        // Would like to switch but cannot: drop the link anyway and ask the
        // job to leave its section. Repeated requests are harmless.
        if flags.np && (flags.out_of_time || flags.needs_switch || flags.sleeps) {
            if let Some(job) = scheduled {
                self.unlink(job);
                self.hooks
                    .lifecycle
                    .request_section_exit(&mut self.jobs[job]);
            }
        }

        // Preemptable and either out of budget or done: the job instance
        // completes. A blocking job is not requeued by the completion.
        if !flags.np && (flags.out_of_time || flags.sleeps) {
            if let Some(job) = scheduled {
                self.job_completion(job, !flags.sleeps, Some(unit));
            }
        }

        // dropped from the queue while non-preemptive; put it back
        if !flags.np {
            if let Some(job) = scheduled.filter(|&job| self.is_stranded(job)) {
                if self.trace_all {
                    trace!(job = ?job, unit, "requeueing job that left its non-preemptive section");
                }
                self.job_arrival(job, Some(unit));
            }
        }

        // A head still running elsewhere gets linked there, so keep taking
        while self.units[unit].linked.is_none() {
            let Some(job) = self.take_ready() else {
                break;
            };
            self.link_budgeted(job, unit);
        }
        if self.units[unit].linked.is_none() {
            // an idle unit holds no bandwidth
            self.assign_budget(unit);
        }

        let linked = self.units[unit].linked;
        let mut next = None;
        if (!flags.np || flags.blocks) && linked != scheduled {
            if let Some(job) = linked {
                self.jobs[job].scheduled_on = Some(unit);
                next = Some(job);
                if self.trace_all {
                    trace!(job = ?job, unit, "scheduled_on = {unit}");
                }
            }
            if let Some(job) = scheduled {
                // not going to run here any longer
                self.jobs[job].scheduled_on = None;
                if self.trace_all {
                    trace!(job = ?job, unit, "scheduled_on = none");
                }
            }
        } else if flags.exists {
            next = prev;
        }

        if self.trace_all {
            match next {
                Some(job) => trace!(job = ?job, unit, "picked"),
                None if flags.exists => trace!(unit, "becomes idle"),
                None => {}
            }
        }
        next
    }

    // Runnable, but neither linked nor queued anywhere
    fn is_stranded(&self, job: JobId) -> bool {
        let entry = &self.jobs[job];
        entry.linked_on.is_none() && !entry.queued && self.hooks.lifecycle.is_runnable(entry)
    }

    pub(crate) fn finish_switch(&mut self, unit: UnitId, current: Option<JobId>) {
        if let Some(job) = current {
            assert_eq!(
                self.jobs[job].scheduled_on,
                Some(unit),
                "unit {unit} switched to {job:?}, which it never picked"
            );
            self.jobs[job].last_unit = Some(unit);
        }
        self.units[unit].scheduled = current;

        let at = self.hooks.clock.now();
        let event = match current {
            Some(job) => SchedEvent::Scheduled { unit, job, at },
            None => SchedEvent::Idle { unit, at },
        };
        self.events.record(event);
        if self.trace_all {
            trace!(unit, ?current, "switch finished");
        }
    }
}
