use tracing::{debug, trace};

use super::event::SchedEvent;
use super::state::{Job, JobId, SchedCtx, UnitId};

impl SchedCtx {
    pub(crate) fn task_new(
        &mut self,
        job: JobId,
        local: Option<UnitId>,
        on_rq: bool,
        running_on: Option<UnitId>,
    ) {
        let now = self.hooks.clock.now();
        debug!(job = ?job, now, on_rq, ?running_on, "new real-time job");

        self.jobs[job].setup_release(now);
        self.record_release(job);

        if let Some(unit) = running_on {
            if Some(unit) == self.release_master {
                // Never runs real-time work; get it off the master.
                self.preempt(unit);
                self.jobs[job].scheduled_on = None;
            } else {
                assert!(
                    self.units[unit].scheduled.is_none(),
                    "{job:?} starts on unit {unit}, which already runs {:?}",
                    self.units[unit].scheduled
                );
                self.units[unit].scheduled = Some(job);
                self.jobs[job].scheduled_on = Some(unit);
            }
        } else {
            self.jobs[job].scheduled_on = None;
        }
        self.jobs[job].linked_on = None;

        if on_rq || running_on.is_some() {
            self.job_arrival(job, local);
        }
    }

    pub(crate) fn task_wake_up(&mut self, job: JobId, local: Option<UnitId>) {
        let now = self.hooks.clock.now();
        debug!(job = ?job, now, "wake up");

        self.jobs[job].runtime.runnable = true;
        let released = self
            .hooks
            .lifecycle
            .infer_sporadic_release(&mut self.jobs[job], now);
        if released {
            debug!(job = ?job, release = now, "inferred sporadic release");
            self.record_release(job);
            self.donor_deadline_moved(job, local);
        }
        self.events.record(SchedEvent::Resume { job });
        self.job_arrival(job, local);
    }

    pub(crate) fn task_block(&mut self, job: JobId) {
        debug!(job = ?job, "block");
        self.jobs[job].runtime.runnable = false;
        self.events.record(SchedEvent::Block { job });

        let linked_on = self.jobs[job].linked_on;
        self.unlink(job);
        self.signal_units(linked_on, self.jobs[job].scheduled_on);
    }

    pub(crate) fn task_exit(&mut self, job: JobId) -> Job {
        debug!(job = ?job, "exit");
        if let Some(heir) = self.jobs.values().find(|entry| entry.inherited_from == Some(job)) {
            panic!("{job:?} exits while {:?} still inherits its priority", heir.id);
        }

        let linked_on = self.jobs[job].linked_on;
        self.unlink(job);
        let scheduled_on = self.jobs[job].scheduled_on.take();
        if let Some(unit) = scheduled_on {
            self.units[unit].scheduled = None;
        }
        self.signal_units(linked_on, scheduled_on);

        self.events.record(SchedEvent::Exit { job });
        // `job` was looked up above, so it is present
        self.jobs
            .remove(job)
            .expect("exiting job vanished from the job table")
    }

    // A unit that lost its link, or lost the job it ran, has to pick again.
    fn signal_units(&self, linked_on: Option<UnitId>, scheduled_on: Option<UnitId>) {
        for unit in [linked_on, scheduled_on].into_iter().flatten() {
            self.hooks.signals.request(unit);
        }
    }

    pub(crate) fn release_jobs(&mut self, local: Option<UnitId>) -> usize {
        let now = self.hooks.clock.now();
        let due = self.domain.take_due(now);
        if due.is_empty() {
            return 0;
        }

        let batch: Vec<_> = due
            .iter()
            .map(|&job| (job, self.effective_prio(job)))
            .collect();
        self.domain.merge_released(batch);
        for &job in &due {
            self.record_release(job);
        }
        if self.trace_all {
            trace!(now, released = due.len(), "released jobs");
        }

        self.check_for_preemptions(local);
        due.len()
    }

    pub(crate) fn complete_job(&mut self, job: JobId) {
        self.jobs[job].runtime.completed = true;
        if let Some(unit) = self.jobs[job].scheduled_on {
            self.hooks.signals.request(unit);
        }
    }

    pub(crate) fn account(&mut self, job: JobId, delta: u64) -> bool {
        let entry = &mut self.jobs[job];
        entry.runtime.exec_time = entry.runtime.exec_time.saturating_add(delta);
        let exhausted = self.hooks.lifecycle.budget_exhausted(entry);
        if exhausted {
            if let Some(unit) = entry.scheduled_on {
                trace!(job = ?job, unit, "budget exhausted");
                self.hooks.signals.request(unit);
            }
        }
        exhausted
    }

    pub(crate) fn enter_np_section(&mut self, job: JobId) {
        self.jobs[job].runtime.np = true;
    }

    pub(crate) fn exit_np_section(&mut self, job: JobId) -> bool {
        let entry = &mut self.jobs[job];
        entry.runtime.np = false;
        if !std::mem::take(&mut entry.runtime.exit_np_requested) {
            return false;
        }
        match entry.scheduled_on {
            Some(unit) => {
                self.hooks.signals.request(unit);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::SchedConfig;
    use crate::core::hooks::{Hooks, ManualClock};
    use crate::core::state::JobParams;

    fn ctx_with_clock(config: SchedConfig) -> (SchedCtx, ManualClock) {
        let clock = ManualClock::new(0);
        let mut hooks = Hooks::new(config.num_units);
        hooks.clock = Arc::new(clock.clone());
        let mut ctx = SchedCtx::new(&config, hooks);
        let all: Vec<_> = (0..config.num_units).collect();
        ctx.activate(&all).unwrap();
        (ctx, clock)
    }

    fn ctx(units: usize) -> (SchedCtx, ManualClock) {
        ctx_with_clock(SchedConfig::with_units(units))
    }

    #[test]
    fn new_job_is_released_now_and_linked() {
        let (mut ctx, clock) = ctx(2);
        clock.set(7);
        let a = ctx.admit(JobParams::periodic(10, 2));
        ctx.task_new(a, None, true, None);

        let entry = &ctx.jobs[a];
        assert_eq!((entry.release, entry.deadline, entry.job_no), (7, 17, 1));
        assert!(entry.linked_on.is_some());
        assert!(ctx.hooks.signals.is_pending(entry.linked_on.unwrap()));
    }

    #[test]
    fn new_job_already_running_stays_put() {
        let (mut ctx, _) = ctx(2);
        let a = ctx.admit(JobParams::periodic(10, 2));
        ctx.task_new(a, None, false, Some(1));
        assert_eq!(ctx.units[1].scheduled, Some(a));
        assert_eq!(ctx.jobs[a].scheduled_on, Some(1));
        assert_eq!(ctx.jobs[a].linked_on, Some(1), "no migration on first link");
    }

    #[test]
    fn new_job_on_release_master_is_pushed_off() {
        let config = SchedConfig {
            release_master: Some(0),
            ..SchedConfig::with_units(2)
        };
        let (mut ctx, _) = ctx_with_clock(config);
        let a = ctx.admit(JobParams::periodic(10, 2));
        ctx.task_new(a, None, false, Some(0));
        assert!(ctx.hooks.signals.take(0));
        assert_eq!(ctx.units[0].scheduled, None);
        assert_eq!(ctx.jobs[a].scheduled_on, None);
        assert_eq!(ctx.jobs[a].linked_on, Some(1));
    }

    #[test]
    fn new_job_not_on_runqueue_waits() {
        let (mut ctx, _) = ctx(1);
        let a = ctx.admit(JobParams::periodic(10, 2));
        ctx.task_new(a, None, false, None);
        assert!(!ctx.jobs[a].queued);
        assert_eq!(ctx.jobs[a].linked_on, None);
    }

    #[test]
    fn tardy_sporadic_wake_up_starts_new_instance() {
        let (mut ctx, clock) = ctx(1);
        let a = ctx.admit(JobParams::periodic(10, 2).sporadic());
        ctx.task_new(a, None, false, None);
        ctx.jobs[a].runtime.runnable = false;

        clock.set(25);
        ctx.task_wake_up(a, None);
        let entry = &ctx.jobs[a];
        assert_eq!((entry.release, entry.deadline, entry.job_no), (25, 35, 2));
        assert_eq!(entry.linked_on, Some(0));
    }

    #[test]
    fn timely_periodic_wake_up_keeps_instance() {
        let (mut ctx, clock) = ctx(1);
        let a = ctx.admit(JobParams::periodic(10, 2));
        ctx.task_new(a, None, false, None);
        clock.set(25);
        ctx.task_wake_up(a, None);
        assert_eq!(ctx.jobs[a].job_no, 1);
        assert_eq!(ctx.jobs[a].deadline, 10);
    }

    #[test]
    fn blocking_unlinks_and_signals() {
        let (mut ctx, _) = ctx(1);
        let a = ctx.admit(JobParams::periodic(10, 2));
        ctx.task_new(a, None, true, None);
        ctx.hooks.signals.take(0);

        ctx.task_block(a);
        assert!(!ctx.jobs[a].runtime.runnable);
        assert_eq!(ctx.units[0].linked, None);
        assert!(ctx.hooks.signals.take(0));
    }

    #[test]
    fn exit_clears_unit_and_returns_job() {
        let (mut ctx, _) = ctx(1);
        let a = ctx.admit(JobParams::periodic(10, 2));
        ctx.task_new(a, None, false, Some(0));

        let gone = ctx.task_exit(a);
        assert_eq!(gone.id(), a);
        assert_eq!(ctx.units[0].scheduled, None);
        assert_eq!(ctx.units[0].linked, None);
        assert_eq!(ctx.job_count(), 0);
    }

    #[test]
    #[should_panic(expected = "still inherits")]
    fn exit_of_priority_donor_is_fatal() {
        let (mut ctx, _) = ctx(1);
        let a = ctx.admit(JobParams::periodic(10, 2));
        let donor = ctx.admit(JobParams::periodic(5, 1));
        ctx.jobs[a].inherited_from = Some(donor);
        ctx.task_exit(donor);
    }

    #[test]
    fn release_jobs_merges_due_batch() {
        let (mut ctx, clock) = ctx(2);
        for _ in 0..3 {
            let job = ctx.admit(JobParams::periodic(10, 2));
            ctx.jobs[job].setup_release(5);
            ctx.requeue(job);
        }
        assert_eq!(ctx.release_jobs(None), 0);
        assert_eq!(ctx.domain.pending_len(), 3);

        clock.set(5);
        assert_eq!(ctx.release_jobs(None), 3);
        assert_eq!(ctx.domain.pending_len(), 0);
        assert_eq!(ctx.domain.ready_len(), 1);
        assert!(ctx.units.iter().all(|unit| unit.linked.is_some()));
    }

    #[test]
    fn exit_np_signals_only_after_deferred_preemption() {
        let (mut ctx, _) = ctx(1);
        let a = ctx.admit(JobParams::periodic(10, 2));
        ctx.task_new(a, None, false, Some(0));
        ctx.hooks.signals.take(0);

        ctx.enter_np_section(a);
        assert!(!ctx.exit_np_section(a));
        ctx.enter_np_section(a);
        ctx.preempt(0);
        assert!(!ctx.hooks.signals.is_pending(0));
        assert!(ctx.exit_np_section(a));
        assert!(ctx.hooks.signals.take(0));
        assert!(!ctx.jobs[a].runtime.exit_np_requested);
    }

    #[test]
    fn account_signals_when_enforced_budget_runs_out() {
        let (mut ctx, _) = ctx(1);
        let a = ctx.admit(JobParams::periodic(10, 2).enforced());
        ctx.task_new(a, None, false, Some(0));
        ctx.hooks.signals.take(0);

        assert!(!ctx.account(a, 1));
        assert!(!ctx.hooks.signals.is_pending(0));
        assert!(ctx.account(a, 1));
        assert!(ctx.hooks.signals.take(0));
    }

    #[test]
    fn complete_job_signals_running_unit() {
        let (mut ctx, _) = ctx(1);
        let a = ctx.admit(JobParams::periodic(10, 2));
        ctx.task_new(a, None, false, Some(0));
        ctx.hooks.signals.take(0);
        ctx.complete_job(a);
        assert!(ctx.jobs[a].runtime.completed);
        assert!(ctx.hooks.signals.take(0));
    }
}
