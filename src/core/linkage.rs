use tracing::{debug, info, trace, warn};

use super::event::SchedEvent;
use super::state::{JobId, SchedCtx, UnitId};
use crate::error::{SchedError, SchedResult};

impl SchedCtx {
    pub(crate) fn update_unit_position(&mut self, unit: UnitId) {
        if !self.is_schedulable(unit) {
            return;
        }
        let linked = self.linked_prio(unit);
        self.heap.update(unit, linked);
    }

    // The previous job is not requeued. A job still running on another unit
    // is linked there and that unit's job moves here.
    pub(crate) fn link(&mut self, job: Option<JobId>, unit: UnitId) {
        if let Some(prev) = self.units[unit].linked {
            self.jobs[prev].linked_on = None;
        }

        let mut job = job;
        if let Some(candidate) = job {
            assert!(
                self.is_schedulable(unit),
                "linking {candidate:?} to unit {unit}, which does not run real-time jobs"
            );
            assert!(
                self.jobs[candidate].linked_on.is_none(),
                "{candidate:?} is already linked to unit {:?}",
                self.jobs[candidate].linked_on
            );

            if let Some(on) = self.jobs[candidate].scheduled_on {
                if on != unit {
                    if self.trace_all {
                        trace!(job = ?candidate, unit = on, "already scheduled on unit {on}, updating link");
                    }
                    let displaced = self.units[on].linked;
                    self.jobs[candidate].linked_on = Some(on);
                    self.units[on].linked = Some(candidate);
                    self.update_unit_position(on);
                    self.events.record(SchedEvent::Linked {
                        job: candidate,
                        unit: on,
                    });
                    job = displaced;
                }
            }
            // might be None after the swap
            if let Some(linked) = job {
                self.jobs[linked].linked_on = Some(unit);
            }
        }

        self.units[unit].linked = job;
        match job {
            Some(linked) => {
                if self.trace_all {
                    trace!(job = ?linked, unit, "linked");
                }
                self.events.record(SchedEvent::Linked { job: linked, unit });
            }
            None => {
                if self.trace_all {
                    trace!(unit, "nothing linked");
                }
                self.events.record(SchedEvent::Unlinked { unit });
            }
        }
        self.update_unit_position(unit);
    }

    pub(crate) fn unlink(&mut self, job: JobId) -> bool {
        if let Some(unit) = self.jobs[job].linked_on {
            assert_eq!(
                self.units[unit].linked,
                Some(job),
                "{job:?} claims unit {unit}, which is linked elsewhere"
            );
            self.jobs[job].linked_on = None;
            self.link(None, unit);
            true
        } else if self.jobs[job].queued {
            // Unlinked but possibly still running: it can only be waiting in
            // the domain.
            self.remove_queued(job);
            true
        } else {
            false
        }
    }

    fn remove_queued(&mut self, job: JobId) {
        let removed = self.domain.remove(job);
        assert!(removed, "{job:?} is marked queued but is not in the domain");
        self.jobs[job].queued = false;
    }

    pub(crate) fn take_ready(&mut self) -> Option<JobId> {
        let job = self.domain.take_ready()?;
        self.jobs[job].queued = false;
        Some(job)
    }

    pub(crate) fn requeue(&mut self, job: JobId) {
        let now = self.hooks.clock.now();
        let prio = self.effective_prio(job);
        let entry = &mut self.jobs[job];
        assert!(!entry.queued, "requeue of {job:?}, which is already queued");
        entry.queued = true;
        let release = entry.release;
        let ready = entry.params.early_release || entry.is_released(now);

        if ready {
            self.domain.insert_ready(job, prio);
        } else {
            self.domain.insert_pending(job, release);
        }
        if self.trace_all {
            trace!(job = ?job, release, ready, "requeued");
        }
    }

    pub(crate) fn job_arrival(&mut self, job: JobId, local: Option<UnitId>) {
        assert!(
            self.jobs[job].linked_on.is_none(),
            "arrival of {job:?} while it is still linked"
        );
        self.requeue(job);
        self.check_for_preemptions(local);
    }

    pub(crate) fn preemption_needed(&self, linked: Option<JobId>) -> bool {
        let Some((_, head)) = self.domain.peek_ready() else {
            return false;
        };
        match linked {
            None => true,
            Some(job) => head.higher_than(&self.effective_prio(job)),
        }
    }

    pub(crate) fn check_for_preemptions(&mut self, local: Option<UnitId>) {
        if self.prefer_local {
            if let Some(local) = local.filter(|&unit| self.is_schedulable(unit)) {
                if self.units[local].linked.is_none() && self.domain.has_ready() {
                    if let Some(job) = self.take_ready() {
                        if self.trace_all {
                            trace!(job = ?job, unit = local, "linking to local unit to avoid a reschedule signal");
                        }
                        self.link_with_budget(job, local);
                    }
                }
            }
        }

        while let Some(last) = self.heap.lowest() {
            if !self.preemption_needed(self.units[last].linked) {
                break;
            }
            let Some(job) = self.take_ready() else {
                break;
            };
            if self.trace_all {
                trace!(job = ?job, unit = last, "check_for_preemptions: attempting to link");
            }

            let target = match self.affinity_target(job) {
                Some(unit) => unit,
                None => {
                    let displaced = self.units[last].linked;
                    if let Some(displaced) = displaced.filter(|&d| self.requeue_preempted_job(d)) {
                        self.requeue(displaced);
                    }
                    last
                }
            };
            self.link_with_budget(job, target);
        }
    }

    pub(crate) fn requeue_preempted_job(&self, job: JobId) -> bool {
        let entry = &self.jobs[job];
        let lifecycle = &self.hooks.lifecycle;
        !lifecycle.signaled_completion(entry) && !lifecycle.budget_exhausted(entry)
    }

    fn affinity_target(&self, job: JobId) -> Option<UnitId> {
        let resolver = self.hooks.affinity.as_ref()?;
        let start = self.jobs[job].last_unit?;
        let hint = resolver.nearest_available(start, &self.units, self.release_master)?;
        if self.is_schedulable(hint) && self.units[hint].linked.is_none() {
            Some(hint)
        } else {
            warn!(job = ?job, unit = hint, "affinity hint names a busy or unschedulable unit; ignoring it");
            None
        }
    }

    fn link_with_budget(&mut self, job: JobId, unit: UnitId) {
        self.link_budgeted(job, unit);
        self.preempt(unit);
    }

    // Each job is queried and assigned on the unit it ends up linked to.
    pub(crate) fn link_budgeted(&mut self, job: JobId, unit: UnitId) {
        let holder = self.jobs[job].scheduled_on.filter(|&on| on != unit);
        self.query_budget(job, holder.unwrap_or(unit));
        if let Some(moved) = holder.and_then(|on| self.units[on].linked) {
            self.query_budget(moved, unit);
        }

        self.link(Some(job), unit);
        if let Some(on) = holder {
            self.assign_budget(on);
        }
        self.assign_budget(unit);
    }

    fn query_budget(&self, job: JobId, unit: UnitId) {
        let requested = self.jobs[job].params.mem_budget;
        let available = self.hooks.budget.query_available(unit);
        if requested > available {
            debug!(
                job = ?job,
                unit,
                requested,
                available,
                "memory budget over-subscribed; linking anyway"
            );
        } else if self.trace_all {
            trace!(job = ?job, unit, requested, available, "memory budget query");
        }
    }

    pub(crate) fn assign_budget(&mut self, unit: UnitId) {
        let requested = self.units[unit]
            .linked
            .map_or(0, |job| self.jobs[job].params.mem_budget);
        self.hooks.budget.assign(unit, requested);
    }

    pub(crate) fn preempt(&mut self, unit: UnitId) {
        self.events.record(SchedEvent::Preempt { unit });
        match self.units[unit].scheduled {
            Some(job) if self.hooks.lifecycle.in_np_section(&self.jobs[job]) => {
                if self.trace_all {
                    trace!(job = ?job, unit, "non-preemptive; requesting section exit");
                }
                self.hooks.lifecycle.request_section_exit(&mut self.jobs[job]);
            }
            _ => self.hooks.signals.request(unit),
        }
    }

    pub(crate) fn job_completion(&mut self, job: JobId, forced: bool, local: Option<UnitId>) {
        let now = self.hooks.clock.now();
        let job_no = self.jobs[job].job_no;
        trace!(job = ?job, job_no, forced, "job completion");
        self.events.record(SchedEvent::Completion {
            job,
            job_no,
            forced,
        });

        self.jobs[job].runtime.completed = false;
        self.hooks
            .lifecycle
            .advance_to_next_period(&mut self.jobs[job]);

        let released = {
            let entry = &self.jobs[job];
            entry.params.early_release || entry.is_released(now)
        };
        if released {
            self.record_release(job);
        }

        self.unlink(job);
        self.donor_deadline_moved(job, local);
        if self.hooks.lifecycle.is_runnable(&self.jobs[job]) {
            self.job_arrival(job, local);
        }
    }

    pub(crate) fn record_release(&mut self, job: JobId) {
        let entry = &self.jobs[job];
        let event = SchedEvent::Release {
            job,
            job_no: entry.job_no,
            release: entry.release,
            deadline: entry.deadline,
        };
        self.events.record(event);
    }

    pub(crate) fn activate(&mut self, online: &[UnitId]) -> SchedResult<Vec<UnitId>> {
        if online.is_empty() {
            return Err(SchedError::EmptyUnitSet);
        }
        let num_units = self.units.len();
        if let Some(&unit) = online.iter().find(|&&unit| unit >= num_units) {
            return Err(SchedError::UnitOutOfRange { unit, num_units });
        }
        if !self.jobs.is_empty() {
            return Err(SchedError::JobsRemaining {
                count: self.jobs.len(),
            });
        }
        if let Some(release_master) = self.release_master {
            if online.iter().all(|&unit| unit == release_master) {
                return Err(SchedError::NoSchedulableUnits { release_master });
            }
        }

        self.heap.clear();
        for entry in &mut self.units {
            entry.linked = None;
            entry.scheduled = None;
            entry.online = false;
        }
        for &unit in online {
            self.units[unit].online = true;
        }

        let mut schedulable = Vec::with_capacity(online.len());
        for unit in 0..num_units {
            if self.is_schedulable(unit) {
                trace!(unit, "initializing unit");
                self.update_unit_position(unit);
                schedulable.push(unit);
            } else if self.units[unit].online {
                info!(unit, "unit is the release master");
            }
        }
        self.active = true;
        Ok(schedulable)
    }

    pub(crate) fn deactivate(&mut self) -> SchedResult<()> {
        if !self.jobs.is_empty() {
            return Err(SchedError::JobsRemaining {
                count: self.jobs.len(),
            });
        }
        self.heap.clear();
        for entry in &mut self.units {
            entry.linked = None;
            entry.scheduled = None;
            entry.online = false;
        }
        self.active = false;
        Ok(())
    }
}
