use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{DomainInfo, SchedPlugin};
use crate::config::SchedConfig;
use crate::core::{
    AffinityResolver, BudgetArbiter, Clock, Hooks, Job, JobId, JobLifecycle, JobParams,
    ReleaseHandle, ReschedSignals, SchedCtx, SchedEvent, UnitId,
};
use crate::error::{SchedError, SchedResult};

/// Assembles a [`GsnEdfM`] with non-default collaborators.
pub struct GsnEdfMBuilder {
    config: SchedConfig,
    clock: Option<Arc<dyn Clock>>,
    budget: Option<Box<dyn BudgetArbiter>>,
    affinity: Option<Box<dyn AffinityResolver>>,
    lifecycle: Option<Box<dyn JobLifecycle>>,
}

impl GsnEdfMBuilder {
    pub fn new(config: SchedConfig) -> Self {
        Self {
            config,
            clock: None,
            budget: None,
            affinity: None,
            lifecycle: None,
        }
    }

    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    #[must_use]
    pub fn budget(mut self, budget: impl BudgetArbiter + 'static) -> Self {
        self.budget = Some(Box::new(budget));
        self
    }

    #[must_use]
    pub fn affinity(mut self, affinity: impl AffinityResolver + 'static) -> Self {
        self.affinity = Some(Box::new(affinity));
        self
    }

    #[must_use]
    pub fn lifecycle(mut self, lifecycle: impl JobLifecycle + 'static) -> Self {
        self.lifecycle = Some(Box::new(lifecycle));
        self
    }

    /// # Errors
    ///
    /// Returns [`SchedError::InvalidConfig`] when the configuration does not
    /// validate.
    pub fn build(self) -> SchedResult<GsnEdfM> {
        self.config.validate()?;

        let mut hooks = Hooks::new(self.config.num_units);
        if let Some(clock) = self.clock {
            hooks.clock = clock;
        }
        if let Some(budget) = self.budget {
            hooks.budget = budget;
        }
        if let Some(lifecycle) = self.lifecycle {
            hooks.lifecycle = lifecycle;
        }
        hooks.affinity = self.affinity;

        let signals = Arc::clone(&hooks.signals);
        let ctx = SchedCtx::new(&self.config, hooks);
        let releases = ctx.domain().release_handle();
        Ok(GsnEdfM {
            config: self.config,
            state: Mutex::new(ctx),
            signals,
            releases,
        })
    }
}

#[derive(Debug)]
pub struct GsnEdfM {
    config: SchedConfig,
    // the global scheduling lock
    state: Mutex<SchedCtx>,
    signals: Arc<ReschedSignals>,
    releases: ReleaseHandle,
}

impl GsnEdfM {
    /// Plugin with default collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`SchedError::InvalidConfig`] when the configuration does not
    /// validate.
    pub fn new(config: SchedConfig) -> SchedResult<Self> {
        GsnEdfMBuilder::new(config).build()
    }

    pub fn builder(config: SchedConfig) -> GsnEdfMBuilder {
        GsnEdfMBuilder::new(config)
    }

    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    /// Handle for a host release timer: reads the next release instant
    /// without taking the global lock.
    pub fn release_handle(&self) -> ReleaseHandle {
        self.releases.clone()
    }

    pub fn resched_pending(&self, unit: UnitId) -> bool {
        unit < self.config.num_units && self.signals.is_pending(unit)
    }

    pub fn any_resched_pending(&self) -> bool {
        self.signals.any_pending()
    }

    /// Consume the reschedule request for `unit`, if any.
    pub fn take_resched(&self, unit: UnitId) -> bool {
        unit < self.config.num_units && self.signals.take(unit)
    }

    pub fn drain_events(&self) -> Vec<SchedEvent> {
        self.state.lock().events.drain()
    }

    /// Run `f` against the scheduling state under the global lock.
    pub fn inspect<T>(&self, f: impl FnOnce(&SchedCtx) -> T) -> T {
        f(&self.state.lock())
    }

    pub fn job(&self, job: JobId) -> Option<Job> {
        self.state.lock().job(job).cloned()
    }

    /// The single scheduling domain: every online unit but the release
    /// master.
    pub fn domain_info(&self) -> DomainInfo {
        let ctx = self.state.lock();
        Self::domain_of(&ctx)
    }

    fn domain_of(ctx: &SchedCtx) -> DomainInfo {
        DomainInfo {
            num_units: ctx.units().len(),
            units: (0..ctx.units().len())
                .filter(|&unit| ctx.is_schedulable(unit))
                .collect(),
            release_master: ctx.release_master(),
        }
    }

    /// The running job signals that its current instance is done.
    pub fn complete_job(&self, job: JobId) -> SchedResult<()> {
        self.with_job(job, |ctx| ctx.complete_job(job))
    }

    /// Charge `delta` ticks of execution to `job`. Returns true when an
    /// enforced budget is exhausted.
    pub fn account(&self, job: JobId, delta: u64) -> SchedResult<bool> {
        self.with_job(job, |ctx| ctx.account(job, delta))
    }

    pub fn enter_np_section(&self, job: JobId) -> SchedResult<()> {
        self.with_job(job, |ctx| ctx.enter_np_section(job))
    }

    /// Returns true when a preemption had been deferred and the job's unit
    /// was signalled.
    pub fn exit_np_section(&self, job: JobId) -> SchedResult<bool> {
        self.with_job(job, |ctx| ctx.exit_np_section(job))
    }

    fn check_unit_range(&self, unit: UnitId) -> SchedResult<()> {
        if unit < self.config.num_units {
            Ok(())
        } else {
            Err(SchedError::UnitOutOfRange {
                unit,
                num_units: self.config.num_units,
            })
        }
    }

    fn check_local(&self, local: Option<UnitId>) -> SchedResult<()> {
        local.map_or(Ok(()), |unit| self.check_unit_range(unit))
    }

    fn check_online(ctx: &SchedCtx, unit: UnitId) -> SchedResult<()> {
        if ctx.unit(unit).is_online() {
            Ok(())
        } else {
            Err(SchedError::UnitOffline(unit))
        }
    }

    fn check_job(ctx: &SchedCtx, job: JobId) -> SchedResult<()> {
        if ctx.job(job).is_some() {
            Ok(())
        } else {
            Err(SchedError::UnknownJob(job))
        }
    }

    fn lock_active(&self) -> SchedResult<parking_lot::MutexGuard<'_, SchedCtx>> {
        let ctx = self.state.lock();
        if ctx.is_active() {
            Ok(ctx)
        } else {
            Err(SchedError::NotActive)
        }
    }

    fn with_job<T>(&self, job: JobId, f: impl FnOnce(&mut SchedCtx) -> T) -> SchedResult<T> {
        let mut ctx = self.lock_active()?;
        Self::check_job(&ctx, job)?;
        Ok(f(&mut ctx))
    }
}

impl SchedPlugin for GsnEdfM {
    fn name(&self) -> &'static str {
        "GSN-EDF-M"
    }

    fn admit(&self, params: JobParams) -> SchedResult<JobId> {
        if params.period == 0 {
            return Err(SchedError::InvalidParams("period must be positive"));
        }
        if params.relative_deadline == 0 {
            return Err(SchedError::InvalidParams("relative deadline must be positive"));
        }
        let mut ctx = self.lock_active()?;
        let job = ctx.admit(params);
        debug!(job = ?job, "admitted");
        Ok(job)
    }

    fn task_new(
        &self,
        job: JobId,
        local: Option<UnitId>,
        on_rq: bool,
        running_on: Option<UnitId>,
    ) -> SchedResult<()> {
        self.check_local(local)?;
        if let Some(unit) = running_on {
            self.check_unit_range(unit)?;
        }
        let mut ctx = self.lock_active()?;
        Self::check_job(&ctx, job)?;
        if let Some(unit) = running_on {
            Self::check_online(&ctx, unit)?;
        }
        ctx.task_new(job, local, on_rq, running_on);
        Ok(())
    }

    fn task_wake_up(&self, job: JobId, local: Option<UnitId>) -> SchedResult<()> {
        self.check_local(local)?;
        self.with_job(job, |ctx| ctx.task_wake_up(job, local))
    }

    fn job_arrival(&self, job: JobId, local: Option<UnitId>) -> SchedResult<()> {
        self.check_local(local)?;
        self.with_job(job, |ctx| ctx.job_arrival(job, local))
    }

    fn task_blocked(&self, job: JobId) -> SchedResult<()> {
        self.with_job(job, |ctx| ctx.task_block(job))
    }

    fn task_exited(&self, job: JobId) -> SchedResult<Job> {
        self.with_job(job, |ctx| ctx.task_exit(job))
    }

    fn schedule(&self, unit: UnitId, prev: Option<JobId>) -> SchedResult<Option<JobId>> {
        self.check_unit_range(unit)?;
        if Some(unit) == self.config.release_master {
            // never runs real-time jobs
            self.signals.take(unit);
            return Ok(None);
        }

        let mut ctx = self.lock_active()?;
        Self::check_online(&ctx, unit)?;
        if let Some(job) = prev {
            Self::check_job(&ctx, job)?;
        }
        self.signals.take(unit);
        Ok(ctx.schedule(unit, prev))
    }

    fn finish_switch(&self, unit: UnitId, current: Option<JobId>) -> SchedResult<()> {
        self.check_unit_range(unit)?;
        if Some(unit) == self.config.release_master {
            return Ok(());
        }
        let mut ctx = self.lock_active()?;
        Self::check_online(&ctx, unit)?;
        if let Some(job) = current {
            Self::check_job(&ctx, job)?;
        }
        ctx.finish_switch(unit, current);
        Ok(())
    }

    fn release_jobs(&self, local: Option<UnitId>) -> SchedResult<usize> {
        self.check_local(local)?;
        let mut ctx = self.lock_active()?;
        Ok(ctx.release_jobs(local))
    }

    fn set_priority_inheritance(
        &self,
        job: JobId,
        donor: JobId,
        local: Option<UnitId>,
    ) -> SchedResult<()> {
        self.check_local(local)?;
        if job == donor {
            return Err(SchedError::InvalidParams("a job cannot inherit its own priority"));
        }
        let mut ctx = self.lock_active()?;
        Self::check_job(&ctx, job)?;
        Self::check_job(&ctx, donor)?;
        if ctx.job(job).and_then(Job::inherited_from) == Some(donor) {
            return Ok(());
        }
        // inheritance only ever raises a priority
        if !ctx
            .inherited_prio(donor)
            .higher_than(&ctx.effective_prio(job))
        {
            debug!(job = ?job, donor = ?donor, "donor does not outrank the job");
            return Err(SchedError::InvalidParams(
                "donor priority does not exceed the job's effective priority",
            ));
        }
        ctx.set_priority_inheritance(job, donor, local);
        Ok(())
    }

    fn clear_priority_inheritance(&self, job: JobId, local: Option<UnitId>) -> SchedResult<()> {
        self.check_local(local)?;
        self.with_job(job, |ctx| ctx.clear_priority_inheritance(job, local))
    }

    fn activate(&self, online: &[UnitId]) -> SchedResult<DomainInfo> {
        let mut ctx = self.state.lock();
        let schedulable = ctx.activate(online)?;
        info!(
            plugin = self.name(),
            units = ?schedulable,
            release_master = ?self.config.release_master,
            "activated"
        );
        Ok(Self::domain_of(&ctx))
    }

    fn deactivate(&self) -> SchedResult<()> {
        self.state.lock().deactivate()?;
        info!(plugin = self.name(), "deactivated");
        Ok(())
    }
}
