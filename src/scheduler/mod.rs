pub mod gsn_edf;

use crate::core::{Job, JobId, JobParams, UnitId};
use crate::error::SchedResult;
pub use gsn_edf::{GsnEdfM, GsnEdfMBuilder};

/// Scheduling domain reported on activation: the units that share one ready
/// queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainInfo {
    pub num_units: usize,
    pub units: Vec<UnitId>,
    pub release_master: Option<UnitId>,
}

/// Entry points the host unit-management layer calls.
///
/// `local` names the unit the call is made from, when there is one; it lets
/// the plugin link directly to an idle invoking unit instead of signalling.
/// Every call is serialized by the plugin's global scheduling lock.
pub trait SchedPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create the record for a new real-time workload.
    fn admit(&self, params: JobParams) -> SchedResult<JobId>;

    /// Set up the first job instance. `on_rq` says the host has the job
    /// runnable; `running_on` names the unit already executing it.
    fn task_new(
        &self,
        job: JobId,
        local: Option<UnitId>,
        on_rq: bool,
        running_on: Option<UnitId>,
    ) -> SchedResult<()>;

    fn task_wake_up(&self, job: JobId, local: Option<UnitId>) -> SchedResult<()>;

    /// Queue an unlinked job and link it if it outranks a linked one.
    fn job_arrival(&self, job: JobId, local: Option<UnitId>) -> SchedResult<()>;

    fn task_blocked(&self, job: JobId) -> SchedResult<()>;

    fn task_exited(&self, job: JobId) -> SchedResult<Job>;

    /// Decide what `unit` runs next, given the job it runs now.
    fn schedule(&self, unit: UnitId, prev: Option<JobId>) -> SchedResult<Option<JobId>>;

    /// The host has switched `unit` to `current`.
    fn finish_switch(&self, unit: UnitId, current: Option<JobId>) -> SchedResult<()>;

    /// Release every pending job that is due. Returns how many were released.
    fn release_jobs(&self, local: Option<UnitId>) -> SchedResult<usize>;

    fn set_priority_inheritance(
        &self,
        job: JobId,
        donor: JobId,
        local: Option<UnitId>,
    ) -> SchedResult<()>;

    fn clear_priority_inheritance(&self, job: JobId, local: Option<UnitId>) -> SchedResult<()>;

    fn activate(&self, online: &[UnitId]) -> SchedResult<DomainInfo>;

    fn deactivate(&self) -> SchedResult<()>;
}
