use crate::core::{JobId, UnitId};

/// Failures reported to the host unit-management layer.
///
/// These cover misuse of the host-facing API only. A broken linkage
/// invariant inside the engine is never reported here: it panics, since there
/// is no state to fall back to once two jobs share a unit or a job has been
/// dropped from every structure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedError {
    /// The plugin has not been activated (or has been deactivated).
    #[error("scheduler is not active; call activate() with the online unit set first")]
    NotActive,

    /// The job id does not name an admitted job.
    #[error("unknown job {0:?}; it was never admitted or has already exited")]
    UnknownJob(JobId),

    /// A unit id outside the configured unit table.
    #[error("unit {unit} out of range (configured for {num_units} units)")]
    UnitOutOfRange {
        /// The offending unit.
        unit: UnitId,
        /// Size of the unit table.
        num_units: usize,
    },

    /// The unit exists but was not part of the activated unit set.
    #[error("unit {0} is offline")]
    UnitOffline(UnitId),

    /// `activate` was given no units at all.
    #[error("cannot activate with an empty unit set")]
    EmptyUnitSet,

    /// Every activated unit is the release master, so nothing can run jobs.
    #[error("no schedulable unit: the only online unit is the release master ({release_master})")]
    NoSchedulableUnits {
        /// The designated non-scheduling unit.
        release_master: UnitId,
    },

    /// Activation or deactivation attempted while jobs are still admitted.
    #[error("{count} jobs are still admitted; they must exit before the plugin is switched")]
    JobsRemaining {
        /// Number of admitted jobs.
        count: usize,
    },

    /// Malformed task parameters.
    #[error("invalid task parameters: {0}")]
    InvalidParams(&'static str),

    /// Malformed configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias used across the host-facing API.
pub type SchedResult<T> = Result<T, SchedError>;
