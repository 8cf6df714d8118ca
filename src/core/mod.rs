pub mod decision;
pub mod domain;
pub mod event;
pub mod heap;
pub mod hooks;
mod inheritance;
mod linkage;
pub mod observer;
pub mod state;
mod tasks;

pub use decision::DecisionFlags;
pub use domain::{ReleaseHandle, RtDomain};
pub use event::{EventLog, SchedEvent};
pub use heap::{UnitHeap, UnitRank};
pub use hooks::{
    AffinityResolver, BudgetArbiter, BudgetLedger, Clock, Hooks, JobLifecycle, LinearAffinity,
    ManualClock, PeriodicLifecycle, ReschedSignals, UnmeteredBudget,
};
pub use observer::Observer;
pub use state::{
    Job, JobClass, JobId, JobParams, JobRuntime, PrioKey, SchedCtx, Ticks, UnitEntry, UnitId,
};
