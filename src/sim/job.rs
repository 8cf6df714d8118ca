use crate::core::{JobParams, Ticks};

/// One periodic task of a simulated workload.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub params: JobParams,
    /// Preferred unit of the first release (passed as the invoking unit).
    pub home: Option<usize>,
}

impl TaskSpec {
    pub fn periodic(period: Ticks, exec_cost: Ticks) -> Self {
        Self {
            params: JobParams::periodic(period, exec_cost),
            home: None,
        }
    }

    pub fn with_params(params: JobParams) -> Self {
        Self { params, home: None }
    }

    pub fn utilization(&self) -> f64 {
        self.params.exec_cost as f64 / self.params.period as f64
    }
}

/// A job instance that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    /// Index of the task in the workload.
    pub task: usize,
    pub job_no: u64,
    pub release: Ticks,
    pub deadline: Ticks,
    pub completed_at: Ticks,
}

impl JobRecord {
    pub fn response_time(&self) -> Ticks {
        self.completed_at.saturating_sub(self.release)
    }

    pub fn tardiness(&self) -> Ticks {
        self.completed_at.saturating_sub(self.deadline)
    }

    pub fn missed_deadline(&self) -> bool {
        self.completed_at > self.deadline
    }
}
