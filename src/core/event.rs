use super::state::{JobId, Ticks, UnitId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedEvent {
    Linked {
        job: JobId,
        unit: UnitId,
    },
    // Unit lost its link and is idle until something is linked again
    Unlinked {
        unit: UnitId,
    },
    Preempt {
        unit: UnitId,
    },
    Scheduled {
        unit: UnitId,
        job: JobId,
        at: Ticks,
    },
    // Unit switched away from a job and has nothing to run
    Idle {
        unit: UnitId,
        at: Ticks,
    },
    Release {
        job: JobId,
        job_no: u64,
        release: Ticks,
        deadline: Ticks,
    },
    Completion {
        job: JobId,
        job_no: u64,
        forced: bool,
    },
    Block {
        job: JobId,
    },
    Resume {
        job: JobId,
    },
    Exit {
        job: JobId,
    },
    Inherit {
        job: JobId,
        donor: JobId,
    },
    InheritCleared {
        job: JobId,
    },
}

#[derive(Debug, Default)]
pub struct EventLog {
    enabled: bool,
    events: Vec<SchedEvent>,
}

impl EventLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            events: Vec::new(),
        }
    }

    pub fn record(&mut self, event: SchedEvent) {
        if self.enabled {
            self.events.push(event);
        }
    }

    pub fn drain(&mut self) -> Vec<SchedEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
