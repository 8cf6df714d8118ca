use rustc_hash::FxHashMap;
use tracing::warn;

use super::job::{JobRecord, TaskSpec};
use crate::{
    config::SchedConfig,
    core::{Clock, JobId, ManualClock, Observer, SchedEvent, Ticks, UnitId},
    error::SchedResult,
    scheduler::{GsnEdfM, GsnEdfMBuilder, SchedPlugin},
};

/// Discrete-time host: advances a manual clock one tick per step, fires the
/// release timer, services reschedule requests, and runs whatever each unit
/// has been switched to.
pub struct Sim {
    pub plugin: GsnEdfM,
    clock: ManualClock,
    tasks: Vec<JobId>,
    // JobId --> task index; used to attribute completions to tasks
    task_of: FxHashMap<JobId, usize>,
    // what the host is running on each unit
    running: Vec<Option<JobId>>,
    records: Vec<JobRecord>,
    observer: Observer,
}

impl Sim {
    pub fn new(config: SchedConfig, tasks: Vec<TaskSpec>) -> SchedResult<Self> {
        Self::with_builder(config, tasks, |builder| builder)
    }

    /// Like [`Sim::new`], letting the caller inject collaborators (budget
    /// arbiter, affinity resolver) into the plugin. The clock is always the
    /// simulation's.
    pub fn with_builder(
        config: SchedConfig,
        tasks: Vec<TaskSpec>,
        configure: impl FnOnce(GsnEdfMBuilder) -> GsnEdfMBuilder,
    ) -> SchedResult<Self> {
        let clock = ManualClock::new(0);
        let num_units = config.num_units;
        let plugin = configure(GsnEdfM::builder(config))
            .clock(clock.clone())
            .build()?;
        let online: Vec<UnitId> = (0..num_units).collect();
        plugin.activate(&online)?;

        let mut ids = Vec::with_capacity(tasks.len());
        let mut task_of = FxHashMap::default();
        for (index, spec) in tasks.into_iter().enumerate() {
            let job = plugin.admit(spec.params)?;
            plugin.task_new(job, spec.home, true, None)?;
            ids.push(job);
            task_of.insert(job, index);
        }

        Ok(Self {
            plugin,
            clock,
            tasks: ids,
            task_of,
            running: vec![None; num_units],
            records: Vec::new(),
            observer: Observer::new(),
        })
    }

    pub fn now(&self) -> Ticks {
        self.clock.now()
    }

    pub fn tasks(&self) -> &[JobId] {
        &self.tasks
    }

    pub fn running(&self, unit: UnitId) -> Option<JobId> {
        self.running.get(unit).copied().flatten()
    }

    pub fn records(&self) -> &[JobRecord] {
        &self.records
    }

    /// One tick. Returns the scheduling events recorded during it.
    pub fn step(&mut self) -> SchedResult<Vec<SchedEvent>> {
        let now = self.clock.now();
        self.plugin.release_jobs(None)?;
        self.reschedule()?;

        let quiescent = !self.plugin.any_resched_pending();
        self.plugin.inspect(|ctx| {
            self.observer.observe(ctx);
            if quiescent {
                self.observer.check_edf_order(ctx);
            }
        });

        self.execute(now)?;
        self.clock.advance(1);
        Ok(self.plugin.drain_events())
    }

    pub fn run(&mut self, ticks: Ticks) -> SchedResult<()> {
        for _ in 0..ticks {
            self.step()?;
        }
        Ok(())
    }

    // Each signalled unit runs its decision; a unit's decision may signal
    // others, so repeat until nothing is pending.
    fn reschedule(&mut self) -> SchedResult<()> {
        let max_rounds = 4 * self.running.len() + 4;
        for _ in 0..max_rounds {
            if !self.plugin.any_resched_pending() {
                return Ok(());
            }
            for unit in 0..self.running.len() {
                if !self.plugin.resched_pending(unit) {
                    continue;
                }
                let prev = self.running[unit];
                let next = self.plugin.schedule(unit, prev)?;
                if next != prev {
                    self.plugin.finish_switch(unit, next)?;
                    self.running[unit] = next;
                }
            }
        }
        warn!(
            now = self.clock.now(),
            "reschedule requests still pending after {max_rounds} rounds"
        );
        Ok(())
    }

    fn execute(&mut self, now: Ticks) -> SchedResult<()> {
        for unit in 0..self.running.len() {
            let Some(job) = self.running[unit] else {
                continue;
            };
            self.plugin.account(job, 1)?;
            let Some(state) = self.plugin.job(job) else {
                continue;
            };
            if state.runtime.completed || state.runtime.exec_time < state.params.exec_cost {
                continue;
            }
            self.plugin.complete_job(job)?;
            self.records.push(JobRecord {
                task: self.task_of[&job],
                job_no: state.job_no(),
                release: state.release(),
                deadline: state.deadline(),
                completed_at: now + 1,
            });
        }
        Ok(())
    }

    /// Response times of every completed job, in completion order.
    pub fn response_times(&self) -> impl Iterator<Item = f64> + '_ {
        self.records.iter().map(|record| record.response_time() as f64)
    }

    pub fn deadline_misses(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.missed_deadline())
            .count()
    }

    /// Exit every task and deactivate the plugin, returning the completion
    /// records.
    pub fn finish(mut self) -> SchedResult<Vec<JobRecord>> {
        for &job in &self.tasks {
            self.plugin.task_exited(job)?;
            for slot in &mut self.running {
                if *slot == Some(job) {
                    *slot = None;
                }
            }
        }
        self.plugin.deactivate()?;
        Ok(self.records)
    }
}
