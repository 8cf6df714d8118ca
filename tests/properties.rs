// Seeded random operation sequences, invariants checked after every step.

use gsnedfm::core::{JobId, JobParams, ManualClock, Observer, SchedCtx, UnitId};
use gsnedfm::{GsnEdfM, SchedConfig, SchedPlugin};
use rand::prelude::*;
use rustc_hash::FxHashSet;

struct Stress {
    plugin: GsnEdfM,
    clock: ManualClock,
    running: Vec<Option<JobId>>,
    jobs: Vec<JobId>,
    observer: Observer,
    rng: StdRng,
}

impl Stress {
    fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let units = rng.random_range(1..=4);
        let release_master = (units > 1 && seed % 3 == 0).then_some(0);
        let config = SchedConfig {
            release_master,
            trace_all_events: false,
            record_events: false,
            ..SchedConfig::with_units(units)
        };
        let clock = ManualClock::new(0);
        let plugin = GsnEdfM::builder(config)
            .clock(clock.clone())
            .build()
            .unwrap();
        let all: Vec<_> = (0..units).collect();
        plugin.activate(&all).unwrap();
        Self {
            plugin,
            clock,
            running: vec![None; units],
            jobs: Vec::new(),
            observer: Observer::new(),
            rng,
        }
    }

    fn query<T>(&self, f: impl FnOnce(&SchedCtx) -> T) -> T {
        self.plugin.inspect(f)
    }

    fn pick(&mut self, candidates: Vec<JobId>) -> Option<JobId> {
        candidates.choose(&mut self.rng).copied()
    }

    fn local(&mut self) -> Option<UnitId> {
        let units = self.running.len();
        self.rng.random_bool(0.5).then(|| self.rng.random_range(0..units))
    }

    fn donors(&self) -> FxHashSet<JobId> {
        self.query(|ctx| ctx.jobs().filter_map(|job| job.inherited_from()).collect())
    }

    fn op(&mut self) {
        match self.rng.random_range(0..9) {
            0 if self.jobs.len() < 12 => self.add_job(),
            1 => self.complete(),
            2 => self.block(),
            3 => self.wake(),
            4 => self.inherit(),
            5 => self.restore(),
            6 => {
                let delta = self.rng.random_range(1..=5);
                self.clock.advance(delta);
                let local = self.local();
                self.plugin.release_jobs(local).unwrap();
            }
            _ => self.settle(),
        }
    }

    fn add_job(&mut self) {
        let period = self.rng.random_range(3..=30);
        let cost = self.rng.random_range(1..=period);
        let mut params = JobParams::periodic(period, cost);
        if self.rng.random_bool(0.3) {
            params = params.sporadic();
        }
        let job = self.plugin.admit(params).unwrap();
        let local = self.local();
        self.plugin.task_new(job, local, true, None).unwrap();
        self.jobs.push(job);
    }

    // Completing a donor moves the deadline its heirs run with.
    fn complete(&mut self) {
        let running = self.query(|ctx| {
            ctx.units()
                .iter()
                .filter_map(|unit| unit.scheduled())
                .filter(|&job| {
                    let runtime = &ctx.job(job).unwrap().runtime;
                    runtime.runnable && !runtime.completed
                })
                .collect()
        });
        if let Some(job) = self.pick(running) {
            self.plugin.complete_job(job).unwrap();
        }
    }

    fn block(&mut self) {
        let runnable = self.query(|ctx| {
            ctx.jobs()
                .filter(|job| job.runtime.runnable)
                .map(|job| job.id())
                .collect()
        });
        if let Some(job) = self.pick(runnable) {
            self.plugin.task_blocked(job).unwrap();
        }
    }

    fn wake(&mut self) {
        let blocked = self.query(|ctx| {
            ctx.jobs()
                .filter(|job| !job.runtime.runnable)
                .map(|job| job.id())
                .collect()
        });
        if let Some(job) = self.pick(blocked) {
            let local = self.local();
            self.plugin.task_wake_up(job, local).unwrap();
        }
    }

    // A runnable job without inheritance picks up the priority of a more
    // urgent blocked job, as a lock holder would.
    fn inherit(&mut self) {
        let donors = self.donors();
        let pairs: Vec<(JobId, JobId)> = self.query(|ctx| {
            let mut pairs = Vec::new();
            for heir in ctx.jobs() {
                if heir.inherited_from().is_some() || donors.contains(&heir.id()) {
                    continue;
                }
                for donor in ctx.jobs() {
                    if donor.id() == heir.id()
                        || donor.runtime.runnable
                        || donor.runtime.completed
                        || donor.inherited_from().is_some()
                    {
                        continue;
                    }
                    if ctx
                        .effective_prio(donor.id())
                        .higher_than(&ctx.effective_prio(heir.id()))
                    {
                        pairs.push((heir.id(), donor.id()));
                    }
                }
            }
            pairs
        });
        if let Some(&(heir, donor)) = pairs.choose(&mut self.rng) {
            let local = self.local();
            let before = self.query(|ctx| ctx.effective_prio(heir));
            self.plugin
                .set_priority_inheritance(heir, donor, local)
                .unwrap();
            let after = self.query(|ctx| ctx.effective_prio(heir));
            assert!(after.higher_than(&before), "inheritance lowered a priority");
        }
    }

    fn restore(&mut self) {
        let heirs = self.query(|ctx| {
            ctx.jobs()
                .filter(|job| {
                    job.inherited_from().is_some()
                        && job.scheduled_on().is_some()
                        && job.runtime.runnable
                })
                .map(|job| job.id())
                .collect()
        });
        if let Some(job) = self.pick(heirs) {
            let local = self.local();
            self.plugin.clear_priority_inheritance(job, local).unwrap();
            self.query(|ctx| {
                let own = ctx.job(job).unwrap();
                let prio = ctx.effective_prio(job);
                assert!(!prio.inherited);
                assert_eq!(prio.deadline, own.deadline());
            });
        }
    }

    fn settle(&mut self) {
        for _ in 0..(4 * self.running.len() + 4) {
            if !self.plugin.any_resched_pending() {
                break;
            }
            for unit in 0..self.running.len() {
                if !self.plugin.resched_pending(unit) {
                    continue;
                }
                let prev = self.running[unit];
                let next = self.plugin.schedule(unit, prev).unwrap();
                if next != prev {
                    self.plugin.finish_switch(unit, next).unwrap();
                    self.running[unit] = next;
                }
            }
        }
        assert!(!self.plugin.any_resched_pending(), "rescheduling did not converge");
        self.plugin.inspect(|ctx| self.observer.check_edf_order(ctx));
    }

    fn check(&mut self) {
        self.plugin.inspect(|ctx| {
            self.observer.observe(ctx);

            let mut linked = FxHashSet::default();
            for unit in ctx.units() {
                if let Some(job) = unit.linked() {
                    assert!(linked.insert(job), "{job:?} linked twice");
                }
            }
            for job in ctx.jobs() {
                assert!(!(job.is_queued() && job.linked_on().is_some()));
            }
            if let Some(lowest) = ctx.lowest_prio_unit() {
                let lowest_prio = ctx.linked_prio(lowest);
                for unit in (0..ctx.units().len()).filter(|&unit| ctx.is_schedulable(unit)) {
                    match (lowest_prio, ctx.linked_prio(unit)) {
                        (None, _) => {}
                        (Some(_), None) => panic!("idle unit {unit} ranked above unit {lowest}"),
                        (Some(low), Some(other)) => assert!(!low.higher_than(&other)),
                    }
                }
            }
        });
    }
}

#[test]
fn random_operation_sequences_keep_invariants() {
    for seed in 0..24 {
        let mut stress = Stress::new(seed);
        for _ in 0..400 {
            stress.op();
            stress.check();
        }
        stress.settle();
        stress.check();
    }
}

#[test]
fn every_admitted_job_is_somewhere_after_settling() {
    for seed in 100..110 {
        let mut stress = Stress::new(seed);
        for _ in 0..200 {
            stress.op();
        }
        stress.settle();
        stress.plugin.inspect(|ctx| {
            for job in ctx.jobs().filter(|job| job.runtime.runnable) {
                assert!(
                    job.linked_on().is_some() || job.is_queued(),
                    "runnable {:?} is neither linked nor queued",
                    job.id()
                );
            }
        });
    }
}
