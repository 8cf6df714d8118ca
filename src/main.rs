use average::{Estimate, Max, Mean};
use gsnedfm::{SchedConfig, Sim, TaskSpec, core::SchedEvent};
use rand::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();

    let num_units = 4;
    let tasks = random_tasks(10, 3.2, &[10, 20, 25, 40, 50, 100], num_units, 0);
    let total: f64 = tasks.iter().map(TaskSpec::utilization).sum();
    println!(
        "{} tasks on {num_units} units, total utilization {total:.2}",
        tasks.len()
    );

    let config = SchedConfig {
        trace_all_events: false,
        ..SchedConfig::with_units(num_units)
    };
    let mut sim = match Sim::new(config, tasks) {
        Ok(sim) => sim,
        Err(err) => {
            eprintln!("cannot start simulation: {err}");
            std::process::exit(1);
        }
    };

    let horizon = 1000;
    let mut preemptions = 0usize;
    while sim.now() < horizon {
        let now = sim.now();
        let events = match sim.step() {
            Ok(events) => events,
            Err(err) => {
                eprintln!("t={now} scheduler rejected a host call: {err}");
                std::process::exit(1);
            }
        };
        for event in events {
            if let SchedEvent::Preempt { .. } = event {
                preemptions += 1;
            }
            if now < 50 {
                println!("t={now} {event:?}");
            }
        }
    }

    let misses = sim.deadline_misses();
    let completed = sim.records().len();
    let response_times: Vec<f64> = sim.response_times().collect();
    let tardiness = sim
        .records()
        .iter()
        .map(|record| record.tardiness() as f64)
        .collect::<Max>();

    println!("Completed jobs: {completed}");
    println!("Reschedule requests: {preemptions}");
    println!(
        "Average response time: {:.2} ticks",
        avg(response_times.iter().copied())
    );
    println!(
        "Worst response time: {:.0} ticks",
        response_times.iter().copied().collect::<Max>().max()
    );
    println!("Deadline misses: {misses} (max tardiness {:.0} ticks)", tardiness.max());
}

fn init_tracing() {
    let filter = std::env::var("GSNEDFM_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Implicit-deadline periodic tasks whose utilizations roughly add up to
/// `target` (UUniFast split).
fn random_tasks(
    count: usize,
    target: f64,
    periods: &[u64],
    num_units: usize,
    seed: u64,
) -> Vec<TaskSpec> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut remaining = target;
    let mut tasks = Vec::with_capacity(count);

    for i in 1..=count {
        let share = if i == count {
            remaining
        } else {
            let next = remaining * rng.random::<f64>().powf(1.0 / (count - i) as f64);
            let share = remaining - next;
            remaining = next;
            share
        };
        let period = periods[rng.random_range(0..periods.len())];
        let cost = ((share.min(1.0) * period as f64).round() as u64).clamp(1, period);
        let mut spec = TaskSpec::periodic(period, cost);
        spec.home = Some(i % num_units);
        tasks.push(spec);
    }

    tasks
}

fn avg(iter: impl Iterator<Item = f64>) -> f64 {
    iter.collect::<Mean>().estimate()
}
