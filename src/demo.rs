//! Demo workload
//!
//! Exercises every part of the runtime at once: pool work, a delayed pool
//! job, timeouts and an interval, `async_map`, a promise chain, a coroutine,
//! and a handful of prioritized tasks with randomized delays. External I/O
//! is simulated with timers.

use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tracing::{info, warn};

use crate::runtime::coroutine::{from_fn, Resume, Step};
use crate::runtime::error::TaskError;
use crate::runtime::promise::Promise;
use crate::runtime::scheduler::{StatsSnapshot, TaskBuilder};
use crate::runtime::{Handle, Runtime};
use crate::util::config::RuntimeConfig;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// A fake request that answers after `latency`.
fn fake_request(
    rt: &Handle,
    what: &'static str,
    latency: Duration,
) -> Promise<String> {
    let (promise, resolver) = Promise::pending();
    rt.set_timeout(latency, move || {
        resolver.resolve(format!("{} ok", what));
    });
    promise
}

/// Run the demo for `duration` and return the scheduler counters.
pub fn run_demo(
    config: RuntimeConfig,
    duration: Duration,
) -> Result<StatsSnapshot> {
    config.validate()?;
    let rt = Runtime::with_config(config);
    info!("[demo] starting, running for {:?}", duration);

    rt.on_error(|err| warn!("[demo] task error: {}", err));

    // Worker pool
    let workers = rt.workers();
    workers.set_concurrency(3);
    for idx in 0..3 {
        workers.add(move || {
            std::thread::sleep(ms(20));
            info!("[worker-{}] cpu task completed", idx);
        });
    }

    // Delayed pool work that fans out through async_map
    let handle = rt.handle();
    workers.schedule(
        move || {
            info!("[scheduler] running scheduled tasks");
            handle.async_map(
                vec![1u64, 2, 3, 4, 5],
                |n, done| done.complete(n * n),
                |res| info!("[map] squares: {:?}", res),
            );
        },
        ms(500),
    );

    // Timers
    rt.set_timeout(ms(150), || info!("[timer] 150ms passed"));
    rt.set_interval(ms(500), || info!("[interval] every 500ms"));

    rt.async_map(
        vec![10u64, 20, 30],
        |n, done| done.complete(n * 2),
        |res| info!("[map] doubled: {:?}", res),
    );

    // Promise chain, nested for sequencing
    let handle = rt.handle();
    rt.submit(move || {
        let create = fake_request(&handle, "create", ms(40));
        let chain = handle.clone();
        create
            .then(move |res| {
                info!("[promise] {}", res);
                let read = fake_request(&chain, "read", ms(40));
                read.then(|res| info!("[promise] {}", res));
            })
            .catch_err(|e| warn!("[promise] failed: {}", e));
    });

    // Coroutine awaiting two requests
    let handle = rt.handle();
    let mut pending = vec![
        fake_request(&handle, "first", ms(60)),
        fake_request(&handle, "second", ms(30)),
    ];
    let co = rt.spawn_coroutine_with(
        TaskBuilder::new().name("coroutine"),
        from_fn(move |input: Resume<String>| -> Result<Step<String, usize>, TaskError> {
            if let Resume::Value(v) = &input {
                info!("[coroutine] got {}", v);
            }
            if let Resume::Error(err) = input {
                return Err(err);
            }
            match pending.pop() {
                Some(next) => Ok(Step::Await(next)),
                None => Ok(Step::Done(2)),
            }
        }),
    );
    co.completion
        .then(|n| info!("[coroutine] done after {} awaits", n));

    // Single task plus prioritized multi tasks with random delays
    let handle = rt.handle();
    rt.submit_with(TaskBuilder::new().name("single").priority(1), move || {
        info!("[task] start single task");
        handle.set_timeout(ms(1000), || info!("[task] finish single task after 1000ms"));
    });

    let mut rng = rand::rng();
    for i in 1..=3 {
        let delay = rng.random_range(200..=500);
        let handle = rt.handle();
        rt.submit_with(
            TaskBuilder::new().name(format!("task-{}", i)).priority(i),
            move || {
                info!("[task-{}] start multi task", i);
                handle.set_timeout(ms(delay), move || {
                    info!("[task-{}] finish multi task after {}ms", i, delay)
                });
            },
        );
    }

    rt.run_for(duration);
    let stats = rt.stats();
    info!(
        "[demo] finished: {} tasks executed, {} timers fired",
        stats.tasks_executed, stats.timers_fired
    );
    Ok(stats)
}
