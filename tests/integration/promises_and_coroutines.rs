//! Promises, coroutines and `async_map` settled by timers.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tickio::runtime::clock::ManualClock;
use tickio::runtime::coroutine::{from_fn, Resume, Step};
use tickio::runtime::promise::PromiseState;
use tickio::{Handle, Promise, Runtime, TaskError};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn manual() -> (Runtime, ManualClock) {
    let clock = ManualClock::new();
    let rt = Runtime::builder().clock(clock.clone()).build();
    (rt, clock)
}

/// Fulfills with `value` after `latency`.
fn fetch(
    rt: &Handle,
    value: u32,
    latency: Duration,
) -> Promise<u32> {
    let (promise, resolver) = Promise::pending();
    rt.set_timeout(latency, move || {
        resolver.resolve(value);
    });
    promise
}

/// Rejects with `reason` after `latency`.
fn fail_after(
    rt: &Handle,
    reason: &'static str,
    latency: Duration,
) -> Promise<u32> {
    let (promise, resolver) = Promise::pending();
    rt.set_timeout(latency, move || {
        resolver.reject(TaskError::rejected(reason));
    });
    promise
}

#[test]
fn test_coroutine_awaits_requests_in_sequence() {
    let (rt, clock) = manual();
    let handle = rt.handle();
    let mut sum = 0;
    let mut calls = 0;

    let co = rt.spawn_coroutine(from_fn(
        move |input: Resume<u32>| -> Result<Step<u32, u32>, TaskError> {
            if let Resume::Value(v) = input {
                sum += v;
            }
            calls += 1;
            Ok(match calls {
                1 => Step::Await(fetch(&handle, 2, ms(30))),
                2 => Step::Await(fetch(&handle, 40, ms(10))),
                _ => Step::Done(sum),
            })
        },
    ));
    rt.run();

    assert_eq!(co.completion.value().as_deref(), Some(&42));
    // Requests are started one after the other.
    assert_eq!(clock.elapsed(), ms(40));
}

#[test]
fn test_coroutine_recovers_from_rejection() {
    let (rt, _) = manual();
    let handle = rt.handle();
    let errors = Rc::new(Cell::new(0));

    let e = errors.clone();
    rt.on_error(move |_| e.set(e.get() + 1));
    let co = rt.spawn_coroutine(from_fn(
        move |input: Resume<u32>| -> Result<Step<u32, &'static str>, TaskError> {
            Ok(match input {
                Resume::Start => Step::Await(fail_after(&handle, "offline", ms(5))),
                Resume::Error(err) if err.to_string().contains("offline") => {
                    Step::Done("fallback")
                }
                Resume::Error(err) => return Err(err),
                Resume::Value(_) => Step::Done("online"),
            })
        },
    ));
    rt.run();

    assert_eq!(co.completion.value().as_deref(), Some(&"fallback"));
    assert_eq!(errors.get(), 0);
}

#[test]
fn test_coroutine_resumed_from_timer_callback() {
    let (rt, clock) = manual();
    let handle = rt.handle();
    let mut started = false;

    let co = rt.spawn_coroutine(from_fn(
        move |input: Resume<u32>| -> Result<Step<u32, u32>, TaskError> {
            if !started {
                started = true;
                let handle = handle.clone();
                return Ok(Step::callback(move |resumer| {
                    handle.set_timeout(ms(25), move || resumer.resume(7));
                }));
            }
            match input {
                Resume::Value(v) => Ok(Step::Done(v * 6)),
                _ => Err(TaskError::msg("unexpected resumption")),
            }
        },
    ));
    rt.run();

    assert_eq!(co.completion.value().as_deref(), Some(&42));
    assert_eq!(clock.elapsed(), ms(25));
}

#[test]
fn test_async_map_keeps_input_order() {
    let (rt, clock) = manual();
    let handle = rt.handle();
    let results = Rc::new(RefCell::new(None));

    let r = results.clone();
    rt.async_map(
        vec![30u64, 10, 20],
        move |delay, done| {
            handle.set_timeout(ms(delay), move || done.complete(delay * 2));
        },
        move |out| *r.borrow_mut() = Some(out),
    );
    rt.run();

    assert_eq!(*results.borrow(), Some(vec![60, 20, 40]));
    assert_eq!(clock.elapsed(), ms(30));
}

#[test]
fn test_join_all_fails_fast_while_all_stays_silent() {
    let (rt, clock) = manual();
    let handle = rt.handle();
    let promises = vec![
        fetch(&handle, 1, ms(50)),
        fail_after(&handle, "timeout", ms(5)),
        fetch(&handle, 3, ms(20)),
    ];

    let all_fired = Rc::new(Cell::new(false));
    let a = all_fired.clone();
    Promise::<u32>::all(&promises, move |_| a.set(true));

    let failed_at = Rc::new(Cell::new(None));
    let f = failed_at.clone();
    let c = clock.clone();
    let joined = Promise::<u32>::join_all(&promises);
    joined.catch_err(move |_| f.set(Some(c.elapsed())));
    rt.run();

    assert!(!all_fired.get());
    assert_eq!(failed_at.get(), Some(ms(5)));
    assert_eq!(joined.state(), PromiseState::Rejected);
    assert_eq!(promises[0].state(), PromiseState::Fulfilled);
}

#[test]
fn test_race_takes_the_fastest_request() {
    let (rt, _) = manual();
    let handle = rt.handle();
    let promises = [
        fetch(&handle, 1, ms(30)),
        fetch(&handle, 2, ms(10)),
        fetch(&handle, 3, ms(20)),
    ];
    let winner = Rc::new(Cell::new(0));
    let seen = Rc::new(RefCell::new(Vec::new()));

    let w = winner.clone();
    Promise::<u32>::race(&promises, move |v| w.set(*v));
    let s = seen.clone();
    Promise::<u32>::any(&promises, move |v| s.borrow_mut().push(*v));
    rt.run();

    assert_eq!(winner.get(), 2);
    assert_eq!(*seen.borrow(), vec![2, 3, 1]);
}
