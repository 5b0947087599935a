//! TimerRegistry 单元测试

use crate::runtime::error::TaskResult;
use crate::runtime::scheduler::{boxed_body, TaskOutcome};
use crate::runtime::timer::{RepeatFn, TimerId, TimerKind, TimerRegistry};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn counter_interval(hits: &Rc<Cell<u32>>) -> RepeatFn {
    let hits = hits.clone();
    Rc::new(RefCell::new(move || -> TaskResult {
        hits.set(hits.get() + 1);
        Ok(TaskOutcome::Complete)
    }))
}

fn run(due: Vec<crate::runtime::timer::DueTimer>) -> Vec<TimerId> {
    due.into_iter()
        .map(|d| {
            let id = d.id;
            (d.body)().unwrap();
            id
        })
        .collect()
}

#[test]
fn test_timeout_fires_once_and_is_removed() {
    let mut timers = TimerRegistry::new();
    let t0 = Instant::now();
    let fired = Rc::new(Cell::new(false));

    let f = fired.clone();
    let id = timers.set_timeout(t0, ms(100), boxed_body(move || f.set(true)));

    assert!(timers.tick(t0 + ms(99)).is_empty());
    assert!(timers.contains(id));

    let due = timers.tick(t0 + ms(100));
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].kind, TimerKind::Timeout);
    run(due);
    assert!(fired.get());
    assert!(timers.is_idle());

    assert!(timers.tick(t0 + ms(500)).is_empty());
}

#[test]
fn test_interval_advances_by_period() {
    let mut timers = TimerRegistry::new();
    let t0 = Instant::now();
    let hits = Rc::new(Cell::new(0));

    timers.set_interval(t0, ms(100), counter_interval(&hits));

    // Late tick: the next deadline is still t0 + 200, not now + 100.
    run(timers.tick(t0 + ms(130)));
    assert_eq!(timers.next_due(), Some(t0 + ms(200)));

    run(timers.tick(t0 + ms(200)));
    run(timers.tick(t0 + ms(250)));
    run(timers.tick(t0 + ms(300)));
    assert_eq!(hits.get(), 3);
    assert!(!timers.is_idle());
}

#[test]
fn test_cancel_is_idempotent() {
    let mut timers = TimerRegistry::new();
    let t0 = Instant::now();
    let hits = Rc::new(Cell::new(0));

    let id = timers.set_interval(t0, ms(10), counter_interval(&hits));
    assert!(timers.cancel(id));
    assert!(!timers.cancel(id));
    assert!(!timers.cancel(TimerId(999)));

    assert!(timers.tick(t0 + ms(1000)).is_empty());
    assert_eq!(hits.get(), 0);
    assert!(timers.is_idle());
}

#[test]
fn test_simultaneous_timers_fire_in_id_order() {
    let mut timers = TimerRegistry::new();
    let t0 = Instant::now();
    let hits = Rc::new(Cell::new(0));

    let late = timers.set_timeout(t0, ms(50), boxed_body(|| ()));
    let every = timers.set_interval(t0, ms(20), counter_interval(&hits));
    let early = timers.set_timeout(t0, ms(10), boxed_body(|| ()));

    let order = run(timers.tick(t0 + ms(60)));
    assert_eq!(order, vec![late, every, early]);
}

#[test]
fn test_ids_monotonic() {
    let mut timers = TimerRegistry::new();
    let t0 = Instant::now();
    let a = timers.set_timeout(t0, ms(1), boxed_body(|| ()));
    let b = timers.set_timeout(t0, ms(1), boxed_body(|| ()));
    timers.cancel(a);
    let c = timers.set_timeout(t0, ms(1), boxed_body(|| ()));
    assert!(a < b && b < c);
    assert_eq!(format!("{}", c), "timer-2");
}

#[test]
fn test_next_due_and_clear() {
    let mut timers = TimerRegistry::new();
    let t0 = Instant::now();
    assert_eq!(timers.next_due(), None);

    timers.set_timeout(t0, ms(300), boxed_body(|| ()));
    timers.set_timeout(t0, ms(100), boxed_body(|| ()));
    assert_eq!(timers.next_due(), Some(t0 + ms(100)));
    assert_eq!(timers.len(), 2);

    assert_eq!(timers.clear(), 2);
    assert!(timers.is_idle());
}

#[test]
fn test_unrepresentable_deadline_never_fires() {
    let mut timers = TimerRegistry::new();
    let t0 = Instant::now();
    let hits = Rc::new(Cell::new(0));

    let never = timers.set_timeout(t0, Duration::MAX, boxed_body(|| ()));
    timers.set_interval(t0, Duration::from_secs(u64::MAX), counter_interval(&hits));
    let soon = timers.set_timeout(t0, ms(10), boxed_body(|| ()));

    assert_eq!(timers.next_due(), Some(t0 + ms(10)));
    assert_eq!(run(timers.tick(t0 + ms(10))), vec![soon]);
    assert_eq!(timers.next_due(), None);
    assert!(run(timers.tick(t0 + Duration::from_secs(3600))).is_empty());
    assert_eq!(hits.get(), 0);

    // Still pending, so it can be cancelled.
    assert_eq!(timers.len(), 2);
    assert!(timers.cancel(never));
}

#[test]
fn test_interval_stops_when_next_deadline_overflows() {
    let mut timers = TimerRegistry::new();
    let t0 = Instant::now();
    let hits = Rc::new(Cell::new(0));
    let period = Duration::from_secs(u64::MAX / 2);

    // The first deadline may already be out of range on some platforms.
    let id = timers.set_interval(t0, period, counter_interval(&hits));
    if let Some(first) = timers.next_due() {
        assert_eq!(run(timers.tick(first)), vec![id]);
        assert_eq!(hits.get(), 1);
    }
    assert_eq!(timers.next_due(), None);
    assert!(timers.contains(id));
}
