//! Ready-queue ordering, hooks, failures and cancellation through the public API.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tickio::runtime::clock::ManualClock;
use tickio::runtime::scheduler::{
    boxed_body, HookFilter, HookPhase, TaskBuilder, TaskOutcome, TaskState,
};
use tickio::{Runtime, TaskError};

fn runtime() -> Runtime {
    Runtime::builder().clock(ManualClock::new()).build()
}

fn log() -> Rc<RefCell<Vec<String>>> {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn test_work_submitted_while_running_competes_by_priority() {
    let rt = runtime();
    let seen = log();
    let handle = rt.handle();

    let s = seen.clone();
    rt.submit_with(TaskBuilder::new().name("parent").priority(2), move || {
        s.borrow_mut().push("parent".into());
        for (name, priority) in [("low", 0), ("urgent", 9)] {
            let s = s.clone();
            handle.submit_with(TaskBuilder::new().name(name).priority(priority), move || {
                s.borrow_mut().push(name.into())
            });
        }
    });
    let s = seen.clone();
    rt.submit_with(TaskBuilder::new().name("sibling").priority(1), move || {
        s.borrow_mut().push("sibling".into())
    });
    rt.run();

    assert_eq!(*seen.borrow(), vec!["parent", "urgent", "sibling", "low"]);
}

#[test]
fn test_failures_reach_handler_and_loop_keeps_going() {
    let rt = runtime();
    let errors = log();
    let after = Rc::new(Cell::new(0));

    let e = errors.clone();
    rt.on_error(move |err| e.borrow_mut().push(err.to_string()));
    let a = after.clone();
    rt.add_hook(HookPhase::After, move |_| a.set(a.get() + 1));

    let failing = rt.submit_with(TaskBuilder::new().name("fails"), || {
        Err::<(), _>(TaskError::msg("disk full"))
    });
    let panicking = rt.submit_with(TaskBuilder::new().name("boom"), || -> () {
        panic!("kaboom");
    });
    let fine = rt.submit(|| ());
    rt.run();

    assert_eq!(failing.state(), TaskState::Failed);
    assert_eq!(panicking.state(), TaskState::Failed);
    assert_eq!(fine.state(), TaskState::Completed);
    assert_eq!(after.get(), 3);

    let errors = errors.borrow();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].contains("disk full"));
    assert!(errors[1].contains("boom"));
    assert!(errors[1].contains("kaboom"));

    let stats = rt.stats();
    assert_eq!(stats.tasks_failed, 2);
    assert_eq!(stats.tasks_executed, 3);
}

#[test]
fn test_cancelled_task_skips_hooks_and_body() {
    let rt = runtime();
    let ran = Rc::new(Cell::new(false));
    let hooked = Rc::new(Cell::new(0));

    let h = hooked.clone();
    rt.add_hook(HookPhase::Before, move |_| h.set(h.get() + 1));
    let r = ran.clone();
    let task = rt.submit(move || r.set(true));
    assert!(task.cancel());
    rt.run();

    assert!(!ran.get());
    assert_eq!(hooked.get(), 0);
    assert_eq!(task.state(), TaskState::Cancelled);
    assert_eq!(rt.stats().tasks_skipped, 1);
}

#[test]
fn test_suspended_task_continues_under_same_name() {
    let rt = runtime();
    let seen = log();

    let s = seen.clone();
    rt.add_hook_with(HookPhase::Before, "stepper", move |task| {
        s.borrow_mut()
            .push(format!("{}@{}", task.name(), task.priority().value()))
    });
    let s = seen.clone();
    rt.add_hook_with(
        HookPhase::After,
        HookFilter::predicate(|task| task.priority().value() == 0),
        move |task| s.borrow_mut().push(format!("after {}", task.name())),
    );

    rt.submit_with(TaskBuilder::new().name("stepper").priority(4), || {
        TaskOutcome::Suspended(boxed_body(|| {
            TaskOutcome::Suspended(boxed_body(|| ()))
        }))
    });
    rt.submit_with(TaskBuilder::new().name("plain"), || ());
    rt.run();

    assert_eq!(
        *seen.borrow(),
        vec!["stepper@4", "stepper@4", "stepper@4", "after plain"]
    );
    assert_eq!(rt.stats().continuations, 2);
}
