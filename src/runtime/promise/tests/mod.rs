//! Promise 单元测试

use crate::runtime::error::TaskError;
use crate::runtime::promise::{Promise, PromiseState};
use std::cell::RefCell;
use std::rc::Rc;

fn log() -> Rc<RefCell<Vec<String>>> {
    Rc::new(RefCell::new(Vec::new()))
}

#[cfg(test)]
mod settlement_tests {
    use super::*;

    #[test]
    fn test_executor_resolves_synchronously() {
        let promise: Promise<i32> = Promise::new(|r| {
            r.resolve(7);
            Ok(())
        });
        assert_eq!(promise.state(), PromiseState::Fulfilled);
        assert_eq!(*promise.value().unwrap(), 7);
        assert!(promise.error().is_none());
    }

    #[test]
    fn test_executor_error_rejects() {
        let promise: Promise<i32> = Promise::new(|_| Err(TaskError::rejected("no")));
        assert_eq!(promise.state(), PromiseState::Rejected);
        assert_eq!(promise.error().unwrap().to_string(), "rejected: no");
    }

    #[test]
    fn test_executor_panic_rejects() {
        let promise: Promise<u32> = Promise::new(|_| -> Result<(), TaskError> {
            panic!("executor blew up");
        });
        assert_eq!(promise.state(), PromiseState::Rejected);
        let err = promise.error().unwrap();
        assert!(err.is_panic());
        assert!(err.to_string().contains("executor blew up"));
    }

    #[test]
    fn test_debug_shows_state() {
        let (promise, resolver) = Promise::<i32>::pending();
        assert_eq!(format!("{:?}", promise), "Promise { state: Pending }");
        resolver.resolve(1);
        assert_eq!(format!("{:?}", resolver), "Resolver { state: Fulfilled }");
    }

    #[test]
    fn test_executor_error_after_resolve_is_ignored() {
        let promise: Promise<i32> = Promise::new(|r| {
            r.resolve(1);
            Err(TaskError::rejected("late"))
        });
        assert_eq!(promise.state(), PromiseState::Fulfilled);
    }

    #[test]
    fn test_first_settlement_wins() {
        let (promise, resolver) = Promise::<&str>::pending();
        assert!(resolver.resolve("x"));
        assert!(!resolver.resolve("y"));
        assert!(!resolver.reject(TaskError::rejected("z")));
        assert!(resolver.is_settled());
        assert_eq!(*promise.value().unwrap(), "x");
    }

    #[test]
    fn test_reactions_fire_in_attachment_order() {
        let (promise, resolver) = Promise::<i32>::pending();
        let seen = log();

        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            promise.then(move |v| seen.borrow_mut().push(format!("{}{}", tag, v)));
        }
        assert!(seen.borrow().is_empty());

        resolver.resolve(1);
        assert_eq!(*seen.borrow(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn test_late_reaction_fires_immediately() {
        let promise = Promise::<i32>::resolved(5);
        let seen = log();
        let l = seen.clone();
        promise.then(move |v| l.borrow_mut().push(v.to_string()));
        assert_eq!(*seen.borrow(), vec!["5"]);
    }

    #[test]
    fn test_then_and_catch_chain_on_same_promise() {
        let (promise, resolver) = Promise::<i32>::pending();
        let seen = log();

        let ok = seen.clone();
        let err = seen.clone();
        promise
            .then(move |v| ok.borrow_mut().push(format!("ok {}", v)))
            .catch_err(move |e| err.borrow_mut().push(format!("err {}", e)));

        resolver.reject(TaskError::rejected("x"));
        assert_eq!(*seen.borrow(), vec!["err rejected: x"]);

        // Each clone observes the same settlement.
        let l = seen.clone();
        promise.clone().catch_err(move |_| l.borrow_mut().push("again".into()));
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn test_rejected_promise_skips_then() {
        let promise = Promise::<i32>::rejected(TaskError::msg("bad"));
        let seen = log();
        let l = seen.clone();
        promise.then(move |_| l.borrow_mut().push("then".into()));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_reaction_may_attach_to_same_promise() {
        let (promise, resolver) = Promise::<i32>::pending();
        let seen = log();

        let p = promise.clone();
        let l = seen.clone();
        promise.then(move |_| {
            let l = l.clone();
            p.then(move |v| l.borrow_mut().push(format!("nested {}", v)));
        });
        resolver.resolve(3);
        assert_eq!(*seen.borrow(), vec!["nested 3"]);
    }

    #[test]
    fn test_custom_error_type() {
        let (promise, resolver) = Promise::<u8, String>::pending();
        resolver.reject("plain".to_string());
        assert_eq!(promise.error().unwrap().as_str(), "plain");
    }
}

#[cfg(test)]
mod combinator_tests {
    use super::*;

    #[test]
    fn test_all_preserves_input_order() {
        let (a, ra) = Promise::<i32>::pending();
        let (b, rb) = Promise::<i32>::pending();
        let (c, rc) = Promise::<i32>::pending();
        let out: Rc<RefCell<Option<Vec<i32>>>> = Rc::new(RefCell::new(None));

        let o = out.clone();
        Promise::all(&[a, b, c], move |v| *o.borrow_mut() = Some(v));

        rc.resolve(3);
        ra.resolve(1);
        assert!(out.borrow().is_none());
        rb.resolve(2);
        assert_eq!(*out.borrow(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_all_empty_fires_immediately() {
        let out = Rc::new(RefCell::new(None));
        let o = out.clone();
        Promise::<i32>::all(&[], move |v| *o.borrow_mut() = Some(v.len()));
        assert_eq!(*out.borrow(), Some(0));
    }

    #[test]
    fn test_all_never_fires_on_rejection() {
        let (a, ra) = Promise::<i32>::pending();
        let (b, rb) = Promise::<i32>::pending();
        let fired = Rc::new(RefCell::new(false));

        let f = fired.clone();
        Promise::all(&[a, b], move |_| *f.borrow_mut() = true);
        ra.resolve(1);
        rb.reject(TaskError::rejected("b"));
        assert!(!*fired.borrow());
    }

    #[test]
    fn test_join_all_rejects_with_first_error() {
        let (a, ra) = Promise::<i32>::pending();
        let (b, rb) = Promise::<i32>::pending();
        let joined = Promise::join_all(&[a, b]);

        rb.reject(TaskError::rejected("first"));
        ra.reject(TaskError::rejected("second"));
        assert_eq!(joined.error().unwrap().to_string(), "rejected: first");
    }

    #[test]
    fn test_join_all_fulfills() {
        let joined = Promise::<i32>::join_all(&[Promise::resolved(1), Promise::resolved(2)]);
        assert_eq!(*joined.value().unwrap(), vec![1, 2]);
        assert_eq!(
            *Promise::<i32>::join_all(&[]).value().unwrap(),
            Vec::<i32>::new()
        );
    }

    #[test]
    fn test_race_fires_once_with_first_value() {
        let (a, ra) = Promise::<&str>::pending();
        let (b, rb) = Promise::<&str>::pending();
        let seen = log();

        let l = seen.clone();
        Promise::race(&[a, b], move |v| l.borrow_mut().push(v.to_string()));
        rb.resolve("b");
        ra.resolve("a");
        assert_eq!(*seen.borrow(), vec!["b"]);
    }

    #[test]
    fn test_race_ignores_rejections() {
        let (a, ra) = Promise::<&str>::pending();
        let (b, rb) = Promise::<&str>::pending();
        let seen = log();

        let l = seen.clone();
        Promise::race(&[a, b], move |v| l.borrow_mut().push(v.to_string()));
        ra.reject(TaskError::rejected("a"));
        rb.resolve("b");
        assert_eq!(*seen.borrow(), vec!["b"]);
    }

    #[test]
    fn test_any_fires_per_fulfillment() {
        let (a, ra) = Promise::<i32>::pending();
        let (b, rb) = Promise::<i32>::pending();
        let (c, rc) = Promise::<i32>::pending();
        let seen = log();

        let l = seen.clone();
        Promise::any(&[a, b, c], move |v| l.borrow_mut().push(v.to_string()));
        rc.resolve(3);
        rb.reject(TaskError::rejected("b"));
        ra.resolve(1);
        assert_eq!(*seen.borrow(), vec!["3", "1"]);
    }
}
