use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use crate::content::{BufferContent, DeferredContent};
use crate::error::Error;
use crate::notify::RequestListener;
use crate::request::Request;
use crate::sender::Sender;

use super::scenario::{Op, Scenario};

#[test]
fn abort_after_commit_before_body() {
    let content = Arc::new(DeferredContent::new());
    content.offer(vec![0u8; 1024]);

    let scenario = Scenario::builder()
        .post("http://q.test/upload")
        .content(content)
        .manual()
        .build();

    scenario.send();
    scenario.complete_next(); // headers; the first chunk write goes out

    assert_eq!(scenario.events(), ["begin", "headers", "commit"]);

    let cause = Error::aborted("gave up");
    assert!(scenario.sender.abort(cause.clone()));

    assert_eq!(
        scenario.events(),
        ["begin", "headers", "commit", "failure", "released", "complete"]
    );
    let completions = scenario.log.completions();
    assert_eq!(completions.len(), 1);
    assert!(Arc::ptr_eq(completions[0].failure().unwrap(), &cause));

    let failures = scenario.log.failures();
    assert_eq!(failures.len(), 1);
    assert!(Arc::ptr_eq(&failures[0], &cause));

    // the in-flight write completes late: a no-op
    assert!(scenario.transport.try_complete_next());
    assert_eq!(scenario.events().len(), 6);
    assert_eq!(scenario.writes().len(), 2);

    // terminal states refuse a second abort
    assert!(!scenario.sender.abort(Error::aborted("again")));
}

#[test]
fn abort_before_commit() {
    let scenario = Scenario::builder().get("http://q.test/").manual().build();

    scenario.send();
    assert_eq!(scenario.events(), ["begin", "headers"]);

    let cause = Error::aborted("changed my mind");
    assert!(scenario.sender.abort(cause.clone()));

    assert_eq!(
        scenario.events(),
        ["begin", "headers", "failure", "released", "complete"]
    );

    // the header write completing late does not commit
    scenario.complete_next();
    assert_eq!(scenario.events().len(), 5);
}

#[test]
fn abort_after_success_is_refused() {
    let scenario = Scenario::builder()
        .get("http://q.test/")
        .response_succeeded()
        .build();

    scenario.send();
    let before = scenario.events();

    assert!(!scenario.sender.abort(Error::aborted("too late")));
    assert_eq!(scenario.events(), before);
}

/// A listener that calls back into the sender from `on_commit`.
#[derive(Default)]
struct AbortOnCommit {
    sender: Mutex<Option<Arc<Sender>>>,
    aborted: Mutex<Option<bool>>,
}

impl RequestListener for AbortOnCommit {
    fn on_commit(&self, _request: &Request) {
        let sender = self.sender.lock().unwrap().clone().unwrap();
        let aborted = sender.abort(Error::aborted("from listener"));
        *self.aborted.lock().unwrap() = Some(aborted);
    }
}

#[test]
fn abort_reentrant_from_commit_listener() {
    let hook = Arc::new(AbortOnCommit::default());

    let scenario = Scenario::builder()
        .post("http://q.test/upload")
        .content(Arc::new(BufferContent::single("never sent")))
        .listener(hook.clone())
        .build();
    *hook.sender.lock().unwrap() = Some(scenario.sender.clone());

    scenario.send();

    assert_eq!(hook.aborted.lock().unwrap().clone(), Some(true));
    // the transition completed before the listener ran, so the abort
    // observed a consistent state; no content ever went out
    assert_eq!(
        scenario.events(),
        ["begin", "headers", "commit", "failure", "released", "complete"]
    );
    assert_eq!(scenario.writes(), [Op::Headers]);
}

#[test]
fn concurrent_abort_and_completion_terminate_once() {
    for _ in 0..200 {
        let scenario = Scenario::builder()
            .post("http://q.test/upload")
            .content(Arc::new(BufferContent::single("payload")))
            .manual()
            .response_succeeded()
            .build();

        scenario.send();
        scenario.complete_next(); // headers

        let barrier = Arc::new(Barrier::new(2));

        let driver = {
            let transport = scenario.transport.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..8 {
                    while transport.try_complete_next() {}
                    thread::yield_now();
                }
            })
        };
        let aborter = {
            let sender = scenario.sender.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                sender.abort(Error::aborted("race"));
            })
        };

        driver.join().unwrap();
        aborter.join().unwrap();

        let events = scenario.events();
        let terminal = events
            .iter()
            .filter(|e| *e == "success" || *e == "failure")
            .count();
        assert_eq!(terminal, 1, "events: {:?}", events);
        let complete = events.iter().filter(|e| *e == "complete").count();
        assert_eq!(complete, 1, "events: {:?}", events);
    }
}
