use std::sync::Arc;

use bytes::Bytes;

use crate::content::{BufferContent, DeferredContent};
use crate::error::Error;

use super::scenario::{Op, Scenario};

#[test]
fn body_is_gated_on_100_continue() {
    let scenario = Scenario::builder()
        .post("http://q.test/upload")
        .header("expect", "100-continue")
        .content(Arc::new(BufferContent::single("ABC")))
        .response_succeeded()
        .build();

    scenario.send();

    // headers are on the wire, the body is held back
    assert_eq!(scenario.events(), ["begin", "headers", "commit"]);
    assert_eq!(scenario.writes(), [Op::Headers]);

    scenario.sender.proceed(&scenario.exchange, None);

    assert_eq!(
        scenario.events(),
        [
            "begin",
            "headers",
            "commit",
            "content(ABC)",
            "success",
            "released",
            "complete"
        ]
    );
    assert_eq!(
        scenario.writes(),
        [Op::Headers, Op::Chunk(Bytes::from("ABC")), Op::Terminal]
    );
}

#[test]
fn proceed_without_expectation_is_ignored() {
    let scenario = Scenario::builder()
        .get("http://q.test/")
        .response_succeeded()
        .build();

    scenario.send();
    let before = scenario.events();

    scenario.sender.proceed(&scenario.exchange, None);
    assert_eq!(scenario.events(), before);
}

#[test]
fn proceed_with_failure_fails_the_request() {
    let scenario = Scenario::builder()
        .post("http://q.test/upload")
        .header("expect", "100-continue")
        .content(Arc::new(BufferContent::single("ABC")))
        .response_succeeded()
        .build();

    scenario.send();

    let cause = Error::aborted("expectation failed");
    scenario.sender.proceed(&scenario.exchange, Some(cause.clone()));

    assert_eq!(
        scenario.events(),
        ["begin", "headers", "commit", "failure", "released", "complete"]
    );
    let completions = scenario.log.completions();
    assert!(Arc::ptr_eq(completions[0].failure().unwrap(), &cause));
    // the body never went out
    assert_eq!(scenario.writes(), [Op::Headers]);
}

#[test]
fn proceed_while_headers_still_in_flight() {
    let scenario = Scenario::builder()
        .post("http://q.test/upload")
        .header("expect", "100-continue")
        .content(Arc::new(BufferContent::single("ABC")))
        .manual()
        .response_succeeded()
        .build();

    scenario.send();
    assert_eq!(scenario.events(), ["begin", "headers"]);

    // 100 Continue races ahead of the header write completion
    scenario.sender.proceed(&scenario.exchange, None);
    assert_eq!(scenario.writes(), [Op::Headers]);

    scenario.complete_next(); // headers; the body is released right away
    scenario.complete_next(); // chunk
    scenario.complete_next(); // terminal

    assert_eq!(
        scenario.events(),
        [
            "begin",
            "headers",
            "commit",
            "content(ABC)",
            "success",
            "released",
            "complete"
        ]
    );
    assert_eq!(
        scenario.writes(),
        [Op::Headers, Op::Chunk(Bytes::from("ABC")), Op::Terminal]
    );
}

#[test]
fn proceed_with_nothing_to_send_parks_until_content() {
    let content = Arc::new(DeferredContent::new());
    let scenario = Scenario::builder()
        .post("http://q.test/upload")
        .header("expect", "100-continue")
        .content(content.clone())
        .response_succeeded()
        .build();

    scenario.send();
    assert_eq!(scenario.events(), ["begin", "headers", "commit"]);

    // 100 Continue arrives, but there is no chunk to send yet
    scenario.sender.proceed(&scenario.exchange, None);
    assert_eq!(scenario.writes(), [Op::Headers]);

    content.offer("late");
    content.close();

    assert_eq!(
        scenario.events(),
        [
            "begin",
            "headers",
            "commit",
            "content(late)",
            "success",
            "released",
            "complete"
        ]
    );
    assert_eq!(
        scenario.writes(),
        [Op::Headers, Op::Chunk(Bytes::from("late")), Op::Terminal]
    );
}
