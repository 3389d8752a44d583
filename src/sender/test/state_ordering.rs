use crate::error::Error;

use super::scenario::Scenario;

#[test]
fn relaxed_ordering_releases_the_channel_first() {
    let scenario = Scenario::builder()
        .get("http://q.test/")
        .response_succeeded()
        .build();

    scenario.send();

    assert_eq!(
        scenario.events(),
        ["begin", "headers", "commit", "success", "released", "complete"]
    );
}

#[test]
fn strict_ordering_completes_before_release() {
    let scenario = Scenario::builder()
        .get("http://q.test/")
        .response_succeeded()
        .strict_ordering()
        .build();

    scenario.send();

    assert_eq!(
        scenario.events(),
        ["begin", "headers", "commit", "success", "complete", "released"]
    );
}

#[test]
fn strict_ordering_applies_to_failures_too() {
    let scenario = Scenario::builder()
        .get("http://q.test/")
        .preset_abort(Error::aborted("gone"))
        .strict_ordering()
        .build();

    scenario.send();

    assert_eq!(scenario.events(), ["failure", "complete", "released"]);
}
