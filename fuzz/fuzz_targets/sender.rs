#![no_main]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use libfuzzer_sys::fuzz_target;
use reqsend::content::{Cursor, DeferredContent};
use reqsend::{
    Callback, Cause, Channel, CompleteListener, Conversation, Error, Exchange, ExchangeResult,
    Options, Request, RequestListener, RequestNotifier, Sender, Transport,
};

// A transport that queues every operation for the fuzzer to complete or
// fail in whatever order the input dictates.
struct QueueTransport {
    pending: Mutex<VecDeque<Arc<dyn Callback>>>,
}

impl QueueTransport {
    fn enqueue(&self, callback: Arc<dyn Callback>) {
        let mut pending = self.pending.lock().unwrap();
        // the sender must never have two operations outstanding
        assert!(pending.is_empty());
        pending.push_back(callback);
    }

    fn complete_next(&self) {
        let next = self.pending.lock().unwrap().pop_front();
        if let Some(callback) = next {
            callback.succeeded();
        }
    }

    fn fail_next(&self, cause: Cause) {
        let next = self.pending.lock().unwrap().pop_front();
        if let Some(callback) = next {
            callback.failed(cause);
        }
    }
}

impl Transport for QueueTransport {
    fn send_headers(&self, _: &Arc<Exchange>, _: &Arc<Cursor>, callback: Arc<dyn Callback>) {
        self.enqueue(callback);
    }

    fn send_content(&self, _: &Arc<Exchange>, _: &Arc<Cursor>, callback: Arc<dyn Callback>) {
        self.enqueue(callback);
    }
}

struct Slot(Mutex<Option<Arc<Exchange>>>);

impl Channel for Slot {
    fn exchange(&self) -> Option<Arc<Exchange>> {
        self.0.lock().unwrap().clone()
    }

    fn exchange_terminated(&self, _: &ExchangeResult) {}
}

#[derive(Default)]
struct EventOrder {
    events: Mutex<Vec<&'static str>>,
}

impl EventOrder {
    fn record(&self, event: &'static str) {
        self.events.lock().unwrap().push(event);
    }
}

impl RequestListener for EventOrder {
    fn on_begin(&self, _: &Request) {
        self.record("begin");
    }
    fn on_headers(&self, _: &Request) {
        self.record("headers");
    }
    fn on_commit(&self, _: &Request) {
        self.record("commit");
    }
    fn on_content(&self, _: &Request, _: &reqsend::bytes::Bytes) {
        self.record("content");
    }
    fn on_success(&self, _: &Request) {
        self.record("success");
    }
    fn on_failure(&self, _: &Request, _: &Cause) {
        self.record("failure");
    }
}

impl CompleteListener for EventOrder {
    fn on_complete(&self, _: &ExchangeResult) {
        self.record("complete");
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let expect_100 = data[0] & 1 != 0;
    let with_content = data[0] & 2 != 0;
    let strict = data[0] & 4 != 0;
    let preset_chunks = (data[1] % 4) as usize;

    let content = Arc::new(DeferredContent::new());
    for i in 0..preset_chunks {
        content.offer(vec![b'a' + i as u8; 16]);
    }

    let mut head = reqsend::http::Request::post("http://fuzz.test/upload");
    if expect_100 {
        head = head.header("expect", "100-continue");
    }
    let head = head.body(()).unwrap();

    let request = if with_content {
        Request::with_content(head, content.clone())
    } else {
        Request::new(head)
    };

    let order = Arc::new(EventOrder::default());
    let conversation = Conversation::new();
    conversation.add_listener(order.clone());
    let exchange = Arc::new(Exchange::new(request, conversation));

    let channel = Arc::new(Slot(Mutex::new(Some(exchange.clone()))));
    let transport = Arc::new(QueueTransport {
        pending: Mutex::new(VecDeque::new()),
    });
    let mut notifier = RequestNotifier::new();
    notifier.add(order.clone());

    let sender = Sender::new(
        channel,
        transport.clone(),
        notifier,
        Options {
            strict_event_ordering: strict,
        },
    );

    sender.send(exchange.clone());

    // the response side may terminate at any point in the script; a 0 here
    // means it already succeeded before the request finished
    if data[2] & 1 == 0 {
        exchange.response_complete();
        exchange.terminate_response(None);
    }

    // At most one 100-continue signal, and only for requests whose body is
    // actually gated on it; that is the receiver's contract.
    let mut proceeded = !(expect_100 && with_content);
    let mut closed = false;

    for action in &data[3..] {
        match action % 7 {
            0 => transport.complete_next(),
            1 => transport.fail_next(Arc::new(Error::Content("write failed".into()))),
            2 => {
                sender.abort(Error::aborted("fuzzed abort"));
            }
            3 if !proceeded => {
                proceeded = true;
                sender.proceed(&exchange, None);
            }
            4 if !proceeded => {
                proceeded = true;
                sender.proceed(&exchange, Some(Error::aborted("expectation failed")));
            }
            5 if !closed => content.offer("more"),
            6 if !closed => {
                closed = true;
                content.close();
            }
            _ => {}
        }
    }

    // drain whatever is still queued
    if !closed {
        content.close();
    }
    for _ in 0..8 {
        transport.complete_next();
    }

    // lifecycle invariants, regardless of interleaving
    let events = order.events.lock().unwrap();
    let position = |name: &str| events.iter().position(|e| *e == name);

    let success = events.iter().filter(|e| **e == "success").count();
    let failure = events.iter().filter(|e| **e == "failure").count();
    let complete = events.iter().filter(|e| **e == "complete").count();
    assert!(success + failure <= 1, "events: {:?}", events);
    assert!(complete <= 1, "events: {:?}", events);

    if let Some(headers) = position("headers") {
        assert!(position("begin").unwrap() < headers);
    }
    if let Some(commit) = position("commit") {
        assert!(position("headers").unwrap() < commit);
    }
    if let Some(content_at) = position("content") {
        assert!(position("commit").unwrap() < content_at);
    }
    if let Some(success_at) = position("success") {
        assert!(position("commit").unwrap() < success_at);
        if let Some(complete_at) = position("complete") {
            assert!(success_at < complete_at);
        }
    }
    if let (Some(failure_at), Some(complete_at)) = (position("failure"), position("complete")) {
        assert!(failure_at < complete_at);
    }
});
