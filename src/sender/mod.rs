//! The sender engine: two state machines and the algorithms binding them.
//!
//! The [`Sender`] abstracts the algorithm that sends a request, so that
//! transports only implement the wire-specific writes
//! ([`send_headers`][crate::Transport::send_headers] and
//! [`send_content`][crate::Transport::send_content]).
//!
//! It governs two state machines.
//!
//! The *request* state machine tracks the stage the request as a whole is
//! in, and is the single authority on abortability. At any point a user
//! thread may abort the request, which (if the request has not been fully
//! sent yet) moves it to `Failure`; the machine guarantees that request
//! steps executed by I/O threads only run if the request has not failed
//! already.
//!
//! ```text
//! ┌────────┐   ┌────────┐   ┌─────────┐   ┌────────┐   ┌─────────┐
//! │ Queued │──▶│ Begin  │──▶│ Headers │──▶│ Commit │──▶│ Content │─┐
//! └────────┘   └────────┘   └─────────┘   └────────┘   └─────────┘ │
//!      │            │            │             │            │  ▲───┘
//!      │            ▼            ▼             ▼            ▼
//!      └──────────────────────▶┌─────────────────────────────┐
//!                              │           Failure           │
//!                              └─────────────────────────────┘
//! ```
//!
//! The *sender* state machine tracks what the sender is currently doing
//! with the transport, and is updated from four directions: request send,
//! transport completions, deferred content notifications
//! ([`on_deferred_content`][crate::content::DeferredContentListener::on_deferred_content])
//! and 100-continue notifications ([`proceed`][Sender::proceed]). It
//! guarantees the request is never written concurrently: only one of those
//! sources may own the transport at a time. The `*WithContent` states are a
//! sticky bit recording that deferred content showed up while the sender
//! was busy and must be re-examined on the way back to quiescence.
//!
//! Every transition on either machine is a compare-and-set on an atomic
//! cell. A refused CAS always means another thread changed the state first;
//! the caller reloads and re-decides, or abandons if the new state forbids
//! its transition. There are no locks.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;

use crate::content::{Cursor, DeferredContentListener};
use crate::error::Cause;
use crate::exchange::{Exchange, ExchangeResult};
use crate::notify::RequestNotifier;
use crate::request::Request;
use crate::transport::{Callback, Channel, Transport};

#[cfg(test)]
mod test;

/// Sender configuration.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Deliver the terminal `complete` event before releasing the channel
    /// for reuse.
    ///
    /// Off by default: the channel is released first, maximizing reuse,
    /// and a complete-listener may observe the channel already serving the
    /// next request. Turn on for tests and clients that need the terminal
    /// event to strictly precede recycling.
    pub strict_event_ordering: bool,
}

/// The states a request goes through while being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestState {
    /// Queued, not picked up yet. The initial state.
    Queued,
    /// Dequeued, processing started.
    Begin,
    /// The headers (and possibly some content) are about to be written.
    Headers,
    /// The headers (and possibly some content) have been written.
    Commit,
    /// Content is being written.
    Content,
    /// The request failed. Terminal.
    Failure,
}

impl RequestState {
    fn from_u8(value: u8) -> RequestState {
        match value {
            0 => RequestState::Queued,
            1 => RequestState::Begin,
            2 => RequestState::Headers,
            3 => RequestState::Commit,
            4 => RequestState::Content,
            5 => RequestState::Failure,
            _ => unreachable!("request state {}", value),
        }
    }

    /// The peer cannot have seen any part of the request yet.
    fn is_before_commit(self) -> bool {
        matches!(
            self,
            RequestState::Queued | RequestState::Begin | RequestState::Headers
        )
    }

    /// The peer may have seen the request; content may be in flight.
    fn is_sending(self) -> bool {
        matches!(self, RequestState::Commit | RequestState::Content)
    }
}

/// What the sender is currently doing with the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum SenderState {
    /// Not writing anything.
    Idle,
    /// Writing headers or content.
    Sending,
    /// Writing, and deferred content arrived meanwhile.
    SendingWithContent,
    /// Writing headers; the body is gated on 100 Continue.
    Expecting,
    /// Writing headers, body gated on 100 Continue, content present.
    ExpectingWithContent,
    /// Headers written, waiting for 100 Continue.
    Waiting,
    /// Writing headers while 100 Continue already arrived.
    Proceeding,
    /// Writing headers, 100 Continue arrived, deferred content arrived.
    ProceedingWithContent,
}

impl SenderState {
    fn from_u8(value: u8) -> SenderState {
        match value {
            0 => SenderState::Idle,
            1 => SenderState::Sending,
            2 => SenderState::SendingWithContent,
            3 => SenderState::Expecting,
            4 => SenderState::ExpectingWithContent,
            5 => SenderState::Waiting,
            6 => SenderState::Proceeding,
            7 => SenderState::ProceedingWithContent,
            _ => unreachable!("sender state {}", value),
        }
    }
}

/// Drives one request at a time over a [`Transport`].
///
/// Instantiated per channel (a connection-bound send slot) and reused
/// across successive requests on that channel. All entry points return
/// promptly; progress is driven by transport completions, deferred content
/// notifications and the 100-continue signal, each of which may arrive on
/// any thread.
pub struct Sender {
    weak: Weak<Sender>,
    channel: Arc<dyn Channel>,
    transport: Arc<dyn Transport>,
    notifier: RequestNotifier,
    strict_ordering: bool,
    request_state: AtomicU8,
    sender_state: AtomicU8,
    content: Mutex<Option<Arc<Cursor>>>,
    commit_callback: Arc<CommitCallback>,
    content_callback: Arc<ContentCallback>,
    last_callback: Arc<LastCallback>,
}

impl Sender {
    /// A sender serving `channel`, writing through `transport`, reporting
    /// lifecycle events to `notifier`.
    pub fn new(
        channel: Arc<dyn Channel>,
        transport: Arc<dyn Transport>,
        notifier: RequestNotifier,
        options: Options,
    ) -> Arc<Sender> {
        Arc::new_cyclic(|weak: &Weak<Sender>| Sender {
            weak: weak.clone(),
            channel,
            transport,
            notifier,
            strict_ordering: options.strict_event_ordering,
            request_state: AtomicU8::new(RequestState::Queued as u8),
            sender_state: AtomicU8::new(SenderState::Idle as u8),
            content: Mutex::new(None),
            commit_callback: Arc::new(CommitCallback {
                sender: weak.clone(),
            }),
            content_callback: Arc::new(ContentCallback {
                sender: weak.clone(),
                state: AtomicU8::new(ITERATION_IDLE),
            }),
            last_callback: Arc::new(LastCallback {
                sender: weak.clone(),
            }),
        })
    }

    /// The request state, as last observed.
    pub fn request_state(&self) -> RequestState {
        RequestState::from_u8(self.request_state.load(Ordering::Acquire))
    }

    fn sender_state(&self) -> SenderState {
        SenderState::from_u8(self.sender_state.load(Ordering::Acquire))
    }

    /// Begin processing `exchange`.
    ///
    /// Returns promptly; the headers (and whatever content follows) are
    /// written as the transport completes each operation. A request whose
    /// abort cause is already set fails immediately without touching the
    /// transport.
    ///
    /// # Panics
    ///
    /// Panics if the sender is already processing a request: a fresh or
    /// freshly reset sender must be handed to a single caller at a time.
    pub fn send(&self, exchange: Arc<Exchange>) {
        let request = exchange.request();
        if let Some(cause) = request.abort_cause() {
            self.abort_exchange(&exchange, cause);
            return;
        }

        if !self.queued_to_begin(request) {
            panic!("send on a sender that is not queued");
        }

        let provider = request.content().cloned();
        let content = Arc::new(Cursor::new(provider.as_deref()));
        *self.content.lock().unwrap() = Some(content.clone());

        let mut next = SenderState::Sending;
        if request.expects_continue() {
            next = if content.has_content() {
                SenderState::ExpectingWithContent
            } else {
                SenderState::Expecting
            };
        }
        if !self.update_sender_state(SenderState::Idle, next) {
            panic!("sender busy: {:?}", self.sender_state());
        }

        // Registering the listener may trigger on_deferred_content() from
        // other threads; the sender state must be in place first.
        if let Some(async_provider) = provider.as_deref().and_then(|p| p.as_async()) {
            async_provider.set_listener(self.weak.clone());
        }

        if !self.begin_to_headers(request) {
            // aborted between begin and here
            return;
        }

        self.transport
            .send_headers(&exchange, &content, self.commit_callback.clone());
    }

    /// Signal the arrival of `100 Continue`, or its failure, from the
    /// response side.
    ///
    /// A no-op unless the request expects the handshake. With a failure
    /// cause the request fails; otherwise the body (if any is available)
    /// starts flowing.
    pub fn proceed(&self, exchange: &Arc<Exchange>, failure: Option<Cause>) {
        if !exchange.request().expects_continue() {
            return;
        }

        if let Some(cause) = failure {
            self.any_to_failure(cause);
            return;
        }

        loop {
            let current = self.sender_state();
            match current {
                SenderState::Expecting => {
                    // still writing the headers, but 100 Continue is already here
                    if self.update_sender_state(current, SenderState::Proceeding) {
                        debug!("proceeding while expecting");
                        return;
                    }
                }
                SenderState::ExpectingWithContent => {
                    if self.update_sender_state(current, SenderState::ProceedingWithContent) {
                        debug!("proceeding while expecting, content queued");
                        return;
                    }
                }
                SenderState::Waiting => {
                    // headers are on the wire; release the body
                    if !self.update_sender_state(current, SenderState::Sending) {
                        panic!("proceed raced out of {:?}", current);
                    }
                    debug!("proceeding while waiting");
                    self.content_callback.iterate();
                    return;
                }
                other => panic!("proceed in sender state {:?}", other),
            }
        }
    }

    /// Attempt to fail the request with `cause`.
    ///
    /// Succeeds only while the request is abortable: not yet committed, or
    /// committed with content still in flight. An abort wins any race
    /// against success because both contend on the exchange's completion
    /// latch. Returns `false` once the request already reached a terminal
    /// state.
    pub fn abort(&self, cause: Cause) -> bool {
        let Some(exchange) = self.channel.exchange() else {
            return false;
        };
        self.abort_exchange(&exchange, cause)
    }

    fn abort_exchange(&self, exchange: &Arc<Exchange>, cause: Cause) -> bool {
        exchange.request().mark_aborted(cause.clone());

        let current = self.request_state();
        if !(current.is_before_commit() || current.is_sending()) {
            debug!("abort refused, request state {:?}", current);
            return false;
        }
        if !self.any_to_failure(cause.clone()) {
            return false;
        }

        // The request side is gone; no response will ever arrive for it.
        if exchange.response_complete() {
            if let Some(result) = exchange.terminate_response(Some(cause)) {
                self.dispatch_complete(exchange, result);
            }
        }
        true
    }

    // //////////////////////////////////////////////////////////////////// REQUEST TRANSITIONS

    fn queued_to_begin(&self, request: &Request) -> bool {
        if !self.update_request_state(RequestState::Queued, RequestState::Begin) {
            return false;
        }
        debug!("request begin {:?}", request);
        self.notifier.notify_begin(request);
        true
    }

    fn begin_to_headers(&self, request: &Request) -> bool {
        if !self.update_request_state(RequestState::Begin, RequestState::Headers) {
            return false;
        }
        debug!("request headers {:?}", request);
        self.notifier.notify_headers(request);
        true
    }

    fn headers_to_commit(&self, request: &Request) -> bool {
        if !self.update_request_state(RequestState::Headers, RequestState::Commit) {
            return false;
        }
        debug!("request committed {:?}", request);
        self.notifier.notify_commit(request);
        true
    }

    fn some_to_content(&self, request: &Request, chunk: &Bytes) -> bool {
        let current = self.request_state();
        match current {
            RequestState::Commit | RequestState::Content => {
                if !self.update_request_state(current, RequestState::Content) {
                    return false;
                }
                debug!("request content {:?}, {} bytes", request, chunk.len());
                self.notifier.notify_content(request, chunk);
                true
            }
            RequestState::Failure => false,
            other => panic!("request content in state {:?}", other),
        }
    }

    fn some_to_success(&self, exchange: &Arc<Exchange>) -> bool {
        match self.request_state() {
            RequestState::Commit | RequestState::Content => {}
            RequestState::Failure => return false,
            other => panic!("request success in state {:?}", other),
        }

        // completion is raced against failure; the latch decides
        if !exchange.request_complete() {
            return false;
        }

        // Reset before notifying: a listener may immediately start the next
        // request on this sender.
        self.reset();

        let result = exchange.terminate_request(None);

        let request = exchange.request();
        debug!("request success {:?}", request);
        self.notifier.notify_success(request);

        if let Some(result) = result {
            self.dispatch_complete(exchange, result);
        }
        true
    }

    fn any_to_failure(&self, cause: Cause) -> bool {
        let Some(exchange) = self.channel.exchange() else {
            return false;
        };
        if !exchange.request_complete() {
            return false;
        }

        // no further request steps may run
        let prior = self.dispose();

        let mut result = exchange.terminate_request(Some(cause.clone()));

        let request = exchange.request();
        debug!("request failure {:?}: {}", request, cause);
        self.notifier.notify_failure(request, &cause);

        // If the peer never saw the request, the response will never arrive
        // naturally; complete it from here. An aborting caller completes
        // the response side itself.
        if result.is_none() && prior.is_before_commit() && request.abort_cause().is_none() {
            if exchange.response_complete() {
                debug!("failing response from request {:?}", request);
                result = exchange.terminate_response(Some(cause));
            }
        }

        if let Some(result) = result {
            self.dispatch_complete(&exchange, result);
        }
        true
    }

    fn dispatch_complete(&self, exchange: &Arc<Exchange>, result: ExchangeResult) {
        let ordered = self.strict_ordering;
        if !ordered {
            self.channel.exchange_terminated(&result);
        }
        debug!("request/response terminated {:?}", exchange.request());
        exchange.conversation().notify_complete(&result);
        if ordered {
            self.channel.exchange_terminated(&result);
        }
    }

    // //////////////////////////////////////////////////////////////////// SENDER PROGRESS

    /// Runs when the header write completes.
    fn commit_succeeded(&self) {
        let Some(exchange) = self.channel.exchange() else {
            return;
        };
        let request = exchange.request();
        if !self.headers_to_commit(request) {
            return;
        }

        // aborted concurrently: the cursor is already gone
        let Some(content) = self.cursor() else {
            return;
        };

        if !content.has_content() {
            // nothing to send, we are done
            self.some_to_success(&exchange);
            return;
        }

        // the transport may have written content along with the headers
        if let Some(chunk) = content.take_pending() {
            if !self.some_to_content(request, &chunk) {
                return;
            }
        }

        loop {
            let current = self.sender_state();
            match current {
                SenderState::Sending => {
                    self.content_callback.iterate();
                    return;
                }
                SenderState::SendingWithContent => {
                    // clear the sticky bit and go around into Sending
                    self.update_sender_state(current, SenderState::Sending);
                }
                SenderState::Expecting | SenderState::ExpectingWithContent => {
                    // the body is gated on 100 Continue
                    if self.update_sender_state(current, SenderState::Waiting) {
                        return;
                    }
                }
                SenderState::Proceeding => {
                    // 100 Continue already arrived, no content available yet
                    if self.update_sender_state(current, SenderState::Idle) {
                        return;
                    }
                }
                SenderState::ProceedingWithContent => {
                    self.update_sender_state(current, SenderState::Sending);
                }
                other => panic!("commit in sender state {:?}", other),
            }
        }
    }

    /// One pass of the content iteration: notify the chunk whose write just
    /// completed, then either initiate the next write or park.
    fn process_content(&self) -> Action {
        let Some(exchange) = self.channel.exchange() else {
            return Action::Idle;
        };
        let Some(content) = self.cursor() else {
            return Action::Idle;
        };
        let request = exchange.request();

        if let Some(chunk) = content.take_pending() {
            if !self.some_to_content(request, &chunk) {
                return Action::Idle;
            }
        }

        loop {
            if content.advance() {
                self.transport
                    .send_content(&exchange, &content, self.content_callback.clone());
                return Action::Scheduled;
            }
            if content.is_consumed() {
                // terminal write, lets the transport emit protocol terminators
                self.transport
                    .send_content(&exchange, &content, self.last_callback.clone());
                return Action::Scheduled;
            }
            let current = self.sender_state();
            match current {
                SenderState::Sending => {
                    if self.update_sender_state(current, SenderState::Idle) {
                        debug!("waiting for deferred content, {:?}", request);
                        return Action::Idle;
                    }
                }
                SenderState::SendingWithContent => {
                    // deferred content arrived while we were deciding
                    if self.update_sender_state(current, SenderState::Sending) {
                        debug!("deferred content available, {:?}", request);
                    }
                }
                other => panic!("content iteration in sender state {:?}", other),
            }
        }
    }

    // //////////////////////////////////////////////////////////////////// RESET / DISPOSE

    /// Make the sender ready for the next request.
    fn reset(&self) {
        if let Some(content) = self.content.lock().unwrap().take() {
            content.close();
        }
        self.content_callback.reset();
        self.request_state
            .store(RequestState::Queued as u8, Ordering::Release);
        self.sender_state
            .store(SenderState::Idle as u8, Ordering::Release);
    }

    /// Move the request to `Failure` from wherever it is, returning the
    /// prior state. The sender is not reusable afterwards.
    fn dispose(&self) -> RequestState {
        loop {
            let current = self.request_state();
            if current == RequestState::Failure {
                return current;
            }
            if self.update_request_state(current, RequestState::Failure) {
                if let Some(content) = self.content.lock().unwrap().take() {
                    content.close();
                }
                self.content_callback.reset();
                return current;
            }
        }
    }

    fn cursor(&self) -> Option<Arc<Cursor>> {
        self.content.lock().unwrap().clone()
    }

    fn update_request_state(&self, from: RequestState, to: RequestState) -> bool {
        let updated = self
            .request_state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !updated {
            debug!(
                "request state update failed: {:?} -> {:?}: {:?}",
                from,
                to,
                self.request_state()
            );
        }
        updated
    }

    fn update_sender_state(&self, from: SenderState, to: SenderState) -> bool {
        let updated = self
            .sender_state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !updated {
            debug!(
                "sender state update failed: {:?} -> {:?}: {:?}",
                from,
                to,
                self.sender_state()
            );
        }
        updated
    }
}

impl DeferredContentListener for Sender {
    fn on_deferred_content(&self) {
        if self.channel.exchange().is_none() {
            return;
        }

        loop {
            let current = self.sender_state();
            match current {
                SenderState::Idle => {
                    if self.update_sender_state(current, SenderState::Sending) {
                        debug!("deferred content available, {:?} -> {:?}", current, SenderState::Sending);
                        self.content_callback.iterate();
                        return;
                    }
                }
                SenderState::Sending => {
                    if self.update_sender_state(current, SenderState::SendingWithContent) {
                        debug!("deferred content available, {:?} -> {:?}", current, SenderState::SendingWithContent);
                        return;
                    }
                }
                SenderState::Expecting => {
                    if self.update_sender_state(current, SenderState::ExpectingWithContent) {
                        debug!("deferred content available, {:?} -> {:?}", current, SenderState::ExpectingWithContent);
                        return;
                    }
                }
                SenderState::Proceeding => {
                    if self.update_sender_state(current, SenderState::ProceedingWithContent) {
                        debug!("deferred content available, {:?} -> {:?}", current, SenderState::ProceedingWithContent);
                        return;
                    }
                }
                SenderState::SendingWithContent
                | SenderState::ExpectingWithContent
                | SenderState::ProceedingWithContent
                | SenderState::Waiting => {
                    // picked up on the way back to quiescence
                    debug!("deferred content available, {:?}", current);
                    return;
                }
            }
        }
    }
}

// //////////////////////////////////////////////////////////////////////// CALLBACKS

/// Completion of the header write.
struct CommitCallback {
    sender: Weak<Sender>,
}

impl Callback for CommitCallback {
    fn succeeded(self: Arc<Self>) {
        if let Some(sender) = self.sender.upgrade() {
            sender.commit_succeeded();
        }
    }

    fn failed(self: Arc<Self>, cause: Cause) {
        if let Some(sender) = self.sender.upgrade() {
            sender.any_to_failure(cause);
        }
    }
}

/// Outcome of one content-iteration pass.
enum Action {
    /// A transport operation is outstanding; its completion re-enters.
    Scheduled,
    /// Work is paused; an external event re-enters.
    Idle,
}

// Content iteration states.
const ITERATION_IDLE: u8 = 0;
const ITERATION_PROCESSING: u8 = 1;
const ITERATION_AGAIN: u8 = 2;
const ITERATION_SCHEDULED: u8 = 3;

/// Self-rescheduling completion of content writes.
///
/// Each entry runs [`Sender::process_content`] in a loop. A transport that
/// completes an operation synchronously, from inside the initiating call,
/// does not recurse: the nested completion leaves a marker and the already
/// running loop goes around again.
struct ContentCallback {
    sender: Weak<Sender>,
    state: AtomicU8,
}

impl ContentCallback {
    fn cas(&self, from: u8, to: u8) -> bool {
        self.state
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enter the processing loop, or mark the running one for another pass.
    fn iterate(&self) {
        loop {
            match self.state.load(Ordering::Acquire) {
                ITERATION_IDLE => {
                    if self.cas(ITERATION_IDLE, ITERATION_PROCESSING) {
                        self.processing();
                        return;
                    }
                }
                ITERATION_PROCESSING => {
                    if self.cas(ITERATION_PROCESSING, ITERATION_AGAIN) {
                        return;
                    }
                }
                ITERATION_AGAIN | ITERATION_SCHEDULED => return,
                state => unreachable!("iteration state {}", state),
            }
        }
    }

    fn processing(&self) {
        loop {
            let action = match self.sender.upgrade() {
                Some(sender) => sender.process_content(),
                None => Action::Idle,
            };
            let next = match action {
                Action::Scheduled => ITERATION_SCHEDULED,
                Action::Idle => ITERATION_IDLE,
            };
            if self.cas(ITERATION_PROCESSING, next) {
                return;
            }
            // a synchronous completion marked the loop for another pass
            if self.cas(ITERATION_AGAIN, ITERATION_PROCESSING) {
                continue;
            }
            // reset() raced: the request reached a terminal state meanwhile
            return;
        }
    }

    fn reset(&self) {
        self.state.store(ITERATION_IDLE, Ordering::Release);
    }
}

impl Callback for ContentCallback {
    fn succeeded(self: Arc<Self>) {
        loop {
            match self.state.load(Ordering::Acquire) {
                ITERATION_SCHEDULED => {
                    if self.cas(ITERATION_SCHEDULED, ITERATION_PROCESSING) {
                        self.processing();
                        return;
                    }
                }
                ITERATION_PROCESSING => {
                    // completed before the initiating pass returned
                    if self.cas(ITERATION_PROCESSING, ITERATION_AGAIN) {
                        return;
                    }
                }
                ITERATION_AGAIN | ITERATION_IDLE => return,
                state => unreachable!("iteration state {}", state),
            }
        }
    }

    fn failed(self: Arc<Self>, cause: Cause) {
        self.reset();
        if let Some(sender) = self.sender.upgrade() {
            sender.any_to_failure(cause);
        }
    }
}

/// Completion of the terminal content write.
struct LastCallback {
    sender: Weak<Sender>,
}

impl Callback for LastCallback {
    fn succeeded(self: Arc<Self>) {
        let Some(sender) = self.sender.upgrade() else {
            return;
        };
        let Some(exchange) = sender.channel.exchange() else {
            return;
        };
        sender.some_to_success(&exchange);
    }

    fn failed(self: Arc<Self>, cause: Cause) {
        if let Some(sender) = self.sender.upgrade() {
            sender.any_to_failure(cause);
        }
    }
}
