use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Cause;
use crate::notify::CompleteListener;
use crate::request::Request;

const REQUEST: u8 = 0b01;
const RESPONSE: u8 = 0b10;

/// One request/response round trip.
///
/// The exchange owns the once-only latches both sides race on. *Completion*
/// decides which caller gets to run a side's terminal notification; the
/// success and failure paths both contend on it, so exactly one terminal
/// event fires per side. *Termination* records each side's outcome and
/// hands the [`ExchangeResult`] to exactly the caller that makes both sides
/// terminal.
pub struct Exchange {
    request: Request,
    conversation: Conversation,
    completions: AtomicU8,
    terminations: AtomicU8,
    request_failure: Mutex<Option<Cause>>,
    response_failure: Mutex<Option<Cause>>,
}

impl Exchange {
    /// A fresh exchange for `request`.
    pub fn new(request: Request, conversation: Conversation) -> Exchange {
        Exchange {
            request,
            conversation,
            completions: AtomicU8::new(0),
            terminations: AtomicU8::new(0),
            request_failure: Mutex::new(None),
            response_failure: Mutex::new(None),
        }
    }

    /// The request in flight.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The conversation this exchange belongs to.
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Mark the request side complete. True exactly once.
    pub fn request_complete(&self) -> bool {
        self.completions.fetch_or(REQUEST, Ordering::AcqRel) & REQUEST == 0
    }

    /// Mark the response side complete. True exactly once.
    pub fn response_complete(&self) -> bool {
        self.completions.fetch_or(RESPONSE, Ordering::AcqRel) & RESPONSE == 0
    }

    /// Record the request side's outcome.
    ///
    /// Returns the result for exactly the caller that makes both sides
    /// terminal; everyone else gets `None`.
    pub fn terminate_request(&self, failure: Option<Cause>) -> Option<ExchangeResult> {
        *self.request_failure.lock().unwrap() = failure;
        self.terminate(REQUEST)
    }

    /// Record the response side's outcome. See [`terminate_request`][Self::terminate_request].
    pub fn terminate_response(&self, failure: Option<Cause>) -> Option<ExchangeResult> {
        *self.response_failure.lock().unwrap() = failure;
        self.terminate(RESPONSE)
    }

    fn terminate(&self, side: u8) -> Option<ExchangeResult> {
        let prior = self.terminations.fetch_or(side, Ordering::AcqRel);
        if prior & side != 0 {
            // this side already terminated
            return None;
        }
        if prior | side != REQUEST | RESPONSE {
            return None;
        }
        Some(ExchangeResult {
            request_failure: self.request_failure.lock().unwrap().clone(),
            response_failure: self.response_failure.lock().unwrap().clone(),
        })
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Exchange[{:?}]", self.request)
    }
}

/// The conversation an exchange belongs to.
///
/// Carries the complete-listeners notified when the exchange terminates.
pub struct Conversation {
    listeners: Mutex<Vec<Arc<dyn CompleteListener>>>,
}

impl Conversation {
    /// A conversation with no listeners.
    pub fn new() -> Conversation {
        Conversation {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener for the terminal `complete` event.
    pub fn add_listener(&self, listener: Arc<dyn CompleteListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    /// Fan the terminal result out to the registered listeners, in
    /// registration order.
    pub fn notify_complete(&self, result: &ExchangeResult) {
        let listeners = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener.on_complete(result);
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal summary of an exchange.
///
/// Produced only when both the request and the response side have
/// terminated.
#[derive(Clone, Debug)]
pub struct ExchangeResult {
    request_failure: Option<Cause>,
    response_failure: Option<Cause>,
}

impl ExchangeResult {
    /// The request side's failure, if it failed.
    pub fn request_failure(&self) -> Option<&Cause> {
        self.request_failure.as_ref()
    }

    /// The response side's failure, if it failed.
    pub fn response_failure(&self) -> Option<&Cause> {
        self.response_failure.as_ref()
    }

    /// The originating failure, request side first.
    pub fn failure(&self) -> Option<&Cause> {
        self.request_failure
            .as_ref()
            .or(self.response_failure.as_ref())
    }

    /// Whether both sides succeeded.
    pub fn is_succeeded(&self) -> bool {
        self.failure().is_none()
    }
}
