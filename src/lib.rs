//! Client-side HTTP request sender state machines.
//!
//! This crate drives a single outbound HTTP request through its lifecycle,
//! from queued, through header emission, through (possibly deferred or
//! 100-continue-gated) body transmission, to terminal success or failure,
//! while coordinating the four directions concurrent events arrive from:
//!
//! * the application thread ([`send`][Sender::send], [`abort`][Sender::abort]),
//! * transport I/O completions (the callbacks handed to
//!   [`Transport`] operations),
//! * content producers
//!   ([`on_deferred_content`][content::DeferredContentListener::on_deferred_content]),
//! * the response path ([`proceed`][Sender::proceed], carrying the
//!   `100 Continue` interim signal).
//!
//! Coordination is lock free: two atomic state machines (the request state
//! and the sender state, see the [`sender`] module) are mutated solely by
//! compare-and-set, and every wait is expressed as "park the state machine
//! and return; the corresponding event re-enters".
//!
//! Writing bytes is not this crate's business. A [`Transport`]
//! implementation performs the actual wire writes, one operation at a
//! time; the sender guarantees a second write is never initiated before
//! the first one's callback has fired.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use reqsend::content::{BufferContent, Cursor};
//! use reqsend::{
//!     Callback, Channel, Conversation, Exchange, ExchangeResult, Options, Request,
//!     RequestNotifier, Sender, Transport,
//! };
//!
//! // A transport that "writes" by remembering what it was asked to send,
//! // completing every operation on the spot.
//! #[derive(Default)]
//! struct Wire {
//!     writes: Mutex<Vec<String>>,
//! }
//!
//! impl Transport for Wire {
//!     fn send_headers(&self, exchange: &Arc<Exchange>, _content: &Arc<Cursor>, callback: Arc<dyn Callback>) {
//!         let request = exchange.request();
//!         self.writes
//!             .lock()
//!             .unwrap()
//!             .push(format!("{} {}", request.method(), request.uri().path()));
//!         callback.succeeded();
//!     }
//!
//!     fn send_content(&self, _exchange: &Arc<Exchange>, content: &Arc<Cursor>, callback: Arc<dyn Callback>) {
//!         if let Some(chunk) = content.current() {
//!             self.writes.lock().unwrap().push(format!("{} bytes", chunk.len()));
//!         }
//!         callback.succeeded();
//!     }
//! }
//!
//! // The send slot: holds the exchange the sender is serving.
//! struct Slot(Mutex<Option<Arc<Exchange>>>);
//!
//! impl Channel for Slot {
//!     fn exchange(&self) -> Option<Arc<Exchange>> {
//!         self.0.lock().unwrap().clone()
//!     }
//!     fn exchange_terminated(&self, _result: &ExchangeResult) {
//!         self.0.lock().unwrap().take();
//!     }
//! }
//!
//! let request = Request::with_content(
//!     http::Request::post("http://example.test/upload").body(()).unwrap(),
//!     Arc::new(BufferContent::single("hello,world,bye!!")),
//! );
//! let exchange = Arc::new(Exchange::new(request, Conversation::new()));
//!
//! let channel = Arc::new(Slot(Mutex::new(Some(exchange.clone()))));
//! let wire = Arc::new(Wire::default());
//! let sender = Sender::new(channel, wire.clone(), RequestNotifier::new(), Options::default());
//!
//! sender.send(exchange);
//!
//! // The transport completed synchronously, so the whole request is sent:
//! // one header write, one content write, one terminal write (no chunk).
//! let writes = wire.writes.lock().unwrap();
//! assert_eq!(writes.as_slice(), ["POST /upload", "17 bytes"]);
//! ```
//!
//! # In scope
//!
//! * The request and sender state machines and the algorithms binding them
//! * Deferred (asynchronous) request content
//! * The `Expect: 100-continue` gating of the request body
//! * Abort from any thread, in any abortable state
//! * Lifecycle notifications with strict ordering guarantees
//!
//! # Out of scope
//!
//! * Opening/closing sockets, TLS
//! * Response parsing and reception
//! * Connection pooling, redirects, authentication, retries
//! * Body transformations (compression, chunked framing are the
//!   transport's business)

#![warn(missing_docs)]

#[macro_use]
extern crate log;

pub mod content;
mod error;
mod exchange;
mod notify;
mod request;
pub mod sender;
mod transport;

pub use error::{Cause, Error};
pub use exchange::{Conversation, Exchange, ExchangeResult};
pub use notify::{CompleteListener, RequestListener, RequestNotifier};
pub use request::Request;
pub use sender::{Options, RequestState, Sender};
pub use transport::{Callback, Channel, Transport};

pub use bytes;
pub use http;
