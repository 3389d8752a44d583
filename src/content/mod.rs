//! Request content sources and the cursor the sender drives over them.
//!
//! A [`ContentProvider`] is a lazy, finite sequence of byte chunks with an
//! optionally known total length. The sender wraps one provider per request
//! in a [`Cursor`], which distinguishes three situations a plain iterator
//! conflates:
//!
//! * a chunk is *current* and can be handed to the transport,
//! * no chunk is available *right now* but more may arrive later,
//! * the provider is *consumed* and will never produce again.
//!
//! Providers that produce chunks after the request has started implement
//! [`AsyncContentProvider`] as well, and notify a registered
//! [`DeferredContentListener`] when new chunks become available.

use std::fmt;
use std::sync::{Mutex, Weak};

use bytes::Bytes;

mod buffer;
mod deferred;

pub use buffer::BufferContent;
pub use deferred::DeferredContent;

/// A source of request content.
pub trait ContentProvider: Send + Sync {
    /// Total content length, `None` when unknown up front.
    fn length(&self) -> Option<u64>;

    /// Open the chunk source for one request.
    fn open(&self) -> Box<dyn ContentSource>;

    /// The asynchronous side of this provider, when it has one.
    ///
    /// Providers that keep producing after the immediately available chunks
    /// are drained return `Some` here, so the sender can register for
    /// deferred content notifications.
    fn as_async(&self) -> Option<&dyn AsyncContentProvider> {
        None
    }
}

/// Chunk iteration that tells "nothing right now" apart from "nothing ever".
pub trait ContentSource: Send {
    /// The next chunk, if one is available right now.
    fn next_chunk(&mut self) -> Option<Bytes>;

    /// True once no further chunk will ever be produced.
    fn is_exhausted(&self) -> bool;
}

/// Content providers that may produce chunks asynchronously.
pub trait AsyncContentProvider {
    /// Register the single listener notified when deferred chunks arrive.
    ///
    /// If chunks are already queued, or the provider is already closed, the
    /// listener must be notified right away: a producer racing ahead of the
    /// registration is never lost.
    fn set_listener(&self, listener: Weak<dyn DeferredContentListener>);
}

/// Receiver of deferred-content notifications.
pub trait DeferredContentListener: Send + Sync {
    /// More content may be available; re-examine the cursor.
    fn on_deferred_content(&self);
}

/// Cursor over one request's content.
///
/// Created by the sender when a request is picked up, closed exactly once
/// when the request terminates. The sender state machine guarantees at most
/// one party drives the cursor at a time; the interior mutex is the
/// soundness fence for handing that role between threads, not a scheduling
/// point.
pub struct Cursor {
    has_content: bool,
    state: Mutex<CursorState>,
}

struct CursorState {
    source: Option<Box<dyn ContentSource>>,
    current: Option<Bytes>,
    pending: Option<Bytes>,
    consumed: bool,
}

impl Cursor {
    /// A cursor over `provider`, or an empty cursor for requests without
    /// content.
    pub fn new(provider: Option<&dyn ContentProvider>) -> Cursor {
        let (has_content, source) = match provider {
            Some(provider) => (provider.length() != Some(0), Some(provider.open())),
            None => (false, None),
        };
        Cursor {
            has_content,
            state: Mutex::new(CursorState {
                source,
                current: None,
                pending: None,
                consumed: false,
            }),
        }
    }

    /// Whether the provider declared any content at all.
    ///
    /// An unknown length counts as content: the provider may yet produce.
    pub fn has_content(&self) -> bool {
        self.has_content
    }

    /// The chunk the cursor is currently positioned on.
    pub fn current(&self) -> Option<Bytes> {
        self.state.lock().unwrap().current.clone()
    }

    /// Move the cursor to the next chunk.
    ///
    /// `false` means no chunk is available right now; an asynchronous
    /// provider may still produce more later. [`is_consumed`][Self::is_consumed]
    /// can only become true after `advance` has returned `false`.
    pub fn advance(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(source) = state.source.as_mut() else {
            return false;
        };
        match source.next_chunk() {
            Some(chunk) => {
                state.current = Some(chunk.clone());
                state.pending = Some(chunk);
                true
            }
            None => {
                if source.is_exhausted() {
                    state.consumed = true;
                }
                state.current = None;
                false
            }
        }
    }

    /// True once the provider signalled exhaustion.
    pub fn is_consumed(&self) -> bool {
        self.state.lock().unwrap().consumed
    }

    /// Release the underlying source.
    ///
    /// Idempotent. All other methods are no-ops afterwards.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.source = None;
        state.current = None;
        state.pending = None;
    }

    /// The last advanced chunk, yielded at most once.
    ///
    /// This is what the sender reports to `content` listeners; yielding each
    /// chunk once keeps re-entries into the content iteration from
    /// notifying the same chunk twice.
    pub(crate) fn take_pending(&self) -> Option<Bytes> {
        self.state.lock().unwrap().pending.take()
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("Cursor")
            .field("has_content", &self.has_content)
            .field("open", &state.source.is_some())
            .field("current", &state.current.as_ref().map(|c| c.len()))
            .field("consumed", &state.consumed)
            .finish()
    }
}
