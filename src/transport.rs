use std::sync::Arc;

use crate::content::Cursor;
use crate::error::Cause;
use crate::exchange::{Exchange, ExchangeResult};

/// Completion of one transport operation.
///
/// Exactly one of the two methods is invoked, once, when the operation
/// finishes. The `Arc<Self>` receivers let an I/O thread complete the
/// operation from wherever the write ends, including synchronously from
/// inside the initiating call.
pub trait Callback: Send + Sync {
    /// The operation succeeded.
    fn succeeded(self: Arc<Self>);

    /// The operation failed.
    fn failed(self: Arc<Self>, cause: Cause);
}

/// The wire side the sender drives.
///
/// The sender guarantees at most one operation is outstanding at any
/// instant: it never initiates a second write before the callback of the
/// first has fired.
pub trait Transport: Send + Sync {
    /// Write the request headers, possibly with some content in the same
    /// write.
    ///
    /// The transport may advance the cursor opportunistically to pack the
    /// first chunk into the header write, but must not when the request
    /// expects `100 Continue`.
    fn send_headers(&self, exchange: &Arc<Exchange>, content: &Arc<Cursor>, callback: Arc<dyn Callback>);

    /// Write the cursor's current chunk.
    ///
    /// Invoked one final time with the cursor consumed and no current
    /// chunk, to let the transport emit protocol terminators (such as the
    /// last chunk of chunked transfer encoding).
    fn send_content(&self, exchange: &Arc<Exchange>, content: &Arc<Cursor>, callback: Arc<dyn Callback>);
}

/// The send slot the sender serves.
pub trait Channel: Send + Sync {
    /// The exchange currently associated with the channel, if any.
    ///
    /// `None` turns every sender entry point into a no-op; this is how a
    /// disassociated channel quiesces late completions.
    fn exchange(&self) -> Option<Arc<Exchange>>;

    /// The exchange terminated; the channel may be recycled.
    ///
    /// Whether this runs before or after the `complete` notification is
    /// governed by [`Options::strict_event_ordering`][crate::Options].
    fn exchange_terminated(&self, result: &ExchangeResult);
}
