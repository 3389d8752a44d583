use std::fmt;
use std::sync::{Arc, OnceLock};

use http::{header, HeaderMap, Method, Uri};

use crate::content::ContentProvider;
use crate::error::Cause;

/// A request to be sent.
///
/// Built from an [`http::Request`] head plus an optional content provider.
/// The request also records the abort cause, if the application gave up on
/// it; the sender consults that record both on entry and when deciding
/// whether a failure needs a synthesized response.
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    content: Option<Arc<dyn ContentProvider>>,
    aborted: OnceLock<Cause>,
}

impl Request {
    /// A request without content.
    pub fn new(request: http::Request<()>) -> Request {
        Self::build(request, None)
    }

    /// A request whose content comes from `content`.
    pub fn with_content(request: http::Request<()>, content: Arc<dyn ContentProvider>) -> Request {
        Self::build(request, Some(content))
    }

    fn build(request: http::Request<()>, content: Option<Arc<dyn ContentProvider>>) -> Request {
        let (parts, ()) = request.into_parts();
        Request {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            content,
            aborted: OnceLock::new(),
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The content provider, if the request has one.
    pub fn content(&self) -> Option<&Arc<dyn ContentProvider>> {
        self.content.as_ref()
    }

    /// The cause the application aborted this request with, if any.
    pub fn abort_cause(&self) -> Option<Cause> {
        self.aborted.get().cloned()
    }

    /// Record the abort cause. The first cause wins.
    ///
    /// Recording does not drive a sender by itself: a sender observes the
    /// cause on entry (for requests aborted while still queued) or through
    /// its own abort operation, which records here first.
    pub fn mark_aborted(&self, cause: Cause) -> bool {
        self.aborted.set(cause).is_ok()
    }

    /// Whether the request asks for the 100-continue handshake.
    pub fn expects_continue(&self) -> bool {
        self.headers
            .get_all(header::EXPECT)
            .iter()
            .any(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"))
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn expects_continue_is_case_insensitive() {
        let request = Request::new(
            http::Request::post("http://x.test/upload")
                .header("expect", "100-Continue")
                .body(())
                .unwrap(),
        );
        assert!(request.expects_continue());
    }

    #[test]
    fn no_expect_header() {
        let request = Request::new(http::Request::get("http://x.test/").body(()).unwrap());
        assert!(!request.expects_continue());
    }

    #[test]
    fn other_expectations_do_not_count() {
        let request = Request::new(
            http::Request::post("http://x.test/upload")
                .header("expect", "celebration")
                .body(())
                .unwrap(),
        );
        assert!(!request.expects_continue());
    }

    #[test]
    fn first_abort_cause_wins() {
        let request = Request::new(http::Request::get("http://x.test/").body(()).unwrap());
        assert!(request.abort_cause().is_none());
        assert!(request.mark_aborted(Error::aborted("first")));
        assert!(!request.mark_aborted(Error::aborted("second")));
        assert_eq!(
            request.abort_cause().unwrap().to_string(),
            "request aborted: first"
        );
    }
}
