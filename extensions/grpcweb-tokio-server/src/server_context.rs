use grpcweb::{AbortController, AbortSignal, Metadata, Status};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// What a call emits toward the client, in wire order.
#[derive(Debug)]
pub(crate) enum ResponseEvent {
    Header(Metadata),
    Message(Vec<u8>),
    Trailer(Metadata),
}

/// Per-call state handed to a method handler.
///
/// Cloning is cheap; all clones refer to the same call.
#[derive(Clone)]
pub struct ServerContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    method_path: String,
    request_metadata: Metadata,
    header: Mutex<Metadata>,
    trailer: Mutex<Metadata>,
    header_sent: AtomicBool,
    completed: AtomicBool,
    events: mpsc::UnboundedSender<ResponseEvent>,
    abort: AbortController,
}

fn lock(metadata: &Mutex<Metadata>) -> MutexGuard<'_, Metadata> {
    metadata.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ServerContext {
    pub(crate) fn new(
        method_path: impl Into<String>,
        request_metadata: Metadata,
    ) -> (Self, mpsc::UnboundedReceiver<ResponseEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();

        let context = Self {
            inner: Arc::new(ContextInner {
                method_path: method_path.into(),
                request_metadata,
                header: Mutex::new(Metadata::new()),
                trailer: Mutex::new(Metadata::new()),
                header_sent: AtomicBool::new(false),
                completed: AtomicBool::new(false),
                events,
                abort: AbortController::new(),
            }),
        };

        (context, events_rx)
    }

    pub fn method_path(&self) -> &str {
        &self.inner.method_path
    }

    /// Metadata the client sent with the request.
    pub fn metadata(&self) -> &Metadata {
        &self.inner.request_metadata
    }

    /// Adds a response header value. Ignored once the header has been sent.
    pub fn set_header(&self, key: impl Into<String>, value: impl Into<String>) {
        if self.inner.header_sent.load(Ordering::SeqCst) {
            tracing::warn!(
                "{}: header already sent, dropping late header value",
                self.inner.method_path
            );
            return;
        }
        lock(&self.inner.header).append(key, value);
    }

    /// Adds a trailer value, sent when the call completes.
    pub fn set_trailer(&self, key: impl Into<String>, value: impl Into<String>) {
        lock(&self.inner.trailer).append(key, value);
    }

    /// Flushes the response header now instead of with the response.
    pub fn send_header(&self) {
        if self.inner.header_sent.swap(true, Ordering::SeqCst) {
            return;
        }

        let header = lock(&self.inner.header).clone();
        tracing::trace!("{}: sending header", self.inner.method_path);
        let _ = self.inner.events.send(ResponseEvent::Header(header));
    }

    /// Fires when the client aborts or disconnects before the call completes.
    pub fn signal(&self) -> AbortSignal {
        self.inner.abort.signal()
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::SeqCst)
    }

    pub(crate) fn send_message(&self, payload: Vec<u8>) {
        self.send_header();
        let _ = self.inner.events.send(ResponseEvent::Message(payload));
    }

    /// Sends the trailer carrying `status`, completing the call.
    pub(crate) fn finish(&self, status: Status) {
        if self.inner.completed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.send_header();

        let mut trailer = lock(&self.inner.trailer).clone();
        status.write_to_metadata(&mut trailer);

        tracing::debug!(
            "{}: finished with {}",
            self.inner.method_path,
            status.code
        );
        let _ = self.inner.events.send(ResponseEvent::Trailer(trailer));
    }

    /// The client went away. Fires the signal unless the call already completed.
    pub(crate) fn client_gone(&self) {
        if self.is_completed() {
            return;
        }
        tracing::debug!("{}: client went away", self.inner.method_path);
        self.inner.abort.abort();
    }
}

/// Treats the client as gone when dropped before the call completed.
///
/// Held by whatever is streaming the response, so a connection torn down
/// mid-call reaches the handler through [`ServerContext::signal`].
pub(crate) struct AbortOnDrop(pub(crate) ServerContext);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.client_gone();
    }
}
