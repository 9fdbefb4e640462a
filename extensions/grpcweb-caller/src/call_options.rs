use grpcweb::{AbortSignal, Metadata};
use std::fmt;

/// Receives header or trailer metadata. Called at most once per call.
pub type MetadataCallback = Box<dyn FnOnce(Metadata) + Send + 'static>;

/// Per-call options.
#[derive(Default)]
pub struct CallOptions {
    /// Cancels the call when fired.
    pub signal: Option<AbortSignal>,
    /// Request metadata sent with the call.
    pub metadata: Metadata,
    /// Receives the response header, before any response message.
    pub on_header: Option<MetadataCallback>,
    /// Receives the trailer metadata. Called exactly once unless the call is
    /// cancelled; a call that fails before reading a trailer gets an empty one.
    pub on_trailer: Option<MetadataCallback>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn on_header(mut self, callback: impl FnOnce(Metadata) + Send + 'static) -> Self {
        self.on_header = Some(Box::new(callback));
        self
    }

    pub fn on_trailer(mut self, callback: impl FnOnce(Metadata) + Send + 'static) -> Self {
        self.on_trailer = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOptions")
            .field("signal", &self.signal)
            .field("metadata", &self.metadata)
            .field("on_header", &self.on_header.is_some())
            .field("on_trailer", &self.on_trailer.is_some())
            .finish()
    }
}
