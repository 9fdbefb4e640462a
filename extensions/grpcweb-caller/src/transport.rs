use crate::error::TransportError;
use grpcweb::Metadata;
use grpcweb::frame::Frame;

/// Everything a transport needs to open one call.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Absolute URL of the method (channel address + method path).
    pub url: String,
    pub method_path: String,
    /// Request metadata, sent as request headers.
    pub metadata: Metadata,
}

/// Opens duplex channels to method endpoints.
///
/// Implementations hold only immutable configuration and may be shared by
/// any number of concurrent calls, each getting its own [`Duplex`].
pub trait Transport: Send + Sync {
    /// Opens a duplex for one call.
    ///
    /// Never fails synchronously: connection failures surface later as a
    /// receive-side [`TransportError`].
    fn open(&self, request: TransportRequest) -> Box<dyn Duplex>;
}

/// One call's bidirectional channel.
///
/// All methods take `&self` so the send side and the receive side can make
/// progress concurrently from the same call.
///
/// Implementations may be half-duplex: a fetch-based transport, for example,
/// may not deliver any response frame until some or all request messages have
/// been flushed.
#[async_trait::async_trait]
pub trait Duplex: Send + Sync {
    /// Enqueues one outbound message, preserving order. May suspend under
    /// backpressure.
    async fn send(&self, message: Vec<u8>) -> Result<(), TransportError>;

    /// Signals that no further messages will be sent. Idempotent.
    async fn close_send(&self) -> Result<(), TransportError>;

    /// Returns the next response frame, or `Ok(None)` once the response
    /// stream has ended. Frames arrive as header, messages, then trailer.
    async fn receive(&self) -> Result<Option<Frame>, TransportError>;

    /// Tears the duplex down in both directions. Pending and later `send` /
    /// `receive` calls fail with [`TransportError::Aborted`]. Idempotent.
    fn abort(&self);
}
