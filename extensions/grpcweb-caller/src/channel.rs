use crate::call_driver;
use crate::call_options::CallOptions;
use crate::error::CallError;
use crate::transport::Transport;
use futures::Stream;
use grpcweb::ClientStreamingMethod;
use std::fmt;
use std::sync::Arc;

/// A server address bound to a transport.
///
/// Channels are immutable and cheap to clone; any number of concurrent calls
/// may share one, each opening its own duplex.
#[derive(Clone)]
pub struct Channel {
    address: Arc<str>,
    transport: Arc<dyn Transport>,
}

impl Channel {
    /// Creates a channel for `address` (e.g. `http://127.0.0.1:8080`).
    pub fn new(address: impl Into<String>, transport: impl Transport + 'static) -> Self {
        Self::with_shared_transport(address, Arc::new(transport))
    }

    pub fn with_shared_transport(address: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let address: String = address.into();
        Self {
            address: address.trim_end_matches('/').into(),
            transport,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Absolute URL of `method_path` on this channel.
    pub fn method_url(&self, method_path: &str) -> String {
        format!("{}{}", self.address, method_path)
    }

    /// Performs a client-streaming call of method `M`.
    ///
    /// Resolves with the server's single response, or fails with
    /// [`CallError`]. An error yielded by `requests` is returned as
    /// [`CallError::Request`] holding that same error.
    pub async fn client_streaming<M, S, E>(
        &self,
        requests: S,
        options: CallOptions,
    ) -> Result<M::Response, CallError<E>>
    where
        M: ClientStreamingMethod,
        S: Stream<Item = Result<M::Request, E>>,
    {
        call_driver::execute(
            self.transport.as_ref(),
            self.method_url(M::METHOD_PATH),
            M::METHOD_PATH,
            requests,
            options,
            M::encode_request,
            M::decode_response,
        )
        .await
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
