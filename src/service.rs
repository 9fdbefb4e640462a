use std::io;

/// Describes one client-streaming RPC: its path and how its messages are
/// (de)serialized.
///
/// Implemented by service definitions and consumed by both the caller and
/// the server endpoint, so the two sides always agree on the codec.
pub trait ClientStreamingMethod {
    /// Fully-qualified method path, e.g. `/package.Service/Method`.
    const METHOD_PATH: &'static str;

    /// A single message of the request stream.
    type Request;

    /// The single response message.
    type Response;

    /// Encodes one request message into bytes.
    fn encode_request(request: Self::Request) -> Result<Vec<u8>, io::Error>;

    /// Decodes raw request bytes into a typed request message.
    ///
    /// # Arguments
    /// * `bytes` - Serialized request payload.
    fn decode_request(bytes: &[u8]) -> Result<Self::Request, io::Error>;

    /// Encodes the response message into bytes.
    fn encode_response(response: Self::Response) -> Result<Vec<u8>, io::Error>;

    /// Decodes raw response bytes into a typed response message.
    ///
    /// # Arguments
    /// * `bytes` - Serialized response payload.
    fn decode_response(bytes: &[u8]) -> Result<Self::Response, io::Error>;
}
