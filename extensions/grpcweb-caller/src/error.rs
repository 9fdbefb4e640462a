use grpcweb::StatusCode;
use grpcweb::frame::FrameDecodeError;
use std::fmt;

/// Terminal error of a call whose server or transport signalled a non-OK status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    /// Method path of the failed call.
    pub path: String,
    pub code: StatusCode,
    pub details: String,
}

impl ClientError {
    pub fn new(path: impl Into<String>, code: StatusCode, details: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code,
            details: details.into(),
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.path, self.code, self.details)
    }
}

impl std::error::Error for ClientError {}

/// The call was cancelled through its abort signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortError;

impl fmt::Display for AbortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "The operation has been aborted")
    }
}

impl std::error::Error for AbortError {}

/// Outcome of a failed call.
///
/// `E` is the error type of the caller's request stream. An error pulled from
/// that stream is returned as `Request(e)` holding the very same value.
#[derive(Debug)]
pub enum CallError<E> {
    /// The server or transport ended the call with a non-OK status.
    Client(ClientError),
    /// The call was cancelled by its abort signal.
    Aborted(AbortError),
    /// The request stream itself failed.
    Request(E),
}

impl<E> CallError<E> {
    /// True when the call ended because its abort signal fired.
    pub fn is_abort(&self) -> bool {
        matches!(self, CallError::Aborted(_))
    }

    pub fn as_client_error(&self) -> Option<&ClientError> {
        match self {
            CallError::Client(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the request stream's own error, if that is what ended the call.
    pub fn into_request_error(self) -> Option<E> {
        match self {
            CallError::Request(err) => Some(err),
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Client(err) => write!(f, "{err}"),
            CallError::Aborted(err) => write!(f, "{err}"),
            CallError::Request(err) => write!(f, "{err}"),
        }
    }
}

impl<E> std::error::Error for CallError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CallError::Client(err) => Some(err),
            CallError::Aborted(err) => Some(err),
            CallError::Request(err) => Some(err),
        }
    }
}

impl<E> From<ClientError> for CallError<E> {
    fn from(err: ClientError) -> Self {
        CallError::Client(err)
    }
}

impl<E> From<AbortError> for CallError<E> {
    fn from(err: AbortError) -> Self {
        CallError::Aborted(err)
    }
}

/// Failures reported by a [`crate::Duplex`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The duplex was aborted.
    Aborted,
    /// The endpoint could not be reached or the connection broke.
    Unavailable(String),
    /// The endpoint answered with a non-success HTTP status.
    HttpStatus(u16),
    /// The peer violated the wire protocol.
    Protocol(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Aborted => write!(f, "transport aborted"),
            TransportError::Unavailable(reason) => write!(f, "transport unavailable: {reason}"),
            TransportError::HttpStatus(code) => write!(f, "received HTTP {code} response"),
            TransportError::Protocol(reason) => write!(f, "protocol error: {reason}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<FrameDecodeError> for TransportError {
    fn from(err: FrameDecodeError) -> Self {
        TransportError::Protocol(err.to_string())
    }
}
