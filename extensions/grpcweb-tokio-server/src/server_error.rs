use grpcweb::StatusCode;
use std::fmt;
use std::io;

/// Error returned by a method handler. Sent to the client as the trailer status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub code: StatusCode,
    pub details: String,
}

impl ServerError {
    pub fn new(code: StatusCode, details: impl Into<String>) -> Self {
        Self {
            code,
            details: details.into(),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.details)
    }
}

impl std::error::Error for ServerError {}

/// Codec failures inside a handler surface as `INTERNAL`.
impl From<io::Error> for ServerError {
    fn from(err: io::Error) -> Self {
        ServerError::new(StatusCode::Internal, err.to_string())
    }
}
