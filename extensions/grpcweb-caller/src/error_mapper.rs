//! Translation of wire-level status into call errors.
//!
//! Every function here is pure and total: unrecognized or absent codes map to
//! `UNKNOWN` rather than failing.

use crate::error::{AbortError, CallError, ClientError, TransportError};
use grpcweb::{Status, StatusCode};

/// Builds the `ClientError` for a raw status code and detail.
pub fn status_to_client_error(
    method_path: &str,
    code: Option<u32>,
    detail: Option<&str>,
) -> ClientError {
    ClientError::new(
        method_path,
        StatusCode::from_code(code),
        detail.unwrap_or_default(),
    )
}

/// Builds the `ClientError` for a decoded trailer status.
pub fn status_to_error(method_path: &str, status: &Status) -> ClientError {
    status_to_client_error(
        method_path,
        Some(status.code.as_u32()),
        status.detail.as_deref(),
    )
}

/// Maps a non-success HTTP status to the gRPC code a gRPC-Web client reports
/// for it.
pub fn http_status_to_code(http_status: u16) -> StatusCode {
    match http_status {
        400 => StatusCode::Internal,
        401 => StatusCode::Unauthenticated,
        403 => StatusCode::PermissionDenied,
        404 => StatusCode::Unimplemented,
        429 | 502 | 503 | 504 => StatusCode::Unavailable,
        _ => StatusCode::Unknown,
    }
}

/// Maps a transport failure to the call outcome it produces.
pub fn transport_error_to_call_error<E>(method_path: &str, err: TransportError) -> CallError<E> {
    match err {
        TransportError::Aborted => CallError::Aborted(AbortError),
        TransportError::Unavailable(reason) => {
            CallError::Client(ClientError::new(method_path, StatusCode::Unavailable, reason))
        }
        TransportError::HttpStatus(http_status) => CallError::Client(ClientError::new(
            method_path,
            http_status_to_code(http_status),
            format!("Received HTTP {http_status} response"),
        )),
        TransportError::Protocol(reason) => {
            CallError::Client(ClientError::new(method_path, StatusCode::Internal, reason))
        }
    }
}
