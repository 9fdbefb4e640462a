use crate::constants::{GRPC_MESSAGE_KEY, GRPC_STATUS_KEY};
use crate::metadata::Metadata;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// gRPC status codes (<https://grpc.github.io/grpc/core/md_doc_statuscodes.html>).
///
/// The numeric values are part of the wire format.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum StatusCode {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl StatusCode {
    /// Maps a raw code to a `StatusCode`. Absent or unrecognized codes become
    /// [`StatusCode::Unknown`].
    pub fn from_code(code: Option<u32>) -> Self {
        code.and_then(|code| StatusCode::try_from(code).ok())
            .unwrap_or(StatusCode::Unknown)
    }

    /// Parses the decimal text carried by a `grpc-status` entry.
    pub fn from_header_value(value: Option<&str>) -> Self {
        Self::from_code(value.and_then(|value| value.trim().parse::<u32>().ok()))
    }

    pub fn as_u32(self) -> u32 {
        self.into()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Aborted => "ABORTED",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
            Self::DataLoss => "DATA_LOSS",
            Self::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status of a call, as carried by a trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: StatusCode,
    pub detail: Option<String>,
}

impl Status {
    pub fn new(code: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: Some(detail.into()),
        }
    }

    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            detail: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }

    /// Removes `grpc-status` / `grpc-message` from `metadata` and builds the
    /// status they describe. A missing `grpc-status` yields `UNKNOWN`.
    pub fn take_from_metadata(metadata: &mut Metadata) -> Self {
        let code = metadata
            .remove(GRPC_STATUS_KEY)
            .and_then(|values| values.into_iter().next());
        let detail = metadata
            .remove(GRPC_MESSAGE_KEY)
            .and_then(|values| values.into_iter().next())
            .map(|value| percent_decode(&value))
            .filter(|detail| !detail.is_empty());

        Self {
            code: StatusCode::from_header_value(code.as_deref()),
            detail,
        }
    }

    /// Writes `grpc-status` / `grpc-message` into `metadata`.
    pub fn write_to_metadata(&self, metadata: &mut Metadata) {
        metadata.set(GRPC_STATUS_KEY, self.code.as_u32().to_string());
        if let Some(detail) = self.detail.as_deref().filter(|detail| !detail.is_empty()) {
            metadata.set(GRPC_MESSAGE_KEY, percent_encode(detail));
        }
    }
}

// `grpc-message` is percent-encoded: printable ASCII other than '%' passes
// through, everything else is escaped byte-wise.
fn percent_encode(value: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut encoded = String::with_capacity(value.len());
    for byte in value.as_bytes() {
        if (0x20..=0x7E).contains(byte) && *byte != b'%' {
            encoded.push(*byte as char);
        } else {
            encoded.push('%');
            encoded.push(HEX[(byte >> 4) as usize] as char);
            encoded.push(HEX[(byte & 0x0F) as usize] as char);
        }
    }
    encoded
}

fn percent_decode(value: &str) -> String {
    fn hex_value(byte: u8) -> Option<u8> {
        match byte {
            b'0'..=b'9' => Some(byte - b'0'),
            b'a'..=b'f' => Some(byte - b'a' + 10),
            b'A'..=b'F' => Some(byte - b'A' + 10),
            _ => None,
        }
    }

    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        let escaped = match bytes.get(index..index + 3) {
            Some([b'%', high, low]) => hex_value(*high).zip(hex_value(*low)),
            _ => None,
        };
        match escaped {
            Some((high, low)) => {
                decoded.push(high << 4 | low);
                index += 3;
            }
            None => {
                decoded.push(bytes[index]);
                index += 1;
            }
        }
    }

    String::from_utf8_lossy(&decoded).into_owned()
}
