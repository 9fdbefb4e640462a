// Envelope related constants

/// Byte offset of the 1-byte envelope flags field.
pub const ENVELOPE_FLAGS_OFFSET: usize = 0;

/// Byte offset where the 4-byte big-endian payload length begins.
pub const ENVELOPE_LENGTH_OFFSET: usize = 1;

/// Size in bytes of the payload length field (u32).
pub const ENVELOPE_LENGTH_FIELD_SIZE: usize = 4;

/// Total size of the fixed envelope prefix preceding every payload.
/// Computed as: flags byte + length field.
pub const ENVELOPE_HEADER_SIZE: usize = ENVELOPE_LENGTH_OFFSET + ENVELOPE_LENGTH_FIELD_SIZE; // 1 + 4 = 5

/// Flag bit marking a metadata (header or trailer) envelope.
pub const ENVELOPE_FLAG_METADATA: u8 = 0x80;

/// Flag bit marking a compressed payload.
pub const ENVELOPE_FLAG_COMPRESSED: u8 = 0x01;

/// Largest payload a decoder accepts unless configured otherwise (4 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

// Metadata keys carrying call status

pub const GRPC_STATUS_KEY: &str = "grpc-status";
pub const GRPC_MESSAGE_KEY: &str = "grpc-message";

// HTTP / WebSocket conventions

pub const GRPC_WEB_CONTENT_TYPE: &str = "application/grpc-web+proto";
pub const CONTENT_TYPE_KEY: &str = "content-type";
pub const X_GRPC_WEB_KEY: &str = "x-grpc-web";

/// WebSocket subprotocol negotiated by the WebSocket transport.
pub const GRPC_WEBSOCKET_PROTOCOL: &str = "grpc-websockets";

/// Prefix byte of a client WebSocket message that carries one request envelope.
pub const WEBSOCKET_MESSAGE_PREFIX: u8 = 0x00;

/// Single-byte client WebSocket message signalling the end of the request stream.
pub const WEBSOCKET_END_OF_REQUEST: u8 = 0x01;
