use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum FrameDecodeError {
    /// The flags byte carries bits this decoder does not understand.
    CorruptFrame { flags: u8 },

    /// The payload is compressed; no compression codecs are negotiated.
    UnsupportedCompression,

    /// The announced payload length exceeds the configured limit.
    MessageTooLarge { size: usize, limit: usize },

    /// A metadata block could not be parsed.
    InvalidMetadata(String),

    /// Attempted to read a frame after the trailer has already been decoded.
    ReadAfterEnd,

    /// Attempted to read after a previous unrecoverable decode error.
    ReadAfterError,
}

impl fmt::Display for FrameDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameDecodeError::CorruptFrame { flags } => {
                write!(f, "corrupt frame (flags 0x{flags:02x})")
            }
            FrameDecodeError::UnsupportedCompression => {
                write!(f, "compressed frames are not supported")
            }
            FrameDecodeError::MessageTooLarge { size, limit } => {
                write!(f, "frame of {size} bytes exceeds the {limit} byte limit")
            }
            FrameDecodeError::InvalidMetadata(reason) => {
                write!(f, "invalid metadata block: {reason}")
            }
            FrameDecodeError::ReadAfterEnd => write!(f, "frame received after trailer"),
            FrameDecodeError::ReadAfterError => {
                write!(f, "frame received after a decode error")
            }
        }
    }
}

impl std::error::Error for FrameDecodeError {}
