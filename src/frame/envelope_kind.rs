use crate::constants::{ENVELOPE_FLAG_COMPRESSED, ENVELOPE_FLAG_METADATA};
use crate::frame::FrameDecodeError;
use std::convert::TryFrom;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Carries one serialized message.
    Message = 0x00,
    /// Carries a metadata block (header or trailer).
    Metadata = ENVELOPE_FLAG_METADATA,
}

impl TryFrom<u8> for EnvelopeKind {
    type Error = FrameDecodeError;

    fn try_from(flags: u8) -> Result<Self, Self::Error> {
        if flags & ENVELOPE_FLAG_COMPRESSED != 0 {
            return Err(FrameDecodeError::UnsupportedCompression);
        }

        match flags {
            0x00 => Ok(EnvelopeKind::Message),
            ENVELOPE_FLAG_METADATA => Ok(EnvelopeKind::Metadata),
            _ => Err(FrameDecodeError::CorruptFrame { flags }),
        }
    }
}
