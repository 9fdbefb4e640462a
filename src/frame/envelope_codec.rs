use crate::{
    constants::{ENVELOPE_FLAGS_OFFSET, ENVELOPE_HEADER_SIZE, ENVELOPE_LENGTH_OFFSET},
    frame::{Envelope, EnvelopeKind, FrameDecodeError},
};

/// Encodes and decodes single gRPC-Web envelopes.
///
/// An envelope is a flags byte, a big-endian `u32` payload length, then the
/// payload itself. Streaming decoding of concatenated envelopes is handled by
/// [`crate::frame::EnvelopeDecoder`].
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    pub fn encode(kind: EnvelopeKind, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(ENVELOPE_HEADER_SIZE + payload.len());
        buf.push(kind as u8);
        buf.extend(&(payload.len() as u32).to_be_bytes());
        buf.extend(payload);
        buf
    }

    pub fn encode_message(payload: &[u8]) -> Vec<u8> {
        Self::encode(EnvelopeKind::Message, payload)
    }

    /// Decodes exactly one envelope occupying all of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Envelope, FrameDecodeError> {
        let (kind, len) = Self::decode_prefix(buf).ok_or(FrameDecodeError::CorruptFrame {
            flags: buf.first().copied().unwrap_or_default(),
        })?;
        let kind = kind?;

        match buf.get(ENVELOPE_HEADER_SIZE..) {
            Some(payload) if payload.len() == len => Ok(Envelope {
                kind,
                payload: payload.to_vec(),
            }),
            _ => Err(FrameDecodeError::CorruptFrame {
                flags: buf[ENVELOPE_FLAGS_OFFSET],
            }),
        }
    }

    /// Reads the envelope prefix, returning the parsed kind and payload length.
    /// `None` if fewer than [`ENVELOPE_HEADER_SIZE`] bytes are available.
    pub(crate) fn decode_prefix(
        buf: &[u8],
    ) -> Option<(Result<EnvelopeKind, FrameDecodeError>, usize)> {
        let flags = *buf.get(ENVELOPE_FLAGS_OFFSET)?;
        let len = buf
            .get(ENVELOPE_LENGTH_OFFSET..ENVELOPE_HEADER_SIZE)
            .and_then(|bytes| bytes.try_into().ok())
            .map(u32::from_be_bytes)?;

        Some((EnvelopeKind::try_from(flags), len as usize))
    }
}
