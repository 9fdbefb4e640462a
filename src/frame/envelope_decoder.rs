use crate::constants::{DEFAULT_MAX_MESSAGE_SIZE, ENVELOPE_HEADER_SIZE};
use crate::frame::{Envelope, EnvelopeCodec, FrameDecodeError};
use std::collections::VecDeque;

/// A streaming decoder for concatenated envelopes.
///
/// `EnvelopeDecoder` accepts arbitrarily chunked bytes (HTTP body chunks,
/// WebSocket messages) and emits every envelope that has been completely
/// received. Partial envelopes are buffered until the rest arrives.
///
/// ### Behavior Summary:
/// - Envelopes are emitted strictly in wire order.
/// - An envelope whose announced length exceeds the configured limit yields
///   `MessageTooLarge` without buffering the payload.
/// - Any decode error is unrecoverable: framing is lost, so the buffer is
///   discarded and every later read yields `ReadAfterError`.
pub struct EnvelopeDecoder {
    buffer: Vec<u8>,
    max_message_size: usize,
    is_failed: bool,
}

pub struct EnvelopeIterator {
    queue: VecDeque<Result<Envelope, FrameDecodeError>>,
}

impl Iterator for EnvelopeIterator {
    type Item = Result<Envelope, FrameDecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.queue.pop_front()
    }
}

impl Default for EnvelopeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvelopeDecoder {
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_message_size,
            is_failed: false,
        }
    }

    /// True when bytes of an incomplete envelope are buffered.
    pub fn has_partial_envelope(&self) -> bool {
        !self.buffer.is_empty()
    }

    // Reads new bytes and attempts to decode them into envelopes
    pub fn read_bytes(&mut self, data: &[u8]) -> EnvelopeIterator {
        let mut queue = VecDeque::new();

        if self.is_failed {
            if !data.is_empty() {
                queue.push_back(Err(FrameDecodeError::ReadAfterError));
            }
            return EnvelopeIterator { queue };
        }

        self.buffer.extend_from_slice(data);

        while let Some((kind, len)) = EnvelopeCodec::decode_prefix(&self.buffer) {
            let failure = match kind {
                Err(err) => Some(err),
                Ok(_) if len > self.max_message_size => Some(FrameDecodeError::MessageTooLarge {
                    size: len,
                    limit: self.max_message_size,
                }),
                Ok(_) => None,
            };

            if let Some(err) = failure {
                tracing::warn!("Envelope decoding failed: {}", err);
                self.fail();
                queue.push_back(Err(err));
                break;
            }

            let total = ENVELOPE_HEADER_SIZE + len;

            if self.buffer.len() < total {
                break;
            }

            match EnvelopeCodec::decode(&self.buffer[..total]) {
                Ok(envelope) => {
                    self.buffer.drain(..total);
                    tracing::trace!(
                        "Decoded {:?} envelope ({} bytes)",
                        envelope.kind,
                        envelope.payload.len()
                    );
                    queue.push_back(Ok(envelope));
                }
                Err(err) => {
                    self.fail();
                    queue.push_back(Err(err));
                    break;
                }
            }
        }

        EnvelopeIterator { queue }
    }

    fn fail(&mut self) {
        self.is_failed = true;
        self.buffer.clear();
    }
}
