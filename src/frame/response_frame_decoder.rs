use crate::frame::{
    EnvelopeDecoder, EnvelopeKind, Frame, FrameDecodeError, decode_metadata_block,
};
use crate::status::Status;
use std::collections::VecDeque;

/// Turns a gRPC-Web response byte stream into ordered [`Frame`]s.
///
/// Metadata envelopes are interpreted positionally: while no header has been
/// seen, a metadata envelope is the `Header`; afterwards it is the `Trailer`.
/// Transports that deliver the header out-of-band (HTTP response headers)
/// start the decoder with [`ResponseFrameDecoder::with_header_received`].
///
/// The decoder reports what arrived; it does not enforce response
/// cardinality (how many messages a method may return). That is left to the
/// call driver.
pub struct ResponseFrameDecoder {
    envelopes: EnvelopeDecoder,
    header_received: bool,
    trailer_received: bool,
}

pub struct ResponseFrameIterator {
    queue: VecDeque<Result<Frame, FrameDecodeError>>,
}

impl Iterator for ResponseFrameIterator {
    type Item = Result<Frame, FrameDecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.queue.pop_front()
    }
}

impl ResponseFrameDecoder {
    /// For streams where the header arrives in-band as the first metadata envelope.
    pub fn awaiting_header() -> Self {
        Self::from_parts(EnvelopeDecoder::new(), false)
    }

    /// For streams whose header was already delivered out-of-band.
    pub fn with_header_received() -> Self {
        Self::from_parts(EnvelopeDecoder::new(), true)
    }

    pub fn from_parts(envelopes: EnvelopeDecoder, header_received: bool) -> Self {
        Self {
            envelopes,
            header_received,
            trailer_received: false,
        }
    }

    /// True once the trailer has been decoded.
    pub fn is_complete(&self) -> bool {
        self.trailer_received
    }

    /// True when part of an envelope is still buffered.
    pub fn has_partial_frame(&self) -> bool {
        self.envelopes.has_partial_envelope()
    }

    pub fn read_bytes(&mut self, data: &[u8]) -> ResponseFrameIterator {
        let mut queue = VecDeque::new();

        for envelope in self.envelopes.read_bytes(data) {
            if self.trailer_received {
                queue.push_back(Err(FrameDecodeError::ReadAfterEnd));
                break;
            }

            let envelope = match envelope {
                Ok(envelope) => envelope,
                Err(err) => {
                    queue.push_back(Err(err));
                    break;
                }
            };

            let frame = match envelope.kind {
                EnvelopeKind::Message => Ok(Frame::Message(envelope.payload)),
                EnvelopeKind::Metadata => {
                    decode_metadata_block(&envelope.payload).map(|mut metadata| {
                        if self.header_received {
                            self.trailer_received = true;
                            let status = Status::take_from_metadata(&mut metadata);
                            Frame::Trailer { metadata, status }
                        } else {
                            self.header_received = true;
                            Frame::Header(metadata)
                        }
                    })
                }
            };

            let is_err = frame.is_err();
            queue.push_back(frame);
            if is_err {
                break;
            }
        }

        ResponseFrameIterator { queue }
    }
}
