use crate::frame::EnvelopeKind;
use crate::metadata::Metadata;
use crate::status::Status;

/// One length-prefixed unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub payload: Vec<u8>,
}

/// One discrete unit of a response stream.
///
/// A well-formed response is `Header`, zero or more `Message`s, then exactly
/// one `Trailer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Header(Metadata),
    Message(Vec<u8>),
    Trailer { metadata: Metadata, status: Status },
}

impl Frame {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Frame::Header(_) => "header",
            Frame::Message(_) => "message",
            Frame::Trailer { .. } => "trailer",
        }
    }
}
