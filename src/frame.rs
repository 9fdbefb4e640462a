mod envelope_codec;
mod envelope_decoder;
mod envelope_kind;
mod frame_error;
mod frame_struct;
mod metadata_block;
mod response_frame_decoder;

pub use envelope_codec::EnvelopeCodec;
pub use envelope_decoder::{EnvelopeDecoder, EnvelopeIterator};
pub use envelope_kind::EnvelopeKind;
pub use frame_error::FrameDecodeError;
pub use frame_struct::{Envelope, Frame};
pub use metadata_block::{decode_metadata_block, encode_metadata_block};
pub use response_frame_decoder::{ResponseFrameDecoder, ResponseFrameIterator};
