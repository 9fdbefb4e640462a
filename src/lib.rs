//! Sans-IO building blocks shared by gRPC-Web clients and servers.
//!
//! Nothing in this crate performs I/O. Transports feed raw bytes into the
//! decoders found in [`frame`] and get back ordered [`frame::Frame`]s; the
//! call driver in `grpcweb-caller` consumes those frames.

pub mod abort;
pub mod constants;
pub mod frame;
pub mod metadata;
pub mod service;
pub mod status;

pub use abort::{AbortController, AbortSignal};
pub use metadata::Metadata;
pub use service::ClientStreamingMethod;
pub use status::{Status, StatusCode};
