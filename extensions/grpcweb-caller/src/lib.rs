//! Runtime-agnostic client side of client-streaming gRPC-Web calls.
//!
//! A [`Channel`] binds an address to a [`Transport`]. Each call opens one
//! [`Duplex`] and is driven by [`call_driver::execute`] until the server's
//! trailer, a failure, or the caller's abort signal settles it.

pub mod call_driver;
mod call_options;
mod channel;
mod client_streaming_call;
pub mod error;
pub mod error_mapper;
mod transport;

pub use call_driver::CallState;
pub use call_options::{CallOptions, MetadataCallback};
pub use channel::Channel;
pub use client_streaming_call::ClientStreamingCall;
pub use error::{AbortError, CallError, ClientError, TransportError};
pub use transport::{Duplex, Transport, TransportRequest};

pub use grpcweb::{AbortController, AbortSignal, Metadata, Status, StatusCode};
