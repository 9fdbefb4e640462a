//! Tokio transports for `grpcweb-caller`.
//!
//! [`WebsocketTransport`] is full-duplex: response frames may arrive while
//! requests are still being sent. [`FetchTransport`] issues a streamed HTTP
//! POST and should be assumed half-duplex.

mod channel_duplex;

mod fetch_transport;
pub use fetch_transport::FetchTransport;

mod websocket_transport;
pub use websocket_transport::WebsocketTransport;

pub use grpcweb_caller::{CallError, CallOptions, Channel, ClientError, ClientStreamingCall};
