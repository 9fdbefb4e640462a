mod grpc_web_server;
pub use grpc_web_server::{GrpcWebServer, RequestStream};

mod server_context;
pub use server_context::ServerContext;

mod server_error;
pub use server_error::ServerError;

pub mod utils;
