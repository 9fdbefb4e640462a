mod sum;
pub use sum::{Sum, SumRequest, SumResponse};

mod test_client_stream;
pub use test_client_stream::{TestClientStream, TestRequest, TestResponse};
