use bitcode::{Decode, Encode};
use grpcweb::ClientStreamingMethod;
use std::io;

#[derive(Encode, Decode, PartialEq, Eq, Debug, Clone)]
pub struct TestRequest {
    pub id: String,
}

impl TestRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Encode, Decode, PartialEq, Eq, Debug, Clone)]
pub struct TestResponse {
    pub id: String,
}

impl TestResponse {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

pub struct TestClientStream;

impl ClientStreamingMethod for TestClientStream {
    const METHOD_PATH: &'static str = "/grpcweb.test.Test/TestClientStream";

    type Request = TestRequest;
    type Response = TestResponse;

    fn encode_request(request: Self::Request) -> Result<Vec<u8>, io::Error> {
        Ok(bitcode::encode(&request))
    }

    fn decode_request(bytes: &[u8]) -> Result<Self::Request, io::Error> {
        bitcode::decode::<TestRequest>(bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn encode_response(response: Self::Response) -> Result<Vec<u8>, io::Error> {
        Ok(bitcode::encode(&response))
    }

    fn decode_response(bytes: &[u8]) -> Result<Self::Response, io::Error> {
        bitcode::decode::<TestResponse>(bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
