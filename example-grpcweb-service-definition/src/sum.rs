use bitcode::{Decode, Encode};
use grpcweb::ClientStreamingMethod;
use std::io;

/// Adds up every number the client streams in.
pub struct Sum;

#[derive(Encode, Decode, PartialEq, Debug, Clone, Copy)]
pub struct SumRequest {
    pub value: f64,
}

#[derive(Encode, Decode, PartialEq, Debug, Clone, Copy)]
pub struct SumResponse {
    pub total: f64,
    pub count: u64,
}

impl ClientStreamingMethod for Sum {
    const METHOD_PATH: &'static str = "/grpcweb.example.Calculator/Sum";

    type Request = SumRequest;
    type Response = SumResponse;

    fn encode_request(request: Self::Request) -> Result<Vec<u8>, io::Error> {
        Ok(bitcode::encode(&request))
    }

    fn decode_request(bytes: &[u8]) -> Result<Self::Request, io::Error> {
        bitcode::decode::<SumRequest>(bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn encode_response(response: Self::Response) -> Result<Vec<u8>, io::Error> {
        Ok(bitcode::encode(&response))
    }

    fn decode_response(bytes: &[u8]) -> Result<Self::Response, io::Error> {
        bitcode::decode::<SumResponse>(bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
