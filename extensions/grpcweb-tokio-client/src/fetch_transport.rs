use crate::channel_duplex::{DuplexTask, Outbound, channel_duplex};
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;
use grpcweb::constants::{
    DEFAULT_MAX_MESSAGE_SIZE, GRPC_MESSAGE_KEY, GRPC_STATUS_KEY, GRPC_WEB_CONTENT_TYPE,
    X_GRPC_WEB_KEY,
};
use grpcweb::frame::{EnvelopeCodec, EnvelopeDecoder, Frame, ResponseFrameDecoder};
use grpcweb::{AbortSignal, Metadata, Status};
use grpcweb_caller::{Duplex, Transport, TransportError, TransportRequest};
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use std::io;
use tokio::sync::mpsc;

/// HTTP transport in the style of a browser `fetch`: one POST per call with
/// a streamed request body.
///
/// The response's HTTP headers are the call's header; the body carries the
/// response message and the trailer envelope. Whether response frames can
/// arrive before the request body is finished depends on the HTTP stack, so
/// this transport is treated as half-duplex.
#[derive(Debug, Clone)]
pub struct FetchTransport {
    client: reqwest::Client,
    max_message_size: usize,
}

impl Default for FetchTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FetchTransport {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Uses a preconfigured client (TLS roots, proxies, timeouts).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Limits the size of a single response envelope.
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }
}

impl Transport for FetchTransport {
    fn open(&self, request: TransportRequest) -> Box<dyn Duplex> {
        let (duplex, task) = channel_duplex();
        tokio::spawn(run_call(
            self.client.clone(),
            request,
            task,
            self.max_message_size,
        ));
        Box::new(duplex)
    }
}

async fn run_call(
    client: reqwest::Client,
    request: TransportRequest,
    task: DuplexTask,
    max_message_size: usize,
) {
    let DuplexTask {
        outbound,
        inbound,
        aborted,
    } = task;

    // Dropping `drive` on abort drops the in-flight request and its body.
    let result = tokio::select! {
        biased;
        _ = aborted.aborted() => {
            tracing::trace!("{}: fetch aborted", request.method_path);
            Ok(())
        }
        result = drive(&client, &request, outbound, &inbound, aborted.clone(), max_message_size) => result,
    };

    if let Err(err) = result {
        tracing::debug!("{}: fetch failed: {}", request.method_path, err);
        let _ = inbound.send(Err(err));
    }
}

async fn drive(
    client: &reqwest::Client,
    request: &TransportRequest,
    outbound: mpsc::Receiver<Outbound>,
    inbound: &mpsc::UnboundedSender<Result<Frame, TransportError>>,
    aborted: AbortSignal,
    max_message_size: usize,
) -> Result<(), TransportError> {
    let mut builder = client
        .post(&request.url)
        .header(CONTENT_TYPE, GRPC_WEB_CONTENT_TYPE)
        .header(X_GRPC_WEB_KEY, "1");
    for (key, values) in request.metadata.entries() {
        for value in values {
            builder = builder.header(key, value.as_str());
        }
    }

    let response = builder
        .body(request_body(outbound, aborted))
        .send()
        .await
        .map_err(|err| {
            if err.is_builder() {
                TransportError::Protocol(format!("invalid request: {err}"))
            } else {
                TransportError::Unavailable(format!("failed to fetch {}: {err}", request.url))
            }
        })?;

    let http_status = response.status();
    let mut header = metadata_from_headers(response.headers());

    if header.contains_key(GRPC_STATUS_KEY) {
        tracing::trace!("{}: trailers-only response", request.method_path);
        let mut trailer = header.clone();
        let status = Status::take_from_metadata(&mut trailer);
        header.remove(GRPC_STATUS_KEY);
        header.remove(GRPC_MESSAGE_KEY);

        let _ = inbound.send(Ok(Frame::Header(header)));
        let _ = inbound.send(Ok(Frame::Trailer {
            metadata: trailer,
            status,
        }));
        return Ok(());
    }

    if !http_status.is_success() {
        return Err(TransportError::HttpStatus(http_status.as_u16()));
    }

    if inbound.send(Ok(Frame::Header(header))).is_err() {
        return Ok(());
    }

    let mut decoder = ResponseFrameDecoder::from_parts(
        EnvelopeDecoder::with_max_message_size(max_message_size),
        true,
    );
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk
            .map_err(|err| TransportError::Unavailable(format!("failed to read response: {err}")))?;

        for frame in decoder.read_bytes(&chunk) {
            if inbound.send(Ok(frame?)).is_err() {
                return Ok(());
            }
        }

        if decoder.is_complete() {
            return Ok(());
        }
    }

    if decoder.has_partial_frame() {
        return Err(TransportError::Protocol(
            "response body ended mid-envelope".into(),
        ));
    }

    Ok(())
}

/// Streams outbound messages as the request body.
///
/// Ends cleanly on half-close. On abort the body fails instead, so the HTTP
/// stack tears the request down rather than completing it.
fn request_body(outbound: mpsc::Receiver<Outbound>, aborted: AbortSignal) -> reqwest::Body {
    let chunks = stream::unfold(Some((outbound, aborted)), |state| async move {
        let (mut outbound, aborted) = state?;

        let next = tokio::select! {
            biased;
            _ = aborted.aborted() => {
                let err = io::Error::new(io::ErrorKind::Interrupted, "call aborted");
                return Some((Err(err), None));
            }
            next = outbound.recv() => next,
        };

        match next {
            Some(Outbound::Message(payload)) => {
                let chunk = Bytes::from(EnvelopeCodec::encode_message(&payload));
                Some((Ok(chunk), Some((outbound, aborted))))
            }
            Some(Outbound::CloseSend) | None => None,
        }
    });

    reqwest::Body::wrap_stream(chunks)
}

fn metadata_from_headers(headers: &HeaderMap) -> Metadata {
    let mut metadata = Metadata::new();
    for (name, value) in headers {
        match value.to_str() {
            Ok(value) => metadata.append(name.as_str(), value),
            Err(_) => tracing::warn!("Dropping non-UTF-8 response header {}", name),
        }
    }
    metadata
}
