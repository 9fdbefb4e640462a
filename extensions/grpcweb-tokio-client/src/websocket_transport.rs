use crate::channel_duplex::{DuplexTask, Outbound, channel_duplex};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use grpcweb::constants::{
    CONTENT_TYPE_KEY, DEFAULT_MAX_MESSAGE_SIZE, ENVELOPE_HEADER_SIZE, GRPC_WEB_CONTENT_TYPE,
    GRPC_WEBSOCKET_PROTOCOL, WEBSOCKET_END_OF_REQUEST, WEBSOCKET_MESSAGE_PREFIX, X_GRPC_WEB_KEY,
};
use grpcweb::frame::{
    EnvelopeCodec, EnvelopeDecoder, Frame, ResponseFrameDecoder, encode_metadata_block,
};
use grpcweb::{AbortSignal, Metadata};
use grpcweb_caller::{Duplex, Transport, TransportError, TransportRequest};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

/// Full-duplex transport over the `grpc-websockets` WebSocket subprotocol.
///
/// Each call opens its own WebSocket to the `ws://` / `wss://` form of the
/// method URL. The first binary message carries the request headers, each
/// request message is prefixed with `0x00`, and `0x01` half-closes the
/// request stream. The server answers with plain envelopes.
#[derive(Debug, Clone)]
pub struct WebsocketTransport {
    max_message_size: usize,
}

impl Default for WebsocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl WebsocketTransport {
    pub fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Limits the size of a single response envelope.
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }
}

impl Transport for WebsocketTransport {
    fn open(&self, request: TransportRequest) -> Box<dyn Duplex> {
        let (duplex, task) = channel_duplex();
        tokio::spawn(run_call(request, task, self.max_message_size));
        Box::new(duplex)
    }
}

/// Converts an `http(s)://` URL into its `ws(s)://` counterpart.
pub(crate) fn websocket_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

async fn run_call(request: TransportRequest, task: DuplexTask, max_message_size: usize) {
    let DuplexTask {
        mut outbound,
        inbound,
        aborted,
    } = task;

    let result = drive(&request, &mut outbound, &inbound, &aborted, max_message_size).await;

    if let Err(err) = result {
        tracing::debug!("{}: websocket call failed: {}", request.method_path, err);
        let _ = inbound.send(Err(err));
    }
}

async fn drive(
    request: &TransportRequest,
    outbound: &mut mpsc::Receiver<Outbound>,
    inbound: &mpsc::UnboundedSender<Result<Frame, TransportError>>,
    aborted: &AbortSignal,
    max_message_size: usize,
) -> Result<(), TransportError> {
    let url = websocket_url(&request.url);

    let mut ws_request = url
        .as_str()
        .into_client_request()
        .map_err(|err| TransportError::Unavailable(format!("invalid url {url}: {err}")))?;
    ws_request.headers_mut().insert(
        SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static(GRPC_WEBSOCKET_PROTOCOL),
    );

    let connected = tokio::select! {
        biased;
        _ = aborted.aborted() => return Ok(()),
        connected = connect_async(ws_request) => connected,
    };
    let (ws_stream, _) = connected
        .map_err(|err| TransportError::Unavailable(format!("failed to connect to {url}: {err}")))?;
    tracing::debug!("{}: websocket connected", request.method_path);

    let (mut sender, mut receiver) = ws_stream.split();

    let mut header_block = Metadata::new();
    header_block.set(CONTENT_TYPE_KEY, GRPC_WEB_CONTENT_TYPE);
    header_block.set(X_GRPC_WEB_KEY, "1");
    header_block.extend(&request.metadata);

    sender
        .send(WsMessage::Binary(Bytes::from(encode_metadata_block(&header_block))))
        .await
        .map_err(|err| TransportError::Unavailable(err.to_string()))?;

    let mut decoder = ResponseFrameDecoder::from_parts(
        EnvelopeDecoder::with_max_message_size(max_message_size),
        false,
    );
    let mut outbound_open = true;

    loop {
        tokio::select! {
            biased;

            _ = aborted.aborted() => {
                tracing::trace!("{}: closing websocket on abort", request.method_path);
                let _ = sender.send(WsMessage::Close(None)).await;
                return Ok(());
            }

            message = receiver.next() => match message {
                Some(Ok(WsMessage::Binary(bytes))) => {
                    for frame in decoder.read_bytes(&bytes) {
                        if inbound.send(Ok(frame?)).is_err() {
                            return Ok(());
                        }
                    }

                    if decoder.is_complete() {
                        let _ = sender.send(WsMessage::Close(None)).await;
                        return Ok(());
                    }
                }
                // A close before the trailer surfaces as a premature end of the response.
                Some(Ok(WsMessage::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(TransportError::Unavailable(err.to_string())),
            },

            next = outbound.recv(), if outbound_open => {
                let message = match next {
                    Some(Outbound::Message(payload)) => {
                        let mut message = Vec::with_capacity(1 + ENVELOPE_HEADER_SIZE + payload.len());
                        message.push(WEBSOCKET_MESSAGE_PREFIX);
                        message.extend_from_slice(&EnvelopeCodec::encode_message(&payload));
                        message
                    }
                    Some(Outbound::CloseSend) => {
                        outbound_open = false;
                        vec![WEBSOCKET_END_OF_REQUEST]
                    }
                    None => {
                        outbound_open = false;
                        continue;
                    }
                };

                // The response side decides the outcome; a broken send only
                // stops further sends.
                if let Err(err) = sender.send(WsMessage::Binary(Bytes::from(message))).await {
                    tracing::debug!("{}: websocket send failed: {}", request.method_path, err);
                    outbound_open = false;
                }
            }
        }
    }
}
