//! Note: This `GrpcWebServer` is a reference implementation and does not
//! include authentication, CORS handling or compression. It exists to serve
//! client-streaming methods to gRPC-Web clients over both HTTP (a streamed
//! POST body) and WebSockets (the `grpc-websockets` subprotocol), mainly for
//! exercising clients end to end.

use crate::server_context::{AbortOnDrop, ResponseEvent, ServerContext};
use crate::server_error::ServerError;
use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode as HttpStatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::post,
};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use grpcweb::constants::{
    GRPC_WEB_CONTENT_TYPE, GRPC_WEBSOCKET_PROTOCOL, WEBSOCKET_END_OF_REQUEST,
    WEBSOCKET_MESSAGE_PREFIX,
};
use grpcweb::frame::{
    Envelope, EnvelopeCodec, EnvelopeDecoder, EnvelopeKind, decode_metadata_block,
    encode_metadata_block,
};
use grpcweb::{ClientStreamingMethod, Metadata, Status, StatusCode};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    net::{TcpListener, ToSocketAddrs},
    sync::{RwLock, mpsc},
};

/// How long a WebSocket stays open for the client's close after the trailer.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Decoded request messages as seen by a handler. Ends when the client
/// half-closes; yields an error if the request stream is malformed.
pub type RequestStream<T> = BoxStream<'static, Result<T, ServerError>>;

type RequestPayloads = mpsc::UnboundedReceiver<Result<Vec<u8>, ServerError>>;

type ErasedHandler = Arc<
    dyn Fn(RequestPayloads, ServerContext) -> BoxFuture<'static, Result<Vec<u8>, ServerError>>
        + Send
        + Sync,
>;

/// A gRPC-Web server for client-streaming methods.
pub struct GrpcWebServer {
    handlers: RwLock<HashMap<String, ErasedHandler>>,
}

impl Default for GrpcWebServer {
    fn default() -> Self {
        Self::new()
    }
}

impl GrpcWebServer {
    pub fn new() -> Self {
        GrpcWebServer {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers the handler for method `M`.
    ///
    /// The handler receives the decoded request stream and the call's
    /// [`ServerContext`], and resolves with the single response or a
    /// [`ServerError`] sent back as the trailer status.
    pub async fn register_client_streaming<M, F, Fut>(&self, handler: F) -> Result<(), ServerError>
    where
        M: ClientStreamingMethod + 'static,
        M::Request: Send + 'static,
        F: Fn(RequestStream<M::Request>, ServerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<M::Response, ServerError>> + Send + 'static,
    {
        let erased: ErasedHandler = Arc::new(move |payloads, context| {
            let response = handler(request_stream::<M>(payloads), context);
            async move {
                let response = response.await?;
                M::encode_response(response).map_err(ServerError::from)
            }
            .boxed()
        });

        let mut handlers = self.handlers.write().await;
        if handlers.contains_key(M::METHOD_PATH) {
            return Err(ServerError::new(
                StatusCode::AlreadyExists,
                format!("Handler already registered for {}", M::METHOD_PATH),
            ));
        }
        handlers.insert(M::METHOD_PATH.to_string(), erased);

        tracing::debug!("Registered client-streaming handler for {}", M::METHOD_PATH);
        Ok(())
    }

    /// Binds to an address and starts the server.
    pub async fn serve<A: ToSocketAddrs>(self, addr: A) -> Result<SocketAddr, axum::BoxError> {
        let listener = TcpListener::bind(addr).await?;
        let server = Arc::new(self);
        server.serve_with_listener(listener).await
    }

    /// Starts the server on a specific host and port.
    pub async fn serve_on(self, host: &str, port: u16) -> Result<SocketAddr, axum::BoxError> {
        let addr = format!("{host}:{port}");
        self.serve(addr).await
    }

    /// Starts the server with a pre-bound `TcpListener`.
    ///
    /// Every path is routed here: `POST` carries an HTTP call, `GET` upgrades
    /// to a WebSocket call.
    pub async fn serve_with_listener(
        self: Arc<Self>,
        listener: TcpListener,
    ) -> Result<SocketAddr, axum::BoxError> {
        let address = listener.local_addr()?;
        let app = Router::new().route(
            "/{*path}",
            post({
                let server = self.clone();
                move |uri, headers, body| Self::http_handler(server, uri, headers, body)
            })
            .get({
                let server = self.clone();
                move |uri, ws, conn| Self::ws_handler(server, uri, ws, conn)
            }),
        );
        tracing::info!("Server running on {:?}", address);
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(address)
    }

    async fn handler(&self, method_path: &str) -> Option<ErasedHandler> {
        self.handlers.read().await.get(method_path).cloned()
    }

    async fn http_handler(server: Arc<Self>, uri: Uri, headers: HeaderMap, body: Body) -> Response {
        let method_path = uri.path().to_string();

        let is_grpc_web = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/grpc-web"));
        if !is_grpc_web {
            tracing::warn!("{}: unsupported content-type", method_path);
            return HttpStatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
        }

        let Some(handler) = server.handler(&method_path).await else {
            tracing::debug!("{}: no handler registered", method_path);
            return trailers_only_response(&method_not_found(&method_path));
        };

        let (context, mut events) =
            ServerContext::new(&method_path, metadata_from_headers(&headers));
        let (payload_tx, payload_rx) = mpsc::unbounded_channel();
        tokio::spawn(forward_request_body(body, payload_tx, context.clone()));
        spawn_call(handler, payload_rx, context.clone());

        let guard = AbortOnDrop(context);

        // The response head goes out with the header event.
        let header = match events.recv().await {
            Some(ResponseEvent::Header(header)) => header,
            _ => {
                tracing::error!("{}: call ended without a header", method_path);
                return HttpStatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let mut response_headers = HeaderMap::new();
        response_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(GRPC_WEB_CONTENT_TYPE),
        );
        append_metadata(&mut response_headers, &header);

        let body = stream::unfold(Some((events, guard)), |state| async move {
            let (mut events, guard) = state?;
            loop {
                match events.recv().await? {
                    ResponseEvent::Header(_) => continue,
                    ResponseEvent::Message(payload) => {
                        let chunk = Bytes::from(EnvelopeCodec::encode_message(&payload));
                        return Some((Ok::<_, io::Error>(chunk), Some((events, guard))));
                    }
                    ResponseEvent::Trailer(trailer) => {
                        return Some((Ok(Bytes::from(encode_metadata_envelope(&trailer))), None));
                    }
                }
            }
        });

        (HttpStatusCode::OK, response_headers, Body::from_stream(body)).into_response()
    }

    async fn ws_handler(
        server: Arc<Self>,
        uri: Uri,
        ws: WebSocketUpgrade,
        ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ) -> Response {
        let method_path = uri.path().to_string();
        tracing::info!("Client {} connected for {}", addr, method_path);
        ws.protocols([GRPC_WEBSOCKET_PROTOCOL])
            .on_upgrade(move |socket| server.handle_socket(socket, method_path, addr))
    }

    /// Runs one call over an established WebSocket.
    ///
    /// The first client message is the request header block. After that the
    /// socket is multiplexed between inbound request messages and outbound
    /// response envelopes until the trailer is sent or the client leaves.
    async fn handle_socket(
        self: Arc<Self>,
        socket: WebSocket,
        method_path: String,
        addr: SocketAddr,
    ) {
        let (mut sender, mut receiver) = socket.split();

        let request_metadata = match receiver.next().await {
            Some(Ok(Message::Binary(bytes))) => match decode_metadata_block(&bytes) {
                Ok(metadata) => metadata,
                Err(err) => {
                    tracing::warn!("Client {} sent invalid request headers: {}", addr, err);
                    return;
                }
            },
            _ => {
                tracing::info!("Client {} disconnected before sending headers.", addr);
                return;
            }
        };

        let (context, mut events) = ServerContext::new(&method_path, request_metadata);
        let (payload_tx, payload_rx) = mpsc::unbounded_channel();
        let mut payload_tx = Some(payload_tx);

        match self.handler(&method_path).await {
            Some(handler) => spawn_call(handler, payload_rx, context.clone()),
            None => {
                tracing::debug!("{}: no handler registered", method_path);
                context.finish(method_not_found(&method_path));
            }
        }

        let _guard = AbortOnDrop(context.clone());
        let mut decoder = EnvelopeDecoder::new();
        let mut trailer_sent = false;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let (bytes, is_trailer) = match event {
                        ResponseEvent::Header(header) => (encode_metadata_envelope(&header), false),
                        ResponseEvent::Message(payload) => (EnvelopeCodec::encode_message(&payload), false),
                        ResponseEvent::Trailer(trailer) => (encode_metadata_envelope(&trailer), true),
                    };

                    if sender.send(Message::Binary(bytes.into())).await.is_err() {
                        tracing::info!("Client {} disconnected (failed to send).", addr);
                        break;
                    }

                    if is_trailer {
                        let _ = sender.send(Message::Close(None)).await;
                        trailer_sent = true;
                        break;
                    }
                }

                inbound = receiver.next() => match inbound {
                    Some(Ok(Message::Binary(bytes))) => match bytes.split_first() {
                        Some((&WEBSOCKET_MESSAGE_PREFIX, rest)) => {
                            if let Some(payloads) = &payload_tx {
                                if !forward_envelopes(&mut decoder, rest, payloads, &method_path) {
                                    payload_tx = None;
                                }
                            }
                        }
                        Some((&WEBSOCKET_END_OF_REQUEST, _)) => {
                            tracing::trace!("{}: client half-closed", method_path);
                            payload_tx = None;
                        }
                        _ => tracing::warn!("Client {} sent an unrecognized message", addr),
                    },
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        tracing::info!("Client {} disconnected.", addr);
                        context.client_gone();
                        break;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }

        if trailer_sent {
            drain_until_closed(&mut receiver, addr).await;
        }

        tracing::info!("Terminated connection for {}.", addr);
    }
}

/// Discards client frames after the response is complete until the client
/// acknowledges the close.
///
/// Dropping a socket with unread request data makes the kernel reset the
/// connection, which discards response bytes the client has not read yet.
async fn drain_until_closed(receiver: &mut SplitStream<WebSocket>, addr: SocketAddr) {
    let drained = tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, async {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    })
    .await;

    if drained.is_err() {
        tracing::debug!("Client {} did not close within {:?}", addr, CLOSE_DRAIN_TIMEOUT);
    }
}

fn request_stream<M>(payloads: RequestPayloads) -> RequestStream<M::Request>
where
    M: ClientStreamingMethod,
    M::Request: Send + 'static,
{
    stream::unfold(payloads, |mut payloads| async move {
        payloads.recv().await.map(|payload| (payload, payloads))
    })
    .map(|payload| payload.and_then(|bytes| M::decode_request(&bytes).map_err(ServerError::from)))
    .boxed()
}

/// Runs the handler to completion and emits its response and trailer.
fn spawn_call(handler: ErasedHandler, payloads: RequestPayloads, context: ServerContext) {
    tokio::spawn(async move {
        let outcome = AssertUnwindSafe(handler(payloads, context.clone()))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(response)) => {
                context.send_message(response);
                context.finish(Status::ok());
            }
            Ok(Err(err)) => context.finish(Status::new(err.code, err.details)),
            Err(_) => {
                tracing::error!("{}: handler panicked", context.method_path());
                context.finish(Status::new(StatusCode::Internal, "Handler panicked"));
            }
        }
    });
}

async fn forward_request_body(
    body: Body,
    payloads: mpsc::UnboundedSender<Result<Vec<u8>, ServerError>>,
    context: ServerContext,
) {
    let mut chunks = body.into_data_stream();
    let mut decoder = EnvelopeDecoder::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                tracing::debug!("{}: request body failed: {}", context.method_path(), err);
                context.client_gone();
                return;
            }
        };

        if !forward_envelopes(&mut decoder, &chunk, &payloads, context.method_path()) {
            return;
        }
    }

    if decoder.has_partial_envelope() {
        tracing::warn!("{}: request ended mid-envelope", context.method_path());
        let _ = payloads.send(Err(ServerError::new(
            StatusCode::Internal,
            "Request stream ended mid-message",
        )));
    }
}

/// Feeds request bytes through `decoder`, forwarding message payloads.
/// Returns `false` once the request stream is broken.
fn forward_envelopes(
    decoder: &mut EnvelopeDecoder,
    bytes: &[u8],
    payloads: &mpsc::UnboundedSender<Result<Vec<u8>, ServerError>>,
    method_path: &str,
) -> bool {
    for envelope in decoder.read_bytes(bytes) {
        match envelope {
            Ok(Envelope {
                kind: EnvelopeKind::Message,
                payload,
            }) => {
                let _ = payloads.send(Ok(payload));
            }
            Ok(_) => tracing::warn!("{}: ignoring metadata envelope in request", method_path),
            Err(err) => {
                tracing::warn!("{}: malformed request: {}", method_path, err);
                let _ = payloads.send(Err(ServerError::new(
                    StatusCode::Internal,
                    format!("Malformed request: {err}"),
                )));
                return false;
            }
        }
    }
    true
}

fn method_not_found(method_path: &str) -> Status {
    Status::new(
        StatusCode::Unimplemented,
        format!("Method not found: {method_path}"),
    )
}

fn encode_metadata_envelope(metadata: &Metadata) -> Vec<u8> {
    EnvelopeCodec::encode(EnvelopeKind::Metadata, &encode_metadata_block(metadata))
}

/// A response whose HTTP headers carry the status, with an empty body.
fn trailers_only_response(status: &Status) -> Response {
    let mut metadata = Metadata::new();
    status.write_to_metadata(&mut metadata);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(GRPC_WEB_CONTENT_TYPE),
    );
    append_metadata(&mut headers, &metadata);

    (HttpStatusCode::OK, headers).into_response()
}

fn metadata_from_headers(headers: &HeaderMap) -> Metadata {
    let mut metadata = Metadata::new();
    for (name, value) in headers {
        match value.to_str() {
            Ok(value) => metadata.append(name.as_str(), value),
            Err(_) => tracing::warn!("Dropping non-UTF-8 request header {}", name),
        }
    }
    metadata
}

fn append_metadata(headers: &mut HeaderMap, metadata: &Metadata) {
    for (key, values) in metadata.entries() {
        let Ok(name) = HeaderName::from_bytes(key.as_bytes()) else {
            tracing::warn!("Dropping invalid response header name {:?}", key);
            continue;
        };
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.append(name.clone(), value);
                }
                Err(_) => tracing::warn!("Dropping invalid value for response header {}", key),
            }
        }
    }
}
