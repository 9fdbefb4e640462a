use example_grpcweb_service_definition::{TestClientStream, TestRequest, TestResponse};
use futures::{Stream, StreamExt, stream};
use grpcweb::frame::Frame;
use grpcweb::{AbortController, ClientStreamingMethod, Metadata, Status, StatusCode};
use grpcweb_caller::{
    CallError, CallOptions, Channel, ClientError, ClientStreamingCall, Duplex, Transport,
    TransportError, TransportRequest,
};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

// --- Test Setup: Mock Implementations ---

#[derive(Debug, PartialEq)]
enum Outbound {
    Message(Vec<u8>),
    CloseSend,
}

/// A duplex whose far end is driven by the test acting as the server.
struct MockDuplex {
    outbound: mpsc::UnboundedSender<Outbound>,
    frames: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Frame, TransportError>>>,
    abort: AbortController,
    // Released by the first outbound message when simulating a half-duplex transport.
    first_send: AbortController,
    half_duplex: bool,
}

#[async_trait::async_trait]
impl Duplex for MockDuplex {
    async fn send(&self, message: Vec<u8>) -> Result<(), TransportError> {
        if self.abort.is_aborted() {
            return Err(TransportError::Aborted);
        }
        self.outbound
            .send(Outbound::Message(message))
            .map_err(|_| TransportError::Unavailable("server gone".into()))?;
        self.first_send.abort();
        Ok(())
    }

    async fn close_send(&self) -> Result<(), TransportError> {
        let _ = self.outbound.send(Outbound::CloseSend);
        self.first_send.abort();
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Frame>, TransportError> {
        let aborted = self.abort.signal();

        if self.half_duplex {
            let released = self.first_send.signal();
            tokio::select! {
                _ = aborted.aborted() => return Err(TransportError::Aborted),
                _ = released.aborted() => {}
            }
        }

        let mut frames = self.frames.lock().await;
        tokio::select! {
            _ = aborted.aborted() => Err(TransportError::Aborted),
            frame = frames.recv() => frame.transpose(),
        }
    }

    fn abort(&self) {
        self.abort.abort();
    }
}

struct MockTransport {
    duplex: Mutex<Option<MockDuplex>>,
    opened: Arc<Mutex<Vec<TransportRequest>>>,
}

impl Transport for MockTransport {
    fn open(&self, request: TransportRequest) -> Box<dyn Duplex> {
        self.opened.lock().unwrap().push(request);
        Box::new(
            self.duplex
                .lock()
                .unwrap()
                .take()
                .expect("mock transport opened twice"),
        )
    }
}

/// The server half of a mock call.
struct MockServer {
    outbound: mpsc::UnboundedReceiver<Outbound>,
    frames: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    aborted: grpcweb::AbortSignal,
    opened: Arc<Mutex<Vec<TransportRequest>>>,
}

impl MockServer {
    fn send_header(&self, metadata: Metadata) {
        let _ = self.frames.send(Ok(Frame::Header(metadata)));
    }

    fn send_message(&self, payload: Vec<u8>) {
        let _ = self.frames.send(Ok(Frame::Message(payload)));
    }

    fn send_trailer(&self, metadata: Metadata, status: Status) {
        let _ = self.frames.send(Ok(Frame::Trailer { metadata, status }));
    }

    fn send_response(&self, response: TestResponse) {
        self.send_message(TestClientStream::encode_response(response).unwrap());
    }

    /// Next request message, or `None` once the client half-closed.
    async fn next_request(&mut self) -> Option<TestRequest> {
        match self.outbound.recv().await? {
            Outbound::Message(bytes) => Some(TestClientStream::decode_request(&bytes).unwrap()),
            Outbound::CloseSend => None,
        }
    }
}

fn mock_channel(half_duplex: bool) -> (Channel, MockServer) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let abort = AbortController::new();
    let opened = Arc::new(Mutex::new(Vec::new()));

    let server = MockServer {
        outbound: outbound_rx,
        frames: frames_tx,
        aborted: abort.signal(),
        opened: opened.clone(),
    };

    let transport = MockTransport {
        duplex: Mutex::new(Some(MockDuplex {
            outbound: outbound_tx,
            frames: tokio::sync::Mutex::new(frames_rx),
            abort,
            first_send: AbortController::new(),
            half_duplex,
        })),
        opened,
    };

    (Channel::new("http://mock.test/", transport), server)
}

fn metadata(key: &str, value: &str) -> Metadata {
    [(key, value)].into_iter().collect()
}

fn requests(
    ids: &[&str],
) -> impl Stream<Item = Result<TestRequest, io::Error>> + Send + 'static {
    let items: Vec<_> = ids.iter().map(|id| Ok(TestRequest::new(*id))).collect();
    stream::iter(items)
}

type Captured = Arc<Mutex<Option<Metadata>>>;

fn capture_metadata(options: CallOptions) -> (CallOptions, Captured, Captured) {
    let header: Captured = Arc::default();
    let trailer: Captured = Arc::default();
    let options = options
        .on_header({
            let header = header.clone();
            move |metadata| *header.lock().unwrap() = Some(metadata)
        })
        .on_trailer({
            let trailer = trailer.clone();
            move |metadata| *trailer.lock().unwrap() = Some(metadata)
        });
    (options, header, trailer)
}

fn first_value(captured: &Captured, key: &str) -> Option<String> {
    captured
        .lock()
        .unwrap()
        .as_ref()
        .and_then(|metadata| metadata.get_first(key).map(str::to_string))
}

/// Behaves like a server that joins every request id it receives.
async fn run_joining_server(mut server: MockServer) {
    server.send_header(metadata("test", "test-header"));

    let mut ids = Vec::new();
    while let Some(request) = server.next_request().await {
        ids.push(request.id);
    }

    server.send_response(TestResponse::new(ids.join(" ")));
    server.send_trailer(metadata("test", "test-trailer"), Status::ok());
}

// --- Unit Tests ---

#[tokio::test]
async fn sends_multiple_requests_and_receives_a_response() {
    for ids in [vec![], vec!["test-1"], vec!["test-1", "test-2"], vec!["a", "b", "c", "d", "e"]] {
        let (channel, server) = mock_channel(false);
        let server_task = tokio::spawn(run_joining_server(server));

        let (options, header, trailer) = capture_metadata(CallOptions::new());
        let response = TestClientStream::call(&channel, requests(&ids), options)
            .await
            .unwrap();

        assert_eq!(response, TestResponse::new(ids.join(" ")));
        assert_eq!(first_value(&header, "test").as_deref(), Some("test-header"));
        assert_eq!(first_value(&trailer, "test").as_deref(), Some("test-trailer"));

        server_task.await.unwrap();
    }
}

#[tokio::test]
async fn receives_an_error() {
    let (channel, mut server) = mock_channel(false);

    let server_task = tokio::spawn(async move {
        server.send_header(metadata("test", "test-header"));
        let first = server.next_request().await.unwrap();
        server.send_trailer(
            metadata("test", "test-trailer"),
            Status::new(StatusCode::NotFound, first.id),
        );
        server
    });

    let (options, header, trailer) = capture_metadata(CallOptions::new());
    let err = TestClientStream::call(&channel, requests(&["test-1", "test-2"]), options)
        .await
        .unwrap_err();

    assert_eq!(
        err.as_client_error(),
        Some(&ClientError::new(
            TestClientStream::METHOD_PATH,
            StatusCode::NotFound,
            "test-1"
        ))
    );
    assert_eq!(first_value(&header, "test").as_deref(), Some("test-header"));
    assert_eq!(first_value(&trailer, "test").as_deref(), Some("test-trailer"));

    let server = server_task.await.unwrap();
    // The duplex is released once the call settles.
    assert!(server.aborted.is_aborted());
}

#[tokio::test]
async fn receives_a_response_before_finishing_sending_request() {
    let (channel, server) = mock_channel(false);

    server.send_header(Metadata::new());
    server.send_response(TestResponse::new("test"));
    server.send_trailer(Metadata::new(), Status::ok());

    // The request stream never finishes on its own.
    let pending = stream::pending::<Result<TestRequest, io::Error>>();

    let response = timeout(
        Duration::from_secs(1),
        TestClientStream::call(&channel, pending, CallOptions::new()),
    )
    .await
    .expect("call should not wait for the request stream")
    .unwrap();

    assert_eq!(response, TestResponse::new("test"));
}

#[tokio::test]
async fn stops_reading_request_stream_on_response() {
    let (channel, server) = mock_channel(false);

    let (response_finish_tx, response_finish_rx) = oneshot::channel::<()>();
    let continued_reading = Arc::new(AtomicBool::new(false));
    let pulls = Arc::new(AtomicUsize::new(0));

    let request_stream = stream::unfold(
        (0, Some(response_finish_rx)),
        {
            let continued_reading = continued_reading.clone();
            let pulls = pulls.clone();
            move |(step, gate)| {
                let continued_reading = continued_reading.clone();
                pulls.fetch_add(1, Ordering::SeqCst);
                async move {
                    match step {
                        0 => {
                            if let Some(gate) = gate {
                                let _ = gate.await;
                            }
                            Some((Ok::<_, io::Error>(TestRequest::new("test")), (1, None)))
                        }
                        _ => {
                            continued_reading.store(true, Ordering::SeqCst);
                            None
                        }
                    }
                }
            }
        },
    );

    server.send_header(Metadata::new());
    server.send_response(TestResponse::new("test"));
    server.send_trailer(Metadata::new(), Status::ok());

    let response = TestClientStream::call(&channel, request_stream, CallOptions::new())
        .await
        .unwrap();
    assert_eq!(response, TestResponse::new("test"));

    let _ = response_finish_tx.send(());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!continued_reading.load(Ordering::SeqCst));
    assert!(pulls.load(Ordering::SeqCst) <= 1);
}

#[tokio::test]
async fn cancels_a_call() {
    let (channel, mut server) = mock_channel(false);

    let (server_started_tx, server_started_rx) = oneshot::channel::<()>();
    let server_task = tokio::spawn(async move {
        server.send_header(Metadata::new());
        let _first = server.next_request().await;
        let _ = server_started_tx.send(());

        timeout(Duration::from_secs(1), server.aborted.aborted())
            .await
            .is_ok()
    });

    let controller = AbortController::new();
    let (request_finish_tx, request_finish_rx) = oneshot::channel::<()>();

    // Yields one request, then waits.
    let request_stream = stream::once(async { Ok::<_, io::Error>(TestRequest::new("test")) })
        .chain(stream::once(async move {
            let _ = request_finish_rx.await;
            Ok(TestRequest::new("never"))
        }));

    let call = tokio::spawn({
        let channel = channel.clone();
        let options = CallOptions::new().with_signal(controller.signal());
        async move { TestClientStream::call(&channel, request_stream, options).await }
    });

    server_started_rx.await.unwrap();
    controller.abort();

    let err = call.await.unwrap().unwrap_err();
    assert!(err.is_abort(), "Expected abort, got {err}");
    let _ = request_finish_tx.send(());

    assert!(server_task.await.unwrap(), "server did not observe the abort");
}

#[tokio::test]
async fn already_aborted_signal_never_opens_transport() {
    let (channel, server) = mock_channel(false);

    let controller = AbortController::new();
    controller.abort();

    let (options, header, trailer) =
        capture_metadata(CallOptions::new().with_signal(controller.signal()));
    let err = TestClientStream::call(&channel, requests(&["test"]), options)
        .await
        .unwrap_err();

    assert!(err.is_abort());
    assert!(server.opened.lock().unwrap().is_empty());
    assert!(header.lock().unwrap().is_none());
    assert!(trailer.lock().unwrap().is_none());
}

#[derive(Debug, PartialEq)]
struct TestError(&'static str);

#[tokio::test]
async fn handles_request_stream_error() {
    let (channel, mut server) = mock_channel(false);

    let (server_started_tx, server_started_rx) = oneshot::channel::<()>();
    let server_task = tokio::spawn(async move {
        server.send_header(Metadata::new());
        let _first = server.next_request().await;
        let _ = server_started_tx.send(());
        timeout(Duration::from_secs(1), server.aborted.aborted())
            .await
            .is_ok()
    });

    let request_stream = stream::once(async { Ok(TestRequest::new("test-1")) }).chain(
        stream::once(async move {
            let _ = server_started_rx.await;
            Err(TestError("test"))
        }),
    );

    let (options, _header, trailer) = capture_metadata(CallOptions::new());
    let err = TestClientStream::call(&channel, request_stream, options)
        .await
        .unwrap_err();

    assert_eq!(err.into_request_error(), Some(TestError("test")));
    // No trailer was read, so the callback gets an empty one.
    assert_eq!(*trailer.lock().unwrap(), Some(Metadata::new()));
    assert!(server_task.await.unwrap(), "transport was not aborted");
}

#[tokio::test]
async fn receives_early_header() {
    let (channel, server) = mock_channel(false);

    let (end_tx, end_rx) = oneshot::channel::<()>();
    let server_task = tokio::spawn(async move {
        server.send_header(metadata("test", "test-value"));
        let _ = end_rx.await;
        run_joining_tail(server).await;
    });

    let (header_tx, header_rx) = oneshot::channel::<Metadata>();
    let (request_gate_tx, request_gate_rx) = oneshot::channel::<()>();

    // The request stream produces nothing until the header has been seen.
    let request_stream = stream::once(async move {
        let _ = request_gate_rx.await;
    })
    .flat_map(|_| requests(&["test-1", "test-2"]));

    let call = tokio::spawn({
        let channel = channel.clone();
        let options = CallOptions::new().on_header(move |header| {
            let _ = header_tx.send(header);
        });
        async move { TestClientStream::call(&channel, request_stream, options).await }
    });

    let header = timeout(Duration::from_secs(1), header_rx)
        .await
        .expect("header should arrive before any request is sent")
        .unwrap();
    assert_eq!(header.get_first("test"), Some("test-value"));

    let _ = request_gate_tx.send(());
    let _ = end_tx.send(());

    assert_eq!(
        call.await.unwrap().unwrap(),
        TestResponse::new("test-1 test-2")
    );
    server_task.await.unwrap();
}

async fn run_joining_tail(mut server: MockServer) {
    let mut ids = Vec::new();
    while let Some(request) = server.next_request().await {
        ids.push(request.id);
    }
    server.send_response(TestResponse::new(ids.join(" ")));
    server.send_trailer(Metadata::new(), Status::ok());
}

#[tokio::test]
async fn half_duplex_transport_does_not_deadlock() {
    let (channel, server) = mock_channel(true);
    let server_task = tokio::spawn(run_joining_server(server));

    let (options, header, trailer) = capture_metadata(CallOptions::new());
    let response = timeout(
        Duration::from_secs(1),
        TestClientStream::call(&channel, requests(&["test-1", "test-2"]), options),
    )
    .await
    .expect("half-duplex call deadlocked")
    .unwrap();

    assert_eq!(response, TestResponse::new("test-1 test-2"));
    assert_eq!(first_value(&header, "test").as_deref(), Some("test-header"));
    assert_eq!(first_value(&trailer, "test").as_deref(), Some("test-trailer"));
    server_task.await.unwrap();
}

#[tokio::test]
async fn request_metadata_and_url_reach_the_transport() {
    let (channel, server) = mock_channel(false);
    let opened = server.opened.clone();
    let server_task = tokio::spawn(run_joining_server(server));

    let options = CallOptions::new().with_metadata(metadata("authorization", "Bearer t"));
    TestClientStream::call(&channel, requests(&["x"]), options)
        .await
        .unwrap();
    server_task.await.unwrap();

    let opened = opened.lock().unwrap();
    assert_eq!(opened.len(), 1);
    assert_eq!(
        opened[0].url,
        "http://mock.test/grpcweb.test.Test/TestClientStream"
    );
    assert_eq!(opened[0].method_path, TestClientStream::METHOD_PATH);
    assert_eq!(
        opened[0].metadata.get_first("authorization"),
        Some("Bearer t")
    );
}

// --- Protocol violations and transport failures ---

async fn call_against_frames(
    frames: Vec<Result<Frame, TransportError>>,
    close_after: bool,
) -> (Result<TestResponse, CallError<io::Error>>, Captured) {
    let (channel, server) = mock_channel(false);
    for frame in frames {
        let _ = server.frames.send(frame);
    }
    // Holding the server keeps the response stream open.
    let _server = if close_after {
        drop(server);
        None
    } else {
        Some(server)
    };

    let (options, _header, trailer) = capture_metadata(CallOptions::new());
    let result = timeout(
        Duration::from_secs(1),
        TestClientStream::call(&channel, stream::pending(), options),
    )
    .await
    .expect("call did not settle");

    (result, trailer)
}

fn internal_details(result: &Result<TestResponse, CallError<io::Error>>) -> Option<&str> {
    match result {
        Err(CallError::Client(err)) if err.code == StatusCode::Internal => Some(&err.details),
        _ => None,
    }
}

#[tokio::test]
async fn ok_status_without_message_is_internal() {
    let (result, trailer) = call_against_frames(
        vec![
            Ok(Frame::Header(Metadata::new())),
            Ok(Frame::Trailer {
                metadata: metadata("k", "v"),
                status: Status::ok(),
            }),
        ],
        false,
    )
    .await;

    assert_eq!(internal_details(&result), Some("Missing response message"));
    // The trailer was read, so its callback still fires.
    assert_eq!(first_value(&trailer, "k").as_deref(), Some("v"));
}

#[tokio::test]
async fn more_than_one_message_is_internal() {
    let message = TestClientStream::encode_response(TestResponse::new("x")).unwrap();
    let (result, _) = call_against_frames(
        vec![
            Ok(Frame::Header(Metadata::new())),
            Ok(Frame::Message(message.clone())),
            Ok(Frame::Message(message)),
        ],
        false,
    )
    .await;

    assert_eq!(
        internal_details(&result),
        Some("Received more than one message from server for client streaming method")
    );
}

#[tokio::test]
async fn message_before_header_is_internal() {
    let message = TestClientStream::encode_response(TestResponse::new("x")).unwrap();
    let (result, _) = call_against_frames(vec![Ok(Frame::Message(message))], false).await;

    assert_eq!(internal_details(&result), Some("Received message before header"));
}

#[tokio::test]
async fn stream_closed_without_trailer_is_internal() {
    let (result, trailer) =
        call_against_frames(vec![Ok(Frame::Header(Metadata::new()))], true).await;

    assert_eq!(
        internal_details(&result),
        Some("Response stream closed without trailers")
    );
    assert_eq!(*trailer.lock().unwrap(), Some(Metadata::new()));
}

#[tokio::test]
async fn transport_failure_is_unavailable() {
    let (result, trailer) = call_against_frames(
        vec![Err(TransportError::Unavailable("connection refused".into()))],
        false,
    )
    .await;

    match result {
        Err(CallError::Client(err)) => {
            assert_eq!(err.code, StatusCode::Unavailable);
            assert_eq!(err.path, TestClientStream::METHOD_PATH);
        }
        other => panic!("expected UNAVAILABLE, got {other:?}"),
    }
    assert_eq!(*trailer.lock().unwrap(), Some(Metadata::new()));
}

/// Rejects empty response payloads.
struct StrictMethod;

impl ClientStreamingMethod for StrictMethod {
    const METHOD_PATH: &'static str = "/grpcweb.test.Test/Strict";

    type Request = Vec<u8>;
    type Response = Vec<u8>;

    fn encode_request(request: Self::Request) -> Result<Vec<u8>, io::Error> {
        Ok(request)
    }

    fn decode_request(bytes: &[u8]) -> Result<Self::Request, io::Error> {
        Ok(bytes.to_vec())
    }

    fn encode_response(response: Self::Response) -> Result<Vec<u8>, io::Error> {
        Ok(response)
    }

    fn decode_response(bytes: &[u8]) -> Result<Self::Response, io::Error> {
        if bytes.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "empty payload"));
        }
        Ok(bytes.to_vec())
    }
}

#[tokio::test]
async fn undecodable_response_is_internal() {
    let (channel, server) = mock_channel(false);
    server.send_header(Metadata::new());
    server.send_message(Vec::new());
    server.send_trailer(Metadata::new(), Status::ok());

    let err = channel
        .client_streaming::<StrictMethod, _, io::Error>(stream::pending(), CallOptions::new())
        .await
        .unwrap_err();

    let err = err.as_client_error().unwrap();
    assert_eq!(err.code, StatusCode::Internal);
    assert_eq!(err.path, StrictMethod::METHOD_PATH);
    assert_eq!(err.details, "Failed to decode response: empty payload");
}
