//! The client-streaming call driver.
//!
//! One call runs two activities against a single [`Duplex`]:
//!
//! - the **send pump** pulls request messages from the caller's stream and
//!   forwards them, then half-closes the duplex once the stream is exhausted;
//! - the **receive pump** reads `Header`, at most one `Message`, then
//!   `Trailer`, invoking the metadata callbacks and producing the outcome.
//!
//! Both are polled from the same future, so no extra task is spawned and the
//! driver stays runtime-agnostic. The receive pump fires an internal
//! [`AbortController`] as soon as it sees a terminal frame; the send pump
//! observes it at each suspension point and stops pulling from the request
//! stream. Neither pump waits on the other, which keeps half-duplex
//! transports (that hold back the header until a request has been flushed)
//! from deadlocking the call.

use crate::call_options::{CallOptions, MetadataCallback};
use crate::error::{AbortError, CallError, ClientError, TransportError};
use crate::error_mapper::{status_to_error, transport_error_to_call_error};
use crate::transport::{Duplex, Transport, TransportRequest};
use futures::future::{Either, select};
use futures::{FutureExt, Stream, StreamExt, pin_mut, select_biased};
use grpcweb::frame::Frame;
use grpcweb::{AbortController, AbortSignal, Metadata, StatusCode};
use std::io;
use std::pin::pin;

/// Lifecycle of a single call. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Init,
    Active,
    Completed,
    Failed,
    Aborted,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallState::Completed | CallState::Failed | CallState::Aborted
        )
    }

    fn settled<T, E>(outcome: &Result<T, CallError<E>>) -> Self {
        match outcome {
            Ok(_) => CallState::Completed,
            Err(CallError::Aborted(_)) => CallState::Aborted,
            Err(_) => CallState::Failed,
        }
    }
}

struct CallLifecycle<'a> {
    method_path: &'a str,
    state: CallState,
}

impl<'a> CallLifecycle<'a> {
    fn new(method_path: &'a str) -> Self {
        Self {
            method_path,
            state: CallState::Init,
        }
    }

    fn transition(&mut self, next: CallState) {
        if self.state.is_terminal() {
            tracing::warn!(
                "{}: ignoring transition {:?} -> {:?}",
                self.method_path,
                self.state,
                next
            );
            return;
        }

        tracing::trace!("{}: {:?} -> {:?}", self.method_path, self.state, next);
        self.state = next;
    }
}

/// How the send pump stopped.
enum SendExit<E> {
    /// Request stream exhausted and half-close signalled.
    Finished,
    /// The receive pump reached a terminal frame first.
    Abandoned,
    /// The duplex no longer accepts outbound messages.
    TransportClosed(TransportError),
    RequestFailed(E),
    EncodeFailed(io::Error),
}

/// Runs one client-streaming call to completion.
///
/// Opens exactly one duplex on `transport`, drives both pumps, and closes the
/// duplex before returning, whatever the outcome.
pub async fn execute<Req, Resp, S, E>(
    transport: &dyn Transport,
    url: String,
    method_path: &str,
    requests: S,
    options: CallOptions,
    encode: fn(Req) -> Result<Vec<u8>, io::Error>,
    decode: fn(&[u8]) -> Result<Resp, io::Error>,
) -> Result<Resp, CallError<E>>
where
    S: Stream<Item = Result<Req, E>>,
{
    let CallOptions {
        signal,
        metadata,
        on_header,
        mut on_trailer,
    } = options;

    let mut lifecycle = CallLifecycle::new(method_path);
    let signal = signal.unwrap_or_default();

    if signal.is_aborted() {
        lifecycle.transition(CallState::Aborted);
        return Err(CallError::Aborted(AbortError));
    }

    let duplex = transport.open(TransportRequest {
        url,
        method_path: method_path.to_string(),
        metadata,
    });
    lifecycle.transition(CallState::Active);

    let response_settled = AbortController::new();
    let settled_signal = response_settled.signal();

    let outcome = {
        let send = run_send_pump(&*duplex, requests, encode, &settled_signal).fuse();
        let receive = run_receive_pump(
            &*duplex,
            method_path,
            on_header,
            &mut on_trailer,
            &response_settled,
            decode,
        )
        .fuse();
        let aborted = signal.aborted().fuse();
        pin_mut!(send, receive, aborted);

        loop {
            select_biased! {
                () = aborted => {
                    tracing::debug!("{}: abort signal fired", method_path);
                    break Err(CallError::Aborted(AbortError));
                }
                result = receive => break result,
                exit = send => match exit {
                    SendExit::Finished => {
                        tracing::trace!("{}: request stream finished", method_path);
                    }
                    SendExit::Abandoned => {
                        tracing::trace!("{}: stopped reading request stream", method_path);
                    }
                    // The receive side reports why the duplex went away.
                    SendExit::TransportClosed(err) => {
                        tracing::debug!("{}: stopped sending: {}", method_path, err);
                    }
                    SendExit::RequestFailed(err) => {
                        tracing::debug!("{}: request stream failed", method_path);
                        break Err(CallError::Request(err));
                    }
                    SendExit::EncodeFailed(err) => {
                        break Err(CallError::Client(ClientError::new(
                            method_path,
                            StatusCode::Internal,
                            format!("Failed to encode request: {err}"),
                        )));
                    }
                },
            }
        }
    };

    // Both pumps are dropped at this point. After a trailer this only
    // releases the duplex; otherwise it tears the call down.
    duplex.abort();

    // A call that ended without reading a trailer still reports one, unless
    // it was cancelled.
    if !matches!(outcome, Err(CallError::Aborted(_))) {
        if let Some(callback) = on_trailer.take() {
            callback(Metadata::new());
        }
    }

    lifecycle.transition(CallState::settled(&outcome));
    outcome
}

async fn run_send_pump<Req, S, E>(
    duplex: &dyn Duplex,
    requests: S,
    encode: fn(Req) -> Result<Vec<u8>, io::Error>,
    response_settled: &AbortSignal,
) -> SendExit<E>
where
    S: Stream<Item = Result<Req, E>>,
{
    let mut requests = pin!(requests);
    let mut sent: usize = 0;

    loop {
        if response_settled.is_aborted() {
            return SendExit::Abandoned;
        }

        // Losing this race drops the pending pull, cancelling it.
        let next = match select(pin!(response_settled.aborted()), requests.next()).await {
            Either::Left(_) => return SendExit::Abandoned,
            Either::Right((next, _)) => next,
        };

        let request = match next {
            None => {
                tracing::trace!("request stream exhausted after {} messages", sent);
                return match duplex.close_send().await {
                    Ok(()) => SendExit::Finished,
                    Err(err) => SendExit::TransportClosed(err),
                };
            }
            Some(Err(err)) => return SendExit::RequestFailed(err),
            Some(Ok(request)) => request,
        };

        let message = match encode(request) {
            Ok(message) => message,
            Err(err) => return SendExit::EncodeFailed(err),
        };

        match select(pin!(response_settled.aborted()), duplex.send(message)).await {
            Either::Left(_) => return SendExit::Abandoned,
            Either::Right((Err(err), _)) => return SendExit::TransportClosed(err),
            Either::Right((Ok(()), _)) => sent += 1,
        }
    }
}

async fn run_receive_pump<Resp, E>(
    duplex: &dyn Duplex,
    method_path: &str,
    mut on_header: Option<MetadataCallback>,
    on_trailer: &mut Option<MetadataCallback>,
    response_settled: &AbortController,
    decode: fn(&[u8]) -> Result<Resp, io::Error>,
) -> Result<Resp, CallError<E>> {
    let violation = |details: &str| {
        CallError::Client(ClientError::new(method_path, StatusCode::Internal, details))
    };

    let mut header_received = false;
    let mut response: Option<Vec<u8>> = None;

    loop {
        let frame = match duplex.receive().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Err(violation("Response stream closed without trailers")),
            Err(err) => return Err(transport_error_to_call_error(method_path, err)),
        };

        tracing::trace!("{}: received {} frame", method_path, frame.kind_name());

        match frame {
            Frame::Header(metadata) => {
                if header_received {
                    return Err(violation("Received header more than once"));
                }
                header_received = true;

                if let Some(callback) = on_header.take() {
                    callback(metadata);
                }
            }
            Frame::Message(payload) => {
                if !header_received {
                    return Err(violation("Received message before header"));
                }
                if response.is_some() {
                    return Err(violation(
                        "Received more than one message from server for client streaming method",
                    ));
                }
                response = Some(payload);
                response_settled.abort();
            }
            Frame::Trailer { metadata, status } => {
                if !header_received {
                    return Err(violation("Received trailer before header"));
                }
                response_settled.abort();

                if let Some(callback) = on_trailer.take() {
                    callback(metadata);
                }

                if !status.is_ok() {
                    return Err(CallError::Client(status_to_error(method_path, &status)));
                }

                let payload = response.ok_or_else(|| violation("Missing response message"))?;

                return decode(&payload).map_err(|err| {
                    CallError::Client(ClientError::new(
                        method_path,
                        StatusCode::Internal,
                        format!("Failed to decode response: {err}"),
                    ))
                });
            }
        }
    }
}
