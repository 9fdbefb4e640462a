use grpcweb::frame::Frame;
use grpcweb::{AbortController, AbortSignal};
use grpcweb_caller::{Duplex, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};

/// Capacity of the outbound queue between a call and its I/O task. Bounds how
/// far the send pump can run ahead of the network.
pub(crate) const OUTBOUND_CAPACITY: usize = 16;

#[derive(Debug)]
pub(crate) enum Outbound {
    Message(Vec<u8>),
    CloseSend,
}

/// A [`Duplex`] backed by a background I/O task.
///
/// Outbound messages go through a bounded queue, response frames come back
/// through an unbounded one. Aborting (or dropping) the duplex fires a signal
/// the task watches, so the task tears its connection down.
pub(crate) struct ChannelDuplex {
    outbound: mpsc::Sender<Outbound>,
    inbound: Mutex<mpsc::UnboundedReceiver<Result<Frame, TransportError>>>,
    abort: AbortController,
    send_closed: AtomicBool,
}

/// The I/O task's end of a [`ChannelDuplex`].
pub(crate) struct DuplexTask {
    pub outbound: mpsc::Receiver<Outbound>,
    pub inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    pub aborted: AbortSignal,
}

pub(crate) fn channel_duplex() -> (ChannelDuplex, DuplexTask) {
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let abort = AbortController::new();

    let task = DuplexTask {
        outbound: outbound_rx,
        inbound: inbound_tx,
        aborted: abort.signal(),
    };

    let duplex = ChannelDuplex {
        outbound: outbound_tx,
        inbound: Mutex::new(inbound_rx),
        abort,
        send_closed: AtomicBool::new(false),
    };

    (duplex, task)
}

impl ChannelDuplex {
    async fn enqueue(&self, item: Outbound) -> Result<(), TransportError> {
        let aborted = self.abort.signal();
        if aborted.is_aborted() {
            return Err(TransportError::Aborted);
        }

        tokio::select! {
            biased;
            _ = aborted.aborted() => Err(TransportError::Aborted),
            sent = self.outbound.send(item) => sent
                .map_err(|_| TransportError::Unavailable("connection closed".into())),
        }
    }
}

#[async_trait::async_trait]
impl Duplex for ChannelDuplex {
    async fn send(&self, message: Vec<u8>) -> Result<(), TransportError> {
        if self.send_closed.load(Ordering::SeqCst) {
            return Err(TransportError::Protocol("send after close_send".into()));
        }
        self.enqueue(Outbound::Message(message)).await
    }

    async fn close_send(&self) -> Result<(), TransportError> {
        if self.send_closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.enqueue(Outbound::CloseSend).await
    }

    async fn receive(&self) -> Result<Option<Frame>, TransportError> {
        let aborted = self.abort.signal();
        if aborted.is_aborted() {
            return Err(TransportError::Aborted);
        }

        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            biased;
            _ = aborted.aborted() => Err(TransportError::Aborted),
            frame = inbound.recv() => frame.transpose(),
        }
    }

    fn abort(&self) {
        self.abort.abort();
    }
}

impl Drop for ChannelDuplex {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grpcweb::Metadata;

    #[tokio::test]
    async fn frames_flow_until_the_task_hangs_up() {
        let (duplex, task) = channel_duplex();

        task.inbound
            .send(Ok(Frame::Header(Metadata::new())))
            .unwrap();
        drop(task);

        assert_eq!(
            duplex.receive().await,
            Ok(Some(Frame::Header(Metadata::new())))
        );
        assert_eq!(duplex.receive().await, Ok(None));
    }

    #[tokio::test]
    async fn abort_unblocks_pending_receive() {
        let (duplex, task) = channel_duplex();

        let receive = duplex.receive();
        duplex.abort();

        assert_eq!(receive.await, Err(TransportError::Aborted));
        assert!(task.aborted.is_aborted());
        assert_eq!(
            duplex.send(b"late".to_vec()).await,
            Err(TransportError::Aborted)
        );
    }

    #[tokio::test]
    async fn close_send_is_idempotent() {
        let (duplex, mut task) = channel_duplex();

        duplex.send(b"one".to_vec()).await.unwrap();
        duplex.close_send().await.unwrap();
        duplex.close_send().await.unwrap();

        assert!(matches!(task.outbound.recv().await, Some(Outbound::Message(m)) if m == b"one"));
        assert!(matches!(task.outbound.recv().await, Some(Outbound::CloseSend)));
        assert!(task.outbound.try_recv().is_err());
    }
}
