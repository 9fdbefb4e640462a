use grpcweb::{AbortController, AbortSignal};
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn waiters_wake_on_abort() {
    let controller = AbortController::new();
    let signal = controller.signal();

    let waiter = tokio::spawn(async move {
        signal.aborted().await;
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    controller.abort();

    timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter was not woken")
        .unwrap();
}

#[tokio::test]
async fn already_aborted_signal_resolves_immediately() {
    let controller = AbortController::new();
    controller.abort();
    controller.abort();

    assert!(controller.is_aborted());
    timeout(Duration::from_millis(100), controller.signal().aborted())
        .await
        .expect("aborted() should resolve at once");
}

#[tokio::test]
async fn default_signal_never_fires() {
    let signal = AbortSignal::default();
    assert!(!signal.is_aborted());
    assert!(
        timeout(Duration::from_millis(50), signal.aborted())
            .await
            .is_err()
    );
}
