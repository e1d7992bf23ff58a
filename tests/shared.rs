use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use hardworker::worker::BoxError;
use hardworker::{Capabilities, Config, HardWorker, WorkerError, WorkerScope};
use tokio::sync::mpsc;

fn host(cpus: usize) -> Capabilities {
    Capabilities::new(false, Some(cpus))
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for worker")
        .expect("channel closed")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shared_worker_is_created_once() {
    let starts = Arc::new(AtomicUsize::new(0));
    let mut pool = HardWorker::with_capabilities(Config::new(), host(2));
    let counter = Arc::clone(&starts);
    pool.attach(move |mut scope: WorkerScope<u32, u32>| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            while let Some(n) = scope.recv().await {
                scope.post_message(n + 1);
            }
            Ok::<_, BoxError>(())
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    pool.on_message(move |n| {
        let _ = tx.send(n);
    })
    .unwrap();
    pool.on_error(|_| {}).unwrap();
    pool.post_message(1).unwrap();
    pool.post_message(2).unwrap();

    assert_eq!(recv(&mut rx).await, 2);
    assert_eq!(recv(&mut rx).await, 3);
    assert_eq!(starts.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn later_callback_replaces_earlier() {
    let mut pool = HardWorker::with_capabilities(Config::new(), host(2));
    pool.attach(|mut scope: WorkerScope<&'static str, String>| async move {
        while let Some(text) = scope.recv().await {
            scope.post_message(text.to_uppercase());
        }
        Ok::<_, BoxError>(())
    });

    let (first_tx, mut first_rx) = mpsc::unbounded_channel();
    let (second_tx, mut second_rx) = mpsc::unbounded_channel();
    pool.on_message(move |s| {
        let _ = first_tx.send(s);
    })
    .unwrap();
    pool.post_message("a").unwrap();
    assert_eq!(recv(&mut first_rx).await, "A");

    pool.on_message(move |s| {
        let _ = second_tx.send(s);
    })
    .unwrap();
    pool.post_message("b").unwrap();
    assert_eq!(recv(&mut second_rx).await, "B");
    assert!(first_rx.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shared_worker_errors_reach_callback() {
    let mut pool = HardWorker::with_capabilities(Config::new(), host(2));
    pool.attach(|mut scope: WorkerScope<u32, u32>| async move {
        while let Some(n) = scope.recv().await {
            if n == 0 {
                scope.post_error("zero is not allowed");
            } else {
                scope.post_message(100 / n);
            }
        }
        Ok::<_, BoxError>(())
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    pool.on_error(move |error: &WorkerError| {
        let _ = tx.send(error.clone());
    })
    .unwrap();
    pool.post_message(0).unwrap();

    match recv(&mut rx).await {
        WorkerError::Script { message, .. } => assert_eq!(message, "zero is not allowed"),
        other => panic!("unexpected error: {other:?}"),
    }
}

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn terminate_prefers_shared_worker() {
    let stopped = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));
    let mut pool = HardWorker::with_capabilities(Config::new(), host(2));
    let (drops, messages) = (Arc::clone(&stopped), Arc::clone(&handled));
    pool.attach(move |mut scope: WorkerScope<Vec<u32>, u32>| {
        let guard = DropCounter(Arc::clone(&drops));
        let messages = Arc::clone(&messages);
        async move {
            let _guard = guard;
            while let Some(chunk) = scope.recv().await {
                messages.fetch_add(1, Ordering::SeqCst);
                scope.post_message(chunk.iter().sum());
            }
            Ok::<_, BoxError>(())
        }
    });

    let sums = pool.post_array(&[1, 2, 3, 4]).await.unwrap();
    assert_eq!(sums, vec![3, 7]);
    assert_eq!(pool.worker_count(), 2);

    pool.post_message(vec![5]).unwrap();
    assert!(pool.terminate());

    // Only the shared worker stops; both batch workers are still waiting
    // for their next message.
    tokio::time::timeout(Duration::from_secs(5), async {
        while stopped.load(Ordering::SeqCst) < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
    assert!(handled.load(Ordering::SeqCst) >= 2);

    assert!(pool.terminate());
}
