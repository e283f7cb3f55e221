//! Ordering, deduplication and bounding guarantees of the prefetcher.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::SlowFactory;
use tokio_test::assert_err;
use vframe_worker::{PrefetchConfig, Prefetcher, WorkerError};

async fn consume_all(prefetcher: &Prefetcher, sequence: &[u64]) -> Vec<u64> {
    let mut delivered = Vec::with_capacity(sequence.len());
    for &index in sequence {
        let frame = prefetcher.get(index).await.unwrap();
        assert_eq!(frame.metadata.get_u64("index"), Some(index));
        delivered.push(frame.index);
    }
    delivered
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_delivers_in_sequence_order_under_random_delays() {
    let factory = Arc::new(SlowFactory::new(15));
    let sequence: Vec<u64> = (0..40).collect();

    let prefetcher =
        Prefetcher::new(factory.clone(), sequence.clone(), PrefetchConfig::new(6, 3)).unwrap();
    let delivered = consume_all(&prefetcher, &sequence).await;

    assert_eq!(delivered, sequence);
    assert_eq!(factory.probe.duplicate_entries(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_non_monotonic_sequence_with_duplicates() {
    let factory = Arc::new(SlowFactory::new(10));
    let sequence = vec![7, 3, 3, 9, 1, 3, 7, 7, 2, 0, 9];

    let prefetcher =
        Prefetcher::new(factory.clone(), sequence.clone(), PrefetchConfig::new(4, 4)).unwrap();
    let delivered = consume_all(&prefetcher, &sequence).await;

    assert_eq!(delivered, sequence);
    // The same index never runs twice at once, even when it repeats.
    assert_eq!(factory.probe.duplicate_entries(), 0);
    // Each occurrence is delivered from its own run.
    assert_eq!(factory.probe.entered().len(), sequence.len());
    assert_eq!(factory.probe.entries_for(3), 3);
    assert_eq!(factory.probe.entries_for(7), 3);
    assert_eq!(factory.probe.entries_for(9), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_limit_is_respected() {
    let factory = Arc::new(SlowFactory::new(20));
    let sequence: Vec<u64> = (0..30).collect();

    let prefetcher =
        Prefetcher::new(factory.clone(), sequence.clone(), PrefetchConfig::new(10, 2)).unwrap();
    consume_all(&prefetcher, &sequence).await;

    assert!(factory.probe.max_running() <= 2);
    assert!(factory.probe.max_running() >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_buffer_never_exceeds_window() {
    let factory = Arc::new(SlowFactory::new(3));
    let sequence: Vec<u64> = (0..25).collect();
    let buffer_size = 4;

    let prefetcher = Prefetcher::new(
        factory.clone(),
        sequence.clone(),
        PrefetchConfig::new(buffer_size, 8),
    )
    .unwrap();

    for &index in &sequence {
        // Let the workers run ahead of a slow consumer.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let stats = prefetcher.stats();
        assert!(
            stats.buffered + stats.in_flight <= buffer_size,
            "window overflow: {:?}",
            stats
        );
        prefetcher.get(index).await.unwrap();
    }

    let stats = prefetcher.stats();
    assert_eq!(stats.position, sequence.len());
    assert_eq!(stats.launched, sequence.len() as u64);
    // Workers never start more than the window allows ahead of the consumer.
    assert!(factory.probe.max_running() <= buffer_size);
}

#[tokio::test]
async fn test_nothing_launched_beyond_window() {
    let factory = Arc::new(SlowFactory::new(0));
    let sequence: Vec<u64> = (0..10).collect();

    let prefetcher =
        Prefetcher::new(factory.clone(), sequence.clone(), PrefetchConfig::new(3, 3)).unwrap();
    assert_eq!(prefetcher.stats().launched, 3);

    prefetcher.get(0).await.unwrap();
    assert_eq!(prefetcher.stats().launched, 4);
}

#[tokio::test]
async fn test_out_of_order_get_is_rejected() {
    let factory = Arc::new(SlowFactory::new(0));
    let prefetcher = Prefetcher::new(factory, vec![5, 6, 7], PrefetchConfig::new(2, 2)).unwrap();

    match prefetcher.get(6).await {
        Err(WorkerError::OutOfOrder {
            requested,
            expected,
        }) => {
            assert_eq!(requested, 6);
            assert_eq!(expected, 5);
        }
        other => panic!("expected OutOfOrder, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failure_is_reported_then_retried_on_request() {
    let factory = Arc::new(SlowFactory::new(0).failing_once(&[2]));
    let sequence: Vec<u64> = (0..5).collect();

    let prefetcher =
        Prefetcher::new(factory.clone(), sequence.clone(), PrefetchConfig::new(3, 2)).unwrap();

    prefetcher.get(0).await.unwrap();
    prefetcher.get(1).await.unwrap();

    let err = assert_err!(prefetcher.get(2).await);
    assert!(matches!(err, WorkerError::InvalidState { index: 2, .. }));
    assert_eq!(prefetcher.stats().position, 2);

    // No automatic retry: the failed index ran once until asked for again.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(factory.probe.entries_for(2), 1);

    let frame = prefetcher.get(2).await.unwrap();
    assert_eq!(frame.index, 2);
    assert_eq!(factory.probe.entries_for(2), 2);

    prefetcher.get(3).await.unwrap();
    prefetcher.get(4).await.unwrap();
}

#[tokio::test]
async fn test_close_wakes_pending_consumer() {
    let factory = Arc::new(SlowFactory::fixed(5_000));
    let prefetcher = Prefetcher::new(factory, vec![1, 2], PrefetchConfig::new(1, 1)).unwrap();

    let (result, _) = tokio::join!(prefetcher.get(1), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        prefetcher.close();
    });

    assert!(matches!(result, Err(WorkerError::Closed)));
    assert!(matches!(prefetcher.get(1).await, Err(WorkerError::Closed)));
    assert_eq!(prefetcher.stats().in_flight, 0);
}
