//! End-to-end scenarios for merging and batching.

mod common;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tributary_core::stream::{self, BatchConfig, Merged};

use common::{channels, init_tracing};

#[tokio::test]
async fn merge_zero_inputs() {
    init_tracing();
    let Merged { mut output, cancel } = stream::merge::<u32>(Vec::new());

    cancel.cancel().await;
    assert_eq!(output.recv().await, None);
    assert_eq!(cancel.forwarder_count(), 0);
}

#[tokio::test]
async fn merge_identity() {
    init_tracing();
    let (tx, rx) = mpsc::channel(4);
    let (mut output, cancel) = stream::merge(vec![rx]).into_parts();

    tokio::spawn(async move {
        for i in [1, 2, 3] {
            tx.send(i).await.unwrap();
        }
    });

    let mut seen = Vec::new();
    while let Some(item) = output.recv().await {
        seen.push(item);
    }
    assert_eq!(seen, vec![1, 2, 3]);

    cancel.cancel().await;
    assert!(!cancel.is_cancelled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn merge_many_with_cancel() {
    init_tracing();
    let (senders, receivers) = channels::<(usize, u64)>(5, 1);
    let (mut output, cancel) = stream::merge(receivers).into_parts();

    for (id, tx) in senders.into_iter().enumerate() {
        tokio::spawn(async move {
            let mut n = 0;
            while tx.send((id, n)).await.is_ok() {
                n += 1;
            }
        });
    }

    for _ in 0..10 {
        assert!(output.recv().await.is_some());
    }

    tokio::time::timeout(Duration::from_secs(5), cancel.cancel())
        .await
        .expect("cancel returns within bounded time");

    assert_eq!(output.recv().await, None);
    assert!(output.is_cancelled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn merge_wide_fan_in_delivers_everything_in_input_order() {
    init_tracing();
    let inputs = 57;
    let per_input = 40u32;
    let (senders, receivers) = channels(inputs, 2);
    let (mut output, _cancel) = stream::merge(receivers).into_parts();

    for (id, tx) in senders.into_iter().enumerate() {
        tokio::spawn(async move {
            for n in 0..per_input {
                tx.send((id, n)).await.unwrap();
            }
        });
    }

    let mut next = vec![0u32; inputs];
    let mut total = 0;
    while let Some((id, n)) = output.recv().await {
        assert_eq!(n, next[id], "input {id} out of order");
        next[id] += 1;
        total += 1;
    }
    assert_eq!(total, inputs * per_input as usize);
}

#[tokio::test]
async fn batch_defaults() {
    init_tracing();
    let input = futures::stream::iter(1..=200u32);
    let mut batches = stream::batch(input, BatchConfig::default());

    let mut sizes = Vec::new();
    let mut all = Vec::new();
    while let Some(batch) = batches.recv().await {
        sizes.push(batch.len());
        all.extend(batch);
    }
    assert_eq!(sizes, vec![64, 64, 64, 8]);
    assert_eq!(all, (1..=200).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn batch_slow_upstream_full_batch() {
    init_tracing();
    let (tx, rx) = mpsc::channel(1);
    let config = BatchConfig::builder()
        .size(5)
        .wait_limit(Duration::from_secs(60))
        .build();
    let mut batches = stream::batch(ReceiverStream::new(rx), config);
    let start = Instant::now();

    let producer = tokio::spawn(async move {
        for i in 0..5u32 {
            tx.send(i).await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        tokio::time::sleep(Duration::from_secs(60)).await;
        tx
    });

    let first = batches.recv().await.unwrap();
    assert_eq!(first, vec![0, 1, 2, 3, 4]);
    assert!(start.elapsed() <= Duration::from_secs(100));

    // Silence afterwards produces nothing.
    let silent = tokio::time::timeout(Duration::from_secs(300), batches.recv()).await;
    assert!(silent.is_err());

    drop(producer.await.unwrap());
    assert_eq!(batches.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn batch_slow_upstream_partial_batch() {
    init_tracing();
    let (tx, rx) = mpsc::channel(1);
    let config = BatchConfig::builder()
        .size(5)
        .wait_limit(Duration::from_secs(60))
        .build();
    let mut batches = stream::batch(ReceiverStream::new(rx), config);
    let start = Instant::now();

    for i in 0..3u32 {
        tx.send(i).await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    }

    let partial = batches.recv().await.unwrap();
    assert_eq!(partial, vec![0, 1, 2]);
    // Last item at t=20s, flushed one wait limit later.
    assert!(start.elapsed() >= Duration::from_secs(80));
    assert!(start.elapsed() < Duration::from_secs(81));

    drop(tx);
    assert_eq!(batches.recv().await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn merge_then_batch() {
    init_tracing();
    let (senders, receivers) = channels(12, 4);
    let (output, _cancel) = stream::merge(receivers).into_parts();
    let mut batches = stream::batch(output, BatchConfig::with_size(7));

    for (id, tx) in senders.into_iter().enumerate() {
        tokio::spawn(async move {
            for n in 0..25u32 {
                tx.send((id, n)).await.unwrap();
            }
        });
    }

    let mut total = 0;
    while let Some(batch) = batches.recv().await {
        assert!(!batch.is_empty() && batch.len() <= 7);
        total += batch.len();
    }
    assert_eq!(total, 12 * 25);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_then_merge() {
    init_tracing();
    let (senders, receivers) = channels(4, 4);
    let batched: Vec<_> = receivers
        .into_iter()
        .map(|rx| stream::batch(ReceiverStream::new(rx), BatchConfig::with_size(3)))
        .collect();
    let (mut output, _cancel) = stream::merge(batched).into_parts();

    for tx in senders {
        tokio::spawn(async move {
            for n in 0..10u32 {
                tx.send(n).await.unwrap();
            }
        });
    }

    let mut per_source_items = 0;
    let mut batches = 0;
    while let Some(batch) = output.recv().await {
        assert!(!batch.is_empty() && batch.len() <= 3);
        per_source_items += batch.len();
        batches += 1;
    }
    assert_eq!(per_source_items, 40);
    // 10 items in batches of 3 is 4 batches per source.
    assert_eq!(batches, 16);
}
