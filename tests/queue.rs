//! Integration tests for BoundedQueue backpressure and close semantics across threads.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use av_recorder::queue::{BoundedQueue, PushError, TryPushError};
use av_recorder::stats::AvStats;

#[test]
fn concurrent_producer_consumer_preserves_order() {
    let queue = Arc::new(BoundedQueue::new(4));

    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            for i in 0..1_000u32 {
                queue.push(i).unwrap();
            }
            queue.close();
        })
    };

    let mut received = Vec::new();
    while let Some(item) = queue.pop() {
        assert!(queue.size() <= queue.capacity(), "queue exceeded its capacity");
        received.push(item);
    }
    producer.join().unwrap();

    assert_eq!(received, (0..1_000).collect::<Vec<_>>());
}

#[test]
fn blocked_push_waits_for_space() {
    let queue = Arc::new(BoundedQueue::new(1));
    queue.push(1).unwrap();

    let pusher = {
        let queue = queue.clone();
        thread::spawn(move || queue.push(2))
    };

    thread::sleep(Duration::from_millis(50));
    assert_eq!(queue.size(), 1, "push must not enqueue past capacity");
    assert_eq!(queue.pop(), Some(1));

    pusher.join().unwrap().unwrap();
    assert_eq!(queue.pop(), Some(2));
}

#[test]
fn close_wakes_blocked_push_promptly() {
    let queue = Arc::new(BoundedQueue::new(1));
    queue.push(7).unwrap();

    let pusher = {
        let queue = queue.clone();
        thread::spawn(move || {
            let result = queue.push(8);
            (result, Instant::now())
        })
    };

    thread::sleep(Duration::from_millis(50));
    let closed_at = Instant::now();
    queue.close();

    let (result, woke_at) = pusher.join().unwrap();
    assert!(matches!(result, Err(PushError::Closed(8))));
    assert!(woke_at.duration_since(closed_at) < Duration::from_millis(100));

    // The item accepted before close is still delivered.
    assert_eq!(queue.pop(), Some(7));
    assert_eq!(queue.pop(), None);
}

#[test]
fn close_wakes_blocked_pop_promptly() {
    let queue: Arc<BoundedQueue<u8>> = Arc::new(BoundedQueue::new(2));

    let popper = {
        let queue = queue.clone();
        thread::spawn(move || (queue.pop(), Instant::now()))
    };

    thread::sleep(Duration::from_millis(50));
    let closed_at = Instant::now();
    queue.close();

    let (item, woke_at) = popper.join().unwrap();
    assert_eq!(item, None);
    assert!(woke_at.duration_since(closed_at) < Duration::from_millis(100));
}

#[test]
fn try_push_on_full_queue_counts_every_drop() {
    let queue = BoundedQueue::new(8);
    let stats = AvStats::new();
    for i in 0..8 {
        queue.try_push(i).unwrap();
    }

    let started = Instant::now();
    for i in 0..25 {
        match queue.try_push(100 + i) {
            Err(TryPushError::Full(item)) => {
                assert_eq!(item, 100 + i);
                stats.add_drops(1);
            }
            other => panic!("expected full, got {other:?}"),
        }
    }
    assert!(started.elapsed() < Duration::from_millis(100), "try_push must not block");

    assert_eq!(stats.take_window().drops, 25);
    assert_eq!(queue.size(), 8);
    assert_eq!(queue.pop(), Some(0));
}

#[test]
fn closed_queue_rejects_everything() {
    let queue = BoundedQueue::new(4);
    queue.push("a").unwrap();
    queue.close();
    queue.close();

    assert!(matches!(queue.push("b"), Err(PushError::Closed("b"))));
    assert!(matches!(queue.try_push("c"), Err(TryPushError::Closed("c"))));
    assert_eq!(queue.pop(), Some("a"));
    assert_eq!(queue.pop(), None);
    assert_eq!(queue.pop(), None);
}
