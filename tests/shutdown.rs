//! Integration tests for the shutdown controller under concurrent requests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use av_recorder::queue::{BoundedQueue, Close};
use av_recorder::shutdown::{self, Shutdown};

#[derive(Default)]
struct CloseCounter(AtomicUsize);

impl Close for CloseCounter {
    fn close(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn racing_requests_broadcast_close_once() {
    let shutdown = Shutdown::new();
    let counter = Arc::new(CloseCounter::default());
    let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(8));
    shutdown.register(counter.clone());
    shutdown.register(queue.clone());

    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let (shutdown, barrier) = (shutdown.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                shutdown.request()
            })
        })
        .collect();

    let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|&first| first).count();

    assert_eq!(winners, 1, "exactly one request must win");
    assert_eq!(counter.0.load(Ordering::SeqCst), 1, "close must be broadcast once");
    assert!(queue.is_closed());
    assert!(shutdown.is_requested());
}

#[test]
fn request_unblocks_consumers_of_every_queue() {
    let shutdown = Shutdown::new();
    let queues: Vec<Arc<BoundedQueue<u8>>> = (0..3).map(|_| Arc::new(BoundedQueue::new(4))).collect();
    for queue in &queues {
        shutdown.register(queue.clone());
    }

    let consumers: Vec<_> = queues
        .iter()
        .map(|queue| {
            let queue = queue.clone();
            thread::spawn(move || queue.pop())
        })
        .collect();

    thread::sleep(Duration::from_millis(30));
    shutdown.request();

    for consumer in consumers {
        assert_eq!(consumer.join().unwrap(), None);
    }
}

#[test]
fn timer_stops_early_when_shutdown_wins() {
    let shutdown = Shutdown::new();
    let started = Instant::now();
    let timer = shutdown::spawn_timer(&shutdown, Duration::from_secs(30)).unwrap();

    thread::sleep(Duration::from_millis(20));
    assert!(shutdown.request());
    timer.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
}
