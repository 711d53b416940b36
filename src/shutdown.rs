//! Cooperative cancellation shared by every pipeline role.
//!
//! A [`Shutdown`] is a cheap cloneable handle to one cancellation flag. The first call to
//! [`Shutdown::request`] flips the flag and closes every registered queue, which is how
//! threads blocked inside `push`/`pop` find out they have to unwind. Later calls are
//! no-ops, however many threads race to make them.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{info, warn};
use parking_lot::{Condvar, Mutex};

use crate::queue::Close;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to install Ctrl-C handler: {0}")]
    CtrlC(#[from] ctrlc::Error),
    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

struct Inner {
    requested: AtomicBool,
    closers: Mutex<Vec<Arc<dyn Close>>>,
    wake_lock: Mutex<()>,
    wake: Condvar,
}

/// Handle to the process-wide cancellation flag. Clones share the same flag.
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

impl Shutdown {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                requested: AtomicBool::new(false),
                closers: Mutex::new(Vec::new()),
                wake_lock: Mutex::new(()),
                wake: Condvar::new(),
            }),
        }
    }

    /// Registers a resource to close when shutdown is requested.
    ///
    /// If shutdown already happened the resource is closed right away.
    #[inline]
    pub fn register(&self, closer: Arc<dyn Close>) {
        let mut closers = self.inner.closers.lock();
        if self.is_requested() {
            drop(closers);
            closer.close();
            return;
        }
        closers.push(closer);
    }

    /// Requests shutdown. Returns `true` only for the call that actually triggered it.
    ///
    /// The first caller closes every registered resource and wakes every thread waiting in
    /// [`wait_timeout`](Self::wait_timeout). Safe to call from any thread, any number of times.
    #[inline]
    pub fn request(&self) -> bool {
        if self.inner.requested.swap(true, Ordering::AcqRel) {
            return false;
        }

        let closers = std::mem::take(&mut *self.inner.closers.lock());
        for closer in &closers {
            closer.close();
        }

        let _guard = self.inner.wake_lock.lock();
        self.inner.wake.notify_all();

        true
    }

    #[must_use]
    #[inline]
    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }

    /// Sleeps up to `timeout`, returning early when shutdown is requested.
    ///
    /// Returns `true` if shutdown has been requested.
    #[inline]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self.inner.wake_lock.lock();

        while !self.is_requested() {
            match deadline {
                Some(deadline) => {
                    if self.inner.wake.wait_until(&mut guard, deadline).timed_out() {
                        break;
                    }
                }
                // Too far out to represent, so it never expires.
                None => self.inner.wake.wait(&mut guard),
            }
        }

        self.is_requested()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown").field("requested", &self.is_requested()).finish()
    }
}

/// Routes SIGINT/SIGTERM into [`Shutdown::request`].
///
/// The handler runs on a dedicated thread owned by `ctrlc`, not in signal context, so the
/// queue closes it triggers are ordinary lock operations. Can only be installed once per
/// process.
#[inline]
pub fn listen_for_ctrl_c(shutdown: &Shutdown) -> Result<(), Error> {
    let shutdown = shutdown.clone();
    ctrlc::set_handler(move || {
        if shutdown.request() {
            warn!("[signal] caught interrupt, stopping...");
        }
    })?;

    Ok(())
}

/// Spawns the duration timer: requests shutdown once `duration` has elapsed, or exits
/// early if shutdown happens first.
#[inline]
pub fn spawn_timer(shutdown: &Shutdown, duration: Duration) -> Result<JoinHandle<()>, Error> {
    let shutdown = shutdown.clone();
    let handle = thread::Builder::new().name(String::from("timer")).spawn(move || {
        if !shutdown.wait_timeout(duration) && shutdown.request() {
            info!("[timer] reached {:.1} sec, stopping...", duration.as_secs_f64());
        }
    })?;

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::queue::BoundedQueue;

    struct CountingCloser(AtomicUsize);

    impl Close for CountingCloser {
        fn close(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn request_closes_registered_queues_once() {
        let shutdown = Shutdown::new();
        let queue = Arc::new(BoundedQueue::<u8>::new(4));
        let counter = Arc::new(CountingCloser(AtomicUsize::new(0)));
        shutdown.register(queue.clone());
        shutdown.register(counter.clone());

        assert!(shutdown.request());
        assert!(!shutdown.request());
        assert!(queue.is_closed());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_registration_is_closed_immediately() {
        let shutdown = Shutdown::new();
        shutdown.request();

        let queue = Arc::new(BoundedQueue::<u8>::new(4));
        shutdown.register(queue.clone());
        assert!(queue.is_closed());
    }

    #[test]
    fn wait_timeout_returns_early_on_request() {
        let shutdown = Shutdown::new();
        let waiter = thread::spawn({
            let shutdown = shutdown.clone();
            move || {
                let started = Instant::now();
                (shutdown.wait_timeout(Duration::from_secs(10)), started.elapsed())
            }
        });

        thread::sleep(Duration::from_millis(20));
        shutdown.request();

        let (requested, waited) = waiter.join().unwrap();
        assert!(requested);
        assert!(waited < Duration::from_secs(1));
    }

    #[test]
    fn wait_timeout_expires_without_request() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn unrepresentable_timeout_waits_for_request() {
        let shutdown = Shutdown::new();
        let waiter = thread::spawn({
            let shutdown = shutdown.clone();
            move || shutdown.wait_timeout(Duration::MAX)
        });
        let timer = spawn_timer(&shutdown, Duration::MAX).unwrap();

        thread::sleep(Duration::from_millis(20));
        assert!(!shutdown.is_requested());
        assert!(shutdown.request());
        assert!(waiter.join().unwrap());
        timer.join().unwrap();
    }

    #[test]
    fn timer_requests_shutdown() {
        let shutdown = Shutdown::new();
        let timer = spawn_timer(&shutdown, Duration::from_millis(10)).unwrap();
        timer.join().unwrap();
        assert!(shutdown.is_requested());
    }
}
