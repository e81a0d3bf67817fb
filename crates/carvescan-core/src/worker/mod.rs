/// Single-task background worker with cooperative cancellation.
///
/// Each scan coordinator owns one `CancellableWorker`: exactly one task
/// runs at a time on a dedicated, named thread, a second `run` while busy
/// fails fast with [`ScanError::Busy`], and the initiator can wait for a
/// cancellation request to take effect without blocking its own event
/// loop.
///
/// # Stopping
///
/// [`CancellableWorker::stop_with`] sets the cancel flag and waits on a
/// condition variable (never a busy spin) for the task to drain. If the
/// task has not honored cancellation within the wait, the wait doubles
/// and a host-supplied `keep_waiting` query decides whether to keep
/// going; declining makes `stop_with` return `false` with the task still
/// running. Stopping an idle worker returns `true` immediately.
use crate::error::ScanError;
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Initial wait before the first backoff doubling when stopping a worker.
pub const DEFAULT_STOP_WAIT: Duration = Duration::from_secs(3);

/// Cooperative cancellation flag handed to the running task.
///
/// Tasks check it at their unit boundaries (per file, per block, per
/// stream); nothing is forcibly interrupted.
#[derive(Clone, Debug)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn set(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}

/// Final outcome of one worker run, delivered to the `on_complete`
/// callback exactly once per run.
///
/// A task error is captured here rather than thrown across the thread
/// boundary. `cancelled` is set when the task returned cleanly after a
/// cancellation request; an error takes precedence over the flag.
#[derive(Debug)]
pub struct Completion {
    pub error: Option<ScanError>,
    pub cancelled: bool,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.cancelled
    }
}

/// Busy state plus the condition variable `stop_with` waits on.
struct BusyLatch {
    busy: Mutex<bool>,
    idle: Condvar,
}

impl BusyLatch {
    fn new() -> Self {
        Self {
            busy: Mutex::new(false),
            idle: Condvar::new(),
        }
    }

    /// Atomically claim the worker. Returns `false` if already claimed.
    fn claim(&self) -> bool {
        let mut busy = self.busy.lock();
        if *busy {
            false
        } else {
            *busy = true;
            true
        }
    }

    fn release(&self) {
        let mut busy = self.busy.lock();
        *busy = false;
        self.idle.notify_all();
    }

    fn is_busy(&self) -> bool {
        *self.busy.lock()
    }

    /// Wait up to `timeout` for the worker to go idle.
    fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut busy = self.busy.lock();
        while *busy {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.idle.wait_for(&mut busy, deadline - now);
        }
        true
    }
}

/// Releases the latch when the task ends, panicking or not, so `stop`
/// can never wedge on a dead thread.
struct BusyGuard(Arc<BusyLatch>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// See the module docs.
pub struct CancellableWorker {
    name: &'static str,
    cancel: CancelToken,
    latch: Arc<BusyLatch>,
    thread: Option<thread::JoinHandle<()>>,
}

impl CancellableWorker {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            cancel: CancelToken::new(),
            latch: Arc::new(BusyLatch::new()),
            thread: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.latch.is_busy()
    }

    /// A clone of this worker's cancellation token, for callers that
    /// drive walk logic in-line rather than through [`Self::run`].
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Start `task` on the worker thread.
    ///
    /// Fails fast with [`ScanError::Busy`] if a task is already running.
    /// The task's result (and whether cancellation was pending when it
    /// returned) is delivered to `on_complete` on the worker thread,
    /// strictly before the worker reports not-busy again. A panicking
    /// task is contained: its panic message is surfaced as
    /// [`ScanError::Panicked`] in the completion rather than lost with
    /// the thread.
    pub fn run<F, C>(&mut self, task: F, on_complete: C) -> Result<(), ScanError>
    where
        F: FnOnce(&CancelToken) -> Result<(), ScanError> + Send + 'static,
        C: FnOnce(Completion) + Send + 'static,
    {
        if !self.latch.claim() {
            return Err(ScanError::Busy);
        }
        // The previous run has finished; reap its join handle.
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.cancel.reset();

        let name = self.name;
        let token = self.cancel.clone();
        let latch = Arc::clone(&self.latch);
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                let _guard = BusyGuard(latch);
                let result = panic::catch_unwind(AssertUnwindSafe(|| task(&token)))
                    .unwrap_or_else(|payload| Err(ScanError::Panicked(panic_message(&*payload))));
                let completion = Completion {
                    cancelled: result.is_ok() && token.is_cancelled(),
                    error: result.err(),
                };
                match &completion.error {
                    Some(err) => warn!("{name}: task failed: {err}"),
                    None => debug!(
                        "{name}: task finished (cancelled: {})",
                        completion.cancelled
                    ),
                }
                on_complete(completion);
            })
            .expect("failed to spawn worker thread");
        self.thread = Some(handle);
        Ok(())
    }

    /// Set the cooperative cancellation flag. Non-blocking; the running
    /// task keeps going until it next checks the flag.
    pub fn request_cancel(&self) {
        self.cancel.set();
    }

    /// [`CancellableWorker::stop_with`] with no keep-waiting observer:
    /// gives up after the initial wait.
    pub fn stop(&mut self, initial_wait: Duration) -> bool {
        self.stop_with(initial_wait, |_| false)
    }

    /// Request cancellation and block until the task drains.
    ///
    /// After each elapsed wait the next wait doubles and `keep_waiting`
    /// is asked (with the doubled wait) whether to continue. Returns
    /// `true` once the worker is idle, `false` if `keep_waiting`
    /// declined while the task was still running. Idempotent: an idle
    /// worker returns `true` without touching the cancel flag.
    pub fn stop_with<K>(&mut self, initial_wait: Duration, mut keep_waiting: K) -> bool
    where
        K: FnMut(Duration) -> bool,
    {
        if !self.latch.is_busy() {
            if let Some(handle) = self.thread.take() {
                let _ = handle.join();
            }
            return true;
        }
        self.request_cancel();
        let mut wait = initial_wait;
        loop {
            if self.latch.wait_idle(wait) {
                if let Some(handle) = self.thread.take() {
                    let _ = handle.join();
                }
                debug!("{}: stopped", self.name);
                return true;
            }
            wait = wait.saturating_mul(2);
            if !keep_waiting(wait) {
                warn!(
                    "{}: task did not honor cancellation within the wait",
                    self.name
                );
                return false;
            }
        }
    }
}
