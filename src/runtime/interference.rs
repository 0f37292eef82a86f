//! Scheduling interference
//!
//! A background thread that repeatedly yields and sleeps for a microsecond
//! while sequences run. The perturbation shakes up thread interleavings so
//! that repeated runs of the same batch explore different schedules. It has
//! no semantic effect on results.
//!
//! The thread asks the OS for maximum priority when it starts. Platforms or
//! sandboxes that refuse get a warning and the loop runs at default priority.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thread_priority::ThreadPriority;

const TICK: Duration = Duration::from_micros(1);

/// Counters shared by every interference thread started against them.
#[derive(Debug, Default)]
pub struct Activity {
    started: AtomicU64,
    live: AtomicUsize,
}

impl Activity {
    /// Threads started so far.
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Acquire)
    }

    /// Threads that have not exited yet.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

/// Decrements the live count when the thread body ends, panics included.
struct LiveGuard(Arc<Activity>);

impl LiveGuard {
    fn enter(activity: Arc<Activity>) -> Self {
        activity.live.fetch_add(1, Ordering::AcqRel);
        Self(activity)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Handle to a running interference thread.
///
/// Dropping the handle signals the thread to stop without waiting for it.
#[derive(Debug)]
pub struct Interference {
    stop: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl Interference {
    /// Start the interference thread, accounting for it in `activity`.
    pub fn start(activity: Arc<Activity>) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU64::new(0));

        // Counted before the spawn; a failed spawn drops the guard with the closure.
        let live = LiveGuard::enter(activity.clone());
        let handle = thread::Builder::new().name("interference".to_string()).spawn({
            let stop = stop.clone();
            let ticks = ticks.clone();
            move || {
                let _live = live;
                if let Err(err) = thread_priority::set_current_thread_priority(ThreadPriority::Max)
                {
                    tracing::warn!(error = ?err, "interference thread keeps default priority");
                }
                while !stop.load(Ordering::Acquire) {
                    thread::yield_now();
                    thread::sleep(TICK);
                    ticks.fetch_add(1, Ordering::Relaxed);
                }
            }
        })?;

        activity.started.fetch_add(1, Ordering::AcqRel);
        tracing::trace!("interference thread started");
        Ok(Self {
            stop,
            ticks,
            handle: Some(handle),
        })
    }

    /// Number of perturbation rounds completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Signal the thread and wait for it to exit.
    pub async fn stop(mut self) {
        self.stop.store(true, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return;
        };
        let joined = tokio::task::spawn_blocking(move || handle.join()).await;
        match joined {
            Ok(Ok(())) => tracing::trace!(ticks = self.ticks(), "interference thread stopped"),
            Ok(Err(_)) => tracing::warn!("interference thread panicked"),
            Err(err) => tracing::warn!(error = %err, "failed to join interference thread"),
        }
    }
}

impl Drop for Interference {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}
