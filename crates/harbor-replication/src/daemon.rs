//! Background daemon with a looper period.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A unit of background work driven by a [`Daemon`].
pub trait DaemonTask: Send + 'static {
    /// One scheduling callback.
    fn execute(&mut self);

    /// Runs once after the loop exits, before the task is dropped.
    fn retire(&mut self) {}
}

/// Runs a task periodically on a dedicated named thread.
///
/// The daemon owns its task, so stopping the daemon and releasing the task
/// happen in a deterministic order. Between callbacks the thread sleeps for
/// the looper period; `stop` interrupts the sleep, making the loop exit at
/// the next idle point.
pub struct Daemon {
    shared: Arc<DaemonShared>,
    handle: Option<JoinHandle<()>>,
}

struct DaemonShared {
    stop_requested: Mutex<bool>,
    wake: Condvar,
}

impl Daemon {
    /// Spawns a daemon running `task` with the given idle period.
    pub fn spawn<T: DaemonTask>(name: &str, period: Duration, mut task: T) -> Self {
        let shared = Arc::new(DaemonShared {
            stop_requested: Mutex::new(false),
            wake: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                loop {
                    task.execute();

                    let mut stop = thread_shared.stop_requested.lock();
                    if *stop {
                        break;
                    }
                    thread_shared.wake.wait_for(&mut stop, period);
                    if *stop {
                        break;
                    }
                }
                task.retire();
            })
            .expect("failed to spawn daemon thread");

        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Requests the loop to exit at the next idle point and joins the
    /// thread. Returns the thread's panic payload if it terminated
    /// abnormally.
    pub fn stop(&mut self) -> std::thread::Result<()> {
        *self.shared.stop_requested.lock() = true;
        self.shared.wake.notify_all();
        match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("running", &self.handle.is_some())
            .finish()
    }
}
