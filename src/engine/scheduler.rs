// ControlLoop - fixed-rate tick thread
//
// Runs `body(dt, &handle)` every `interval` on a dedicated thread. dt is the
// measured wall time since the previous tick, so a late tick still moves the
// parameters by the right amount.
//
// Stopping:
// - LoopHandle::request_stop() may be called from anywhere, including from
//   inside the body; the loop exits after the current tick.
// - ControlLoop::stop() requests a stop, wakes the thread and joins it. Called
//   from the loop thread itself it only requests the stop (a thread cannot
//   join itself).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::AudioError;

/// Cloneable stop switch for a running loop
#[derive(Clone, Debug)]
pub struct LoopHandle {
    running: Arc<AtomicBool>,
}

impl LoopHandle {
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

pub struct ControlLoop {
    handle: LoopHandle,
    thread: Option<JoinHandle<()>>,
}

impl ControlLoop {
    /// Spawn the loop thread. The first tick runs one interval after spawn.
    pub fn spawn<F>(name: &str, interval: Duration, mut body: F) -> Result<Self, AudioError>
    where
        F: FnMut(f32, &LoopHandle) + Send + 'static,
    {
        let handle = LoopHandle {
            running: Arc::new(AtomicBool::new(true)),
        };
        let thread_handle = handle.clone();

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                tracing::debug!("[ControlLoop] started, interval {:?}", interval);
                let mut last = Instant::now();
                let mut deadline = last + interval;

                while thread_handle.is_running() {
                    let now = Instant::now();
                    if now < deadline {
                        // Woken early by stop() or spuriously; re-check and wait on
                        thread::park_timeout(deadline - now);
                        continue;
                    }

                    let dt = now.duration_since(last).as_secs_f32();
                    last = now;
                    body(dt, &thread_handle);

                    deadline += interval;
                    if deadline < now {
                        // Fell behind by more than a tick: do not burst to catch up
                        deadline = now + interval;
                    }
                }
                tracing::debug!("[ControlLoop] exited");
            })
            .map_err(|e| AudioError::HardwareError {
                details: format!("Failed to spawn control loop thread: {}", e),
            })?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    /// Stop and join. Idempotent.
    pub fn stop(&mut self) {
        self.handle.request_stop();
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                // Detached; the loop exits once the current tick returns
                return;
            }
            thread.thread().unpark();
            if thread.join().is_err() {
                log::error!("[ControlLoop] loop thread panicked");
            }
        }
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
