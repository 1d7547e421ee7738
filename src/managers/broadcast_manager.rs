// BroadcastChannelManager: Centralized tokio broadcast channel management
// Single Responsibility: Status/spectrum fan-out and subscription

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::analysis::SpectrumFrame;
use crate::control::StatusEvent;

/// Buffer size for status events (~1.6 s of ticks at 16 ms)
const STATUS_CAPACITY: usize = 100;

/// Buffer size for spectrum frames; slow visualisers just lag
const SPECTRUM_CAPACITY: usize = 16;

/// Manages the session's tokio broadcast channels
///
/// # Channel Types
/// - Status: one `StatusEvent` per control tick plus lifecycle events
/// - Spectrum: latest `SpectrumFrame` per live tick (visualisation only)
///
/// Channels are created up front so observers can subscribe before the
/// session starts and keep their receivers across restarts. Cloning the
/// manager shares the same channels.
#[derive(Clone)]
pub struct BroadcastChannelManager {
    status: broadcast::Sender<StatusEvent>,
    spectrum: broadcast::Sender<SpectrumFrame>,
    last_status: Arc<Mutex<Option<StatusEvent>>>,
    latest_spectrum: Arc<Mutex<Option<SpectrumFrame>>>,
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Snapshots are plain data; a panic elsewhere cannot leave them torn
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl BroadcastChannelManager {
    pub fn new() -> Self {
        let (status, _) = broadcast::channel(STATUS_CAPACITY);
        let (spectrum, _) = broadcast::channel(SPECTRUM_CAPACITY);
        Self {
            status,
            spectrum,
            last_status: Arc::new(Mutex::new(None)),
            latest_spectrum: Arc::new(Mutex::new(None)),
        }
    }

    // ========================================================================
    // STATUS CHANNEL
    // ========================================================================

    /// Publish a status event to every subscriber.
    ///
    /// Having no subscribers is not an error.
    pub fn publish_status(&self, event: StatusEvent) {
        *lock(&self.last_status) = Some(event.clone());
        let _ = self.status.send(event);
    }

    /// Subscribe to status events
    ///
    /// Each subscriber receives independent copies. Subscribers that fall more
    /// than the buffer size behind see `RecvError::Lagged` and skip ahead.
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status.subscribe()
    }

    /// Most recent status event, if any was published
    pub fn last_status(&self) -> Option<StatusEvent> {
        lock(&self.last_status).clone()
    }

    // ========================================================================
    // SPECTRUM CHANNEL
    // ========================================================================

    /// Record the latest frame and forward it to subscribers
    pub fn publish_spectrum(&self, frame: &SpectrumFrame) {
        {
            let mut latest = lock(&self.latest_spectrum);
            match latest.as_mut() {
                Some(existing) => existing.clone_from(frame),
                None => *latest = Some(frame.clone()),
            }
        }
        if self.spectrum.receiver_count() > 0 {
            let _ = self.spectrum.send(frame.clone());
        }
    }

    pub fn subscribe_spectrum(&self) -> broadcast::Receiver<SpectrumFrame> {
        self.spectrum.subscribe()
    }

    /// Read-only snapshot of the latest frame
    pub fn latest_spectrum(&self) -> Option<SpectrumFrame> {
        lock(&self.latest_spectrum).clone()
    }

    /// Forget the latest frame (microphone released)
    pub fn clear_spectrum(&self) {
        *lock(&self.latest_spectrum) = None;
    }
}
