use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;

use crate::audio::{MicrophoneSink, MusicRenderer};
use crate::error::AudioError;

use super::{ActiveStream, AudioBackend, MicrophoneStream, OutputFormat};

/// Deterministic backend used for testing and CLI tooling.
///
/// No device is touched. Tests feed the microphone with
/// [`StubBackend::push_microphone`] and pull rendered music with
/// [`StubBackend::render_output`]. Open/close counters make leaked handles
/// visible, and failures can be injected per stream kind.
#[derive(Clone)]
pub struct StubBackend {
    format: OutputFormat,
    microphone_rate: u32,
    shared: Arc<StubShared>,
}

#[derive(Default)]
struct StubShared {
    deny_microphone: AtomicBool,
    fail_output: AtomicBool,
    open_microphones: AtomicUsize,
    peak_microphones: AtomicUsize,
    microphones_opened: AtomicUsize,
    open_outputs: AtomicUsize,
    outputs_opened: AtomicUsize,
    microphone: Mutex<Option<MicrophoneSlot>>,
    output: Mutex<Option<MusicRenderer>>,
}

struct MicrophoneSlot {
    sink: MicrophoneSink,
    disconnected: Arc<AtomicBool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Copy)]
enum StubStreamKind {
    Microphone,
    Output,
}

struct StubStream {
    kind: StubStreamKind,
    shared: Arc<StubShared>,
}

impl ActiveStream for StubStream {
    fn describe(&self) -> &str {
        match self.kind {
            StubStreamKind::Microphone => "stub:microphone",
            StubStreamKind::Output => "stub:output",
        }
    }
}

impl Drop for StubStream {
    fn drop(&mut self) {
        match self.kind {
            StubStreamKind::Microphone => {
                lock(&self.shared.microphone).take();
                self.shared.open_microphones.fetch_sub(1, Ordering::SeqCst);
            }
            StubStreamKind::Output => {
                lock(&self.shared.output).take();
                self.shared.open_outputs.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

impl StubBackend {
    /// 48 kHz stereo output, 48 kHz microphone
    pub fn new() -> Self {
        Self::with_format(
            OutputFormat {
                sample_rate: 48_000,
                channels: 2,
            },
            48_000,
        )
    }

    pub fn with_format(format: OutputFormat, microphone_rate: u32) -> Self {
        Self {
            format,
            microphone_rate,
            shared: Arc::new(StubShared::default()),
        }
    }

    /// Make the next microphone acquisitions fail with `PermissionDenied`
    pub fn deny_microphone(&self, deny: bool) {
        self.shared.deny_microphone.store(deny, Ordering::SeqCst);
    }

    /// Make the next output acquisitions fail with `StreamOpenFailed`
    pub fn fail_output(&self, fail: bool) {
        self.shared.fail_output.store(fail, Ordering::SeqCst);
    }

    /// Feed mono samples as one microphone callback would.
    ///
    /// Returns false when no microphone is open.
    pub fn push_microphone(&self, samples: &[f32]) -> bool {
        match lock(&self.shared.microphone).as_mut() {
            Some(slot) => {
                slot.sink.push_interleaved(samples, 1);
                true
            }
            None => false,
        }
    }

    /// Feed uniform white noise in `[-amplitude, amplitude]`
    pub fn push_white_noise(&self, amplitude: f32, len: usize) -> bool {
        let mut rng = rand::thread_rng();
        let samples: Vec<f32> = (0..len)
            .map(|_| rng.gen_range(-amplitude..=amplitude))
            .collect();
        self.push_microphone(&samples)
    }

    /// Simulate the microphone device disappearing
    pub fn disconnect_microphone(&self) {
        if let Some(slot) = lock(&self.shared.microphone).as_ref() {
            slot.disconnected.store(true, Ordering::SeqCst);
        }
    }

    /// Pull `frames` frames through the open output's renderer
    pub fn render_output(&self, frames: usize) -> Option<Vec<f32>> {
        let mut output = lock(&self.shared.output);
        let renderer = output.as_mut()?;
        let mut buffer = vec![0.0; frames * self.format.channels as usize];
        renderer.render(&mut buffer);
        Some(buffer)
    }

    /// Live value of a chain stage inside the open output
    pub fn output_live_value(&self, stage: &str) -> Option<f32> {
        lock(&self.shared.output)
            .as_ref()
            .and_then(|r| r.chain().live_value(stage))
    }

    pub fn open_microphones(&self) -> usize {
        self.shared.open_microphones.load(Ordering::SeqCst)
    }

    /// Most microphones ever open at the same time
    pub fn peak_open_microphones(&self) -> usize {
        self.shared.peak_microphones.load(Ordering::SeqCst)
    }

    pub fn microphones_opened(&self) -> usize {
        self.shared.microphones_opened.load(Ordering::SeqCst)
    }

    pub fn open_outputs(&self) -> usize {
        self.shared.open_outputs.load(Ordering::SeqCst)
    }

    pub fn outputs_opened(&self) -> usize {
        self.shared.outputs_opened.load(Ordering::SeqCst)
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn output_format(&self) -> Result<OutputFormat, AudioError> {
        Ok(self.format)
    }

    fn open_microphone(&self, sink: MicrophoneSink) -> Result<MicrophoneStream, AudioError> {
        if self.shared.deny_microphone.load(Ordering::SeqCst) {
            return Err(AudioError::PermissionDenied);
        }

        let disconnected = Arc::new(AtomicBool::new(false));
        *lock(&self.shared.microphone) = Some(MicrophoneSlot {
            sink,
            disconnected: Arc::clone(&disconnected),
        });
        let open = self.shared.open_microphones.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.peak_microphones.fetch_max(open, Ordering::SeqCst);
        self.shared.microphones_opened.fetch_add(1, Ordering::SeqCst);

        Ok(MicrophoneStream {
            stream: Box::new(StubStream {
                kind: StubStreamKind::Microphone,
                shared: Arc::clone(&self.shared),
            }),
            sample_rate: self.microphone_rate,
            disconnected,
        })
    }

    fn open_output(&self, renderer: MusicRenderer) -> Result<Box<dyn ActiveStream>, AudioError> {
        if self.shared.fail_output.load(Ordering::SeqCst) {
            return Err(AudioError::StreamOpenFailed {
                reason: "stub output disabled".to_string(),
            });
        }

        *lock(&self.shared.output) = Some(renderer);
        self.shared.open_outputs.fetch_add(1, Ordering::SeqCst);
        self.shared.outputs_opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(StubStream {
            kind: StubStreamKind::Output,
            shared: Arc::clone(&self.shared),
        }))
    }
}
