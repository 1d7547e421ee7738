// Audio module - music assets, rendering and microphone transfer
//
// Nothing in here talks to a device; the engine backends own the streams and
// call into MusicRenderer / MicrophoneSink from their callbacks.

pub mod buffer_pool;
pub mod renderer;
pub mod track;

pub use buffer_pool::{BufferPool, MicrophoneSink, MicrophoneSource};
pub use renderer::MusicRenderer;
pub use track::{
    decode_file, FileTrackLoader, MemoryTrackLoader, TrackBuffer, TrackCatalog, TrackEntry,
    TrackLoader, TrackRef,
};
