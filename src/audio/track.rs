// Track loading - music assets decoded to interleaved f32 in memory
//
// Decoding happens once at session start (never on the audio thread). The
// decoded buffer is shared with the renderer through an Arc so a restart can
// reuse it without copying.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::AudioError;

/// Identifies a track: a catalog name or a filesystem path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackRef(String);

impl TrackRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Decoded, interleaved track audio
#[derive(Debug, Clone)]
pub struct TrackBuffer {
    samples: Arc<[f32]>,
    channels: usize,
    sample_rate: u32,
}

impl TrackBuffer {
    /// Wrap decoded audio. Empty or malformed buffers are a decode failure.
    pub fn from_interleaved(
        samples: Vec<f32>,
        channels: usize,
        sample_rate: u32,
    ) -> Result<Self, AudioError> {
        if channels == 0 || sample_rate == 0 {
            return Err(AudioError::DecodeFailure {
                reason: format!("invalid format: {} ch @ {} Hz", channels, sample_rate),
            });
        }
        let frames = samples.len() / channels;
        if frames == 0 {
            return Err(AudioError::DecodeFailure {
                reason: "track contains no audio".to_string(),
            });
        }

        let mut samples = samples;
        samples.truncate(frames * channels);
        Ok(Self {
            samples: samples.into(),
            channels,
            sample_rate,
        })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn duration_secs(&self) -> f32 {
        self.frames() as f32 / self.sample_rate as f32
    }

    /// Sample at `frame`, `channel` (caller keeps both in range)
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        self.samples[frame * self.channels + channel]
    }
}

/// Resolves a [`TrackRef`] to decoded audio
pub trait TrackLoader: Send + Sync {
    fn load(&self, track: &TrackRef) -> Result<TrackBuffer, AudioError>;
}

/// Named track in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackEntry {
    pub name: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The music library offered to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TrackCatalog {
    pub tracks: Vec<TrackEntry>,
    /// Track played when none is named
    pub default_track: Option<String>,
}

impl TrackCatalog {
    /// Catalog entry path for a name, if listed
    pub fn resolve(&self, track: &TrackRef) -> Option<&Path> {
        self.tracks
            .iter()
            .find(|t| t.name == track.as_str())
            .map(|t| t.path.as_path())
    }

    pub fn default_track(&self) -> Option<TrackRef> {
        self.default_track
            .as_deref()
            .or_else(|| self.tracks.first().map(|t| t.name.as_str()))
            .map(TrackRef::new)
    }
}

/// Decodes catalog entries or plain paths with symphonia
pub struct FileTrackLoader {
    catalog: TrackCatalog,
}

impl FileTrackLoader {
    pub fn new(catalog: TrackCatalog) -> Self {
        Self { catalog }
    }

    fn path_for(&self, track: &TrackRef) -> Result<PathBuf, AudioError> {
        let path = match self.catalog.resolve(track) {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(track.as_str()),
        };
        if path.is_file() {
            Ok(path)
        } else {
            Err(AudioError::TrackNotFound {
                track: track.to_string(),
            })
        }
    }
}

impl TrackLoader for FileTrackLoader {
    fn load(&self, track: &TrackRef) -> Result<TrackBuffer, AudioError> {
        let path = self.path_for(track)?;
        decode_file(&path)
    }
}

/// In-memory loader for synthetic or pre-decoded tracks
#[derive(Default)]
pub struct MemoryTrackLoader {
    tracks: RwLock<HashMap<String, TrackBuffer>>,
}

impl MemoryTrackLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, buffer: TrackBuffer) {
        let mut tracks = self
            .tracks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tracks.insert(name.to_string(), buffer);
    }
}

impl TrackLoader for MemoryTrackLoader {
    fn load(&self, track: &TrackRef) -> Result<TrackBuffer, AudioError> {
        let tracks = self.tracks.read().map_err(|_| AudioError::LockPoisoned {
            component: "MemoryTrackLoader".to_string(),
        })?;
        tracks
            .get(track.as_str())
            .cloned()
            .ok_or_else(|| AudioError::TrackNotFound {
                track: track.to_string(),
            })
    }
}

fn decode_error(context: &str, err: impl fmt::Display) -> AudioError {
    AudioError::DecodeFailure {
        reason: format!("{}: {}", context, err),
    }
}

/// Decode a whole file to interleaved f32, keeping its channel layout
pub fn decode_file(path: &Path) -> Result<TrackBuffer, AudioError> {
    let file = std::fs::File::open(path).map_err(|e| AudioError::TrackNotFound {
        track: format!("{} ({})", path.display(), e),
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| decode_error("unsupported format", e))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_error("no audio tracks", path.display()))?;

    let track_id = track.id;
    let mut channels = track.codec_params.channels.map_or(0, |c| c.count());
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error("no decoder", e))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_error("read failed", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Corrupt packet: skip it, keep the rest of the track
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(decode_error("decode failed", e)),
        };

        let spec = *decoded.spec();
        channels = spec.channels.count();
        sample_rate = spec.rate;

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let buffer = TrackBuffer::from_interleaved(samples, channels, sample_rate)?;
    log::info!(
        "[Track] Decoded {}: {} frames, {} ch, {} Hz, {:.1}s",
        path.display(),
        buffer.frames(),
        buffer.channels(),
        buffer.sample_rate(),
        buffer.duration_secs()
    );
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, channels: u16, sample_rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            for _ in 0..channels {
                let v = ((i as f32 * 0.05).sin() * 8_000.0) as i16;
                writer.write_sample(v).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_from_interleaved_validates() {
        assert!(TrackBuffer::from_interleaved(vec![], 2, 48_000).is_err());
        assert!(TrackBuffer::from_interleaved(vec![0.0; 4], 0, 48_000).is_err());
        let t = TrackBuffer::from_interleaved(vec![0.0; 5], 2, 48_000).unwrap();
        assert_eq!(t.frames(), 2);
        assert_eq!(t.samples().len(), 4);
    }

    #[test]
    fn test_decode_wav_keeps_layout() {
        let dir = std::env::temp_dir().join(format!("drill_shield_track_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("stereo.wav");
        write_wav(&path, 2, 44_100, 4_410);

        let track = decode_file(&path).unwrap();
        assert_eq!(track.channels(), 2);
        assert_eq!(track.sample_rate(), 44_100);
        assert_eq!(track.frames(), 4_410);
        assert!((track.duration_secs() - 0.1).abs() < 1e-3);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_garbage_file_is_decode_failure() {
        let dir = std::env::temp_dir().join(format!("drill_shield_garbage_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("not_audio.mp3");
        std::fs::write(&path, b"definitely not an mp3 file").unwrap();

        let err = decode_file(&path).unwrap_err();
        assert!(matches!(err, AudioError::DecodeFailure { .. }), "{:?}", err);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_file_loader_resolves_catalog_then_path() {
        let catalog = TrackCatalog {
            tracks: vec![TrackEntry {
                name: "rain".to_string(),
                path: PathBuf::from("/nonexistent/rain.mp3"),
                description: None,
            }],
            default_track: None,
        };
        assert_eq!(catalog.default_track(), Some(TrackRef::new("rain")));

        let loader = FileTrackLoader::new(catalog);
        assert!(matches!(
            loader.load(&TrackRef::new("rain")),
            Err(AudioError::TrackNotFound { .. })
        ));
        assert!(matches!(
            loader.load(&TrackRef::new("/nonexistent/other.wav")),
            Err(AudioError::TrackNotFound { .. })
        ));
    }

    #[test]
    fn test_memory_loader() {
        let loader = MemoryTrackLoader::new();
        loader.insert("tone", TrackBuffer::from_interleaved(vec![0.1; 96], 2, 48_000).unwrap());
        assert_eq!(loader.load(&TrackRef::new("tone")).unwrap().frames(), 48);
        assert!(loader.load(&TrackRef::new("missing")).is_err());
    }
}
