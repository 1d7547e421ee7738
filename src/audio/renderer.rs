// MusicRenderer - the output callback's whole job
//
// Reads the decoded track at the output rate (linear interpolation), maps
// channels onto the output layout, and runs the signal chain in place.
// Everything is allocated in new(); render() only touches existing memory.

use crate::audio::track::TrackBuffer;
use crate::dsp::chain::SignalChain;

pub struct MusicRenderer {
    track: TrackBuffer,
    chain: SignalChain,
    out_channels: usize,
    /// Fractional read position in track frames
    position: f64,
    /// Track frames advanced per output frame
    step: f64,
    looping: bool,
    finished: bool,
}

impl MusicRenderer {
    /// The chain must have been built for the output format
    pub fn new(track: TrackBuffer, chain: SignalChain, output_sample_rate: u32, looping: bool) -> Self {
        let step = track.sample_rate() as f64 / output_sample_rate.max(1) as f64;
        Self {
            out_channels: chain.channels(),
            track,
            chain,
            position: 0.0,
            step,
            looping,
            finished: false,
        }
    }

    /// Fill an interleaved output block
    pub fn render(&mut self, out: &mut [f32]) {
        let out_channels = self.out_channels;
        let track_channels = self.track.channels();
        let frames = self.track.frames();

        for frame in out.chunks_exact_mut(out_channels) {
            if self.finished {
                frame.iter_mut().for_each(|s| *s = 0.0);
                continue;
            }

            let index = self.position as usize;
            let frac = (self.position - index as f64) as f32;
            let next = if index + 1 < frames {
                index + 1
            } else if self.looping {
                0
            } else {
                index
            };

            for (c, sample) in frame.iter_mut().enumerate() {
                *sample = if out_channels == 1 && track_channels > 1 {
                    let mut sum = 0.0;
                    for tc in 0..track_channels {
                        sum += lerp(self.track.sample(index, tc), self.track.sample(next, tc), frac);
                    }
                    sum / track_channels as f32
                } else {
                    let tc = c % track_channels;
                    lerp(self.track.sample(index, tc), self.track.sample(next, tc), frac)
                };
            }

            self.position += self.step;
            if self.position >= frames as f64 {
                if self.looping {
                    self.position %= frames as f64;
                } else {
                    self.finished = true;
                }
            }
        }

        // Leftover samples of a partial frame
        let tail = out.len() - out.len() % out_channels;
        out[tail..].iter_mut().for_each(|s| *s = 0.0);

        self.chain.process_block(out);
    }

    /// True once a non-looping track has played to the end
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn chain(&self) -> &SignalChain {
        &self.chain
    }
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
