// BufferPool - lock-free microphone transfer with dual SPSC queues
//
// Carries microphone samples from the input callback to the control loop
// without allocating or locking on the audio side.
//
// Architecture:
// - DATA_QUEUE: microphone callback pushes filled buffers, control loop consumes
// - POOL_QUEUE: control loop returns emptied buffers, microphone callback recycles
//
// When the control loop falls behind and the pool runs dry, the callback drops
// the incoming block and counts it. The analyzer only ever needs the newest
// window, so losing stale blocks is harmless.

use rtrb::{Consumer, Producer};

use crate::error::AudioError;

/// Configuration constants for buffer pool
pub const DEFAULT_BUFFER_COUNT: usize = 16;
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

/// Audio buffer type - pre-allocated vector of f32 samples
pub type AudioBuffer = Vec<f32>;

/// All four queue ends, before they are handed to their threads
pub struct BufferPoolChannels {
    /// Producer for sending filled buffers to the control loop
    pub data_producer: Producer<AudioBuffer>,
    /// Consumer for receiving filled buffers in the control loop
    pub data_consumer: Consumer<AudioBuffer>,
    /// Producer for returning empty buffers from the control loop
    pub pool_producer: Producer<AudioBuffer>,
    /// Consumer for retrieving empty buffers in the microphone callback
    pub pool_consumer: Consumer<AudioBuffer>,
}

impl BufferPoolChannels {
    /// Split into the microphone-callback half and the control-loop half
    pub fn split_for_threads(self) -> (MicrophoneSink, MicrophoneSource) {
        (
            MicrophoneSink {
                data_producer: self.data_producer,
                pool_consumer: self.pool_consumer,
                dropped_blocks: 0,
            },
            MicrophoneSource {
                data_consumer: self.data_consumer,
                pool_producer: self.pool_producer,
            },
        )
    }
}

/// Microphone-callback half of the pool
pub struct MicrophoneSink {
    data_producer: Producer<AudioBuffer>,
    pool_consumer: Consumer<AudioBuffer>,
    dropped_blocks: u64,
}

impl MicrophoneSink {
    /// Copy channel 0 of an interleaved block into a pooled buffer and send it.
    ///
    /// Never allocates: at most the newest `capacity` frames are kept per
    /// block, and the block is dropped when no empty buffer is available.
    #[inline]
    pub fn push_interleaved(&mut self, data: &[f32], channels: usize) {
        let channels = channels.max(1);
        let mut buffer = match self.pool_consumer.pop() {
            Ok(buffer) => buffer,
            Err(_) => {
                self.dropped_blocks += 1;
                return;
            }
        };

        let capacity = buffer.capacity();
        let frames = data.len().div_ceil(channels);
        let skip = frames.saturating_sub(capacity) * channels;
        buffer.clear();
        buffer.extend(data[skip..].iter().step_by(channels));

        if self.data_producer.push(buffer).is_err() {
            self.dropped_blocks += 1;
        }
    }

    /// Blocks lost because the control loop was not draining
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks
    }
}

/// Control-loop half of the pool
pub struct MicrophoneSource {
    data_consumer: Consumer<AudioBuffer>,
    pool_producer: Producer<AudioBuffer>,
}

impl MicrophoneSource {
    /// Hand every pending block to `f` in arrival order and recycle it.
    ///
    /// Returns the number of samples drained.
    pub fn drain<F: FnMut(&[f32])>(&mut self, mut f: F) -> usize {
        let mut total = 0;
        while let Ok(buffer) = self.data_consumer.pop() {
            total += buffer.len();
            f(&buffer);
            // Pool queue has room for every buffer ever allocated
            let _ = self.pool_producer.push(buffer);
        }
        total
    }
}

/// Lock-free buffer pool using dual SPSC ring buffers
///
/// Pre-allocates a fixed number of buffers; all heap allocation for the
/// microphone path happens here.
///
/// # Example
/// ```ignore
/// let (mut sink, mut source) = BufferPool::new(16, 2048)?.split_for_threads();
///
/// // In the microphone callback:
/// sink.push_interleaved(data, channels);
///
/// // In the control loop:
/// source.drain(|samples| analyzer.ingest(samples));
/// ```
pub struct BufferPool;

impl BufferPool {
    /// Create a new BufferPool with specified buffer count and size
    ///
    /// # Arguments
    /// * `buffer_count` - Number of buffers to pre-allocate (typical: 8-32)
    /// * `buffer_size` - Capacity of each buffer in f32 samples (typical: 1024-4096)
    #[allow(clippy::new_ret_no_self)]
    pub fn new(buffer_count: usize, buffer_size: usize) -> Result<BufferPoolChannels, AudioError> {
        if buffer_count == 0 || buffer_size == 0 {
            return Err(AudioError::InvalidConfig {
                reason: format!(
                    "buffer pool needs count > 0 and size > 0 (got {} x {})",
                    buffer_count, buffer_size
                ),
            });
        }

        let (mut pool_producer, pool_consumer) = rtrb::RingBuffer::new(buffer_count);
        let (data_producer, data_consumer) = rtrb::RingBuffer::new(buffer_count);

        for _ in 0..buffer_count {
            // Capacity equals buffer_count, so this cannot fail
            let _ = pool_producer.push(Vec::with_capacity(buffer_size));
        }

        Ok(BufferPoolChannels {
            data_producer,
            data_consumer,
            pool_producer,
            pool_consumer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_pool_creation() {
        let mut channels = BufferPool::new(16, 2048).unwrap();

        let mut available_buffers = 0;
        while let Ok(buffer) = channels.pool_consumer.pop() {
            assert_eq!(buffer.capacity(), 2048);
            available_buffers += 1;
        }
        assert_eq!(available_buffers, 16, "Expected 16 buffers in pool queue");
        assert!(
            channels.data_consumer.pop().is_err(),
            "Data queue should be empty initially"
        );
    }

    #[test]
    fn test_zero_sizes_rejected() {
        assert!(BufferPool::new(0, 2048).is_err());
        assert!(BufferPool::new(4, 0).is_err());
    }

    #[test]
    fn test_sink_takes_first_channel() {
        let (mut sink, mut source) = BufferPool::new(4, 1024).unwrap().split_for_threads();
        sink.push_interleaved(&[1.0, -1.0, 2.0, -2.0, 3.0, -3.0], 2);

        let mut received = Vec::new();
        let total = source.drain(|samples| received.extend_from_slice(samples));
        assert_eq!(total, 3);
        assert_eq!(received, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_block_truncated_to_capacity() {
        let (mut sink, mut source) = BufferPool::new(2, 4).unwrap().split_for_threads();
        sink.push_interleaved(&[0.5; 10], 1);
        assert_eq!(source.drain(|s| assert_eq!(s.len(), 4)), 4);
    }

    #[test]
    fn test_oversized_block_keeps_newest_frames() {
        let (mut sink, mut source) = BufferPool::new(2, 4).unwrap().split_for_threads();
        let block: Vec<f32> = (0..10).flat_map(|i| [i as f32, -1.0]).collect();
        sink.push_interleaved(&block, 2);

        let mut received = Vec::new();
        source.drain(|samples| received.extend_from_slice(samples));
        assert_eq!(received, vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_exhausted_pool_drops_blocks() {
        let (mut sink, mut source) = BufferPool::new(2, 16).unwrap().split_for_threads();
        for _ in 0..5 {
            sink.push_interleaved(&[0.1; 8], 1);
        }
        assert_eq!(sink.dropped_blocks(), 3);

        // Draining recycles buffers so the sink can continue
        assert_eq!(source.drain(|_| {}), 16);
        sink.push_interleaved(&[0.1; 8], 1);
        assert_eq!(sink.dropped_blocks(), 3);
        assert_eq!(source.drain(|_| {}), 8);
    }

    #[test]
    fn test_send() {
        fn assert_send<T: Send>() {}
        assert_send::<MicrophoneSink>();
        assert_send::<MicrophoneSource>();
    }
}
