// BufferPool - lock-free buffer pool with dual SPSC queues
//
// Moves microphone samples from the device callback to the analysis side
// without allocating on the callback thread.
//
// Architecture:
// - DATA_QUEUE: capture callback pushes filled buffers, the audio graph consumes
// - POOL_QUEUE: the audio graph returns drained buffers, the callback recycles
//
// Buffer flow:
// 1. Callback pops an empty buffer from POOL_QUEUE
// 2. Callback copies the first input channel into it
// 3. Callback pushes the filled buffer to DATA_QUEUE
// 4. Audio graph pops the filled buffer, appends it to its window and recorder
// 5. Audio graph pushes the buffer back to POOL_QUEUE

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, Producer};

/// Audio buffer type - pre-allocated vector of f32 samples
pub type AudioBuffer = Vec<f32>;

/// All four queue ends, before they are handed to their threads
pub struct BufferPoolChannels {
    /// Producer for sending filled audio buffers to the audio graph
    pub data_producer: Producer<AudioBuffer>,
    /// Consumer for receiving filled audio buffers in the audio graph
    pub data_consumer: Consumer<AudioBuffer>,
    /// Producer for returning drained buffers from the audio graph
    pub pool_producer: Producer<AudioBuffer>,
    /// Consumer for retrieving empty buffers in the capture callback
    pub pool_consumer: Consumer<AudioBuffer>,
    /// Samples discarded by the callback, readable from the analysis side
    pub dropped_samples: Arc<AtomicU64>,
}

impl BufferPoolChannels {
    /// Split into the capture-callback half and the analysis half
    pub fn split_for_threads(self) -> (CaptureChannels, AnalysisChannels) {
        (
            CaptureChannels {
                data_producer: self.data_producer,
                pool_consumer: self.pool_consumer,
                dropped_samples: Arc::clone(&self.dropped_samples),
            },
            AnalysisChannels {
                data_consumer: self.data_consumer,
                pool_producer: self.pool_producer,
                dropped_samples: self.dropped_samples,
                reported_drops: 0,
            },
        )
    }
}

/// Queue ends owned by the device callback
pub struct CaptureChannels {
    data_producer: Producer<AudioBuffer>,
    pool_consumer: Consumer<AudioBuffer>,
    dropped_samples: Arc<AtomicU64>,
}

impl CaptureChannels {
    /// Copy the first channel of an interleaved block into pooled buffers
    ///
    /// Never allocates: each pooled buffer is filled up to its capacity.
    /// Samples that find no free buffer are counted and discarded.
    ///
    /// # Returns
    /// Number of samples discarded by this call
    pub fn push_interleaved<T: Copy>(
        &mut self,
        data: &[T],
        channels: usize,
        convert: impl Fn(T) -> f32,
    ) -> usize {
        let channels = channels.max(1);
        let mut frames = data
            .chunks(channels)
            .map(|frame| convert(frame[0]))
            .peekable();
        let mut dropped = 0;

        while frames.peek().is_some() {
            let mut buffer = match self.pool_consumer.pop() {
                Ok(buffer) => buffer,
                Err(_) => {
                    dropped += frames.count();
                    break;
                }
            };

            buffer.clear();
            let capacity = buffer.capacity();
            buffer.extend(frames.by_ref().take(capacity));

            let filled = buffer.len();
            if self.data_producer.push(buffer).is_err() {
                dropped += filled;
            }
        }

        if dropped > 0 {
            self.dropped_samples.fetch_add(dropped as u64, Ordering::Relaxed);
        }
        dropped
    }
}

/// Queue ends owned by the audio graph
pub struct AnalysisChannels {
    data_consumer: Consumer<AudioBuffer>,
    pool_producer: Producer<AudioBuffer>,
    dropped_samples: Arc<AtomicU64>,
    reported_drops: u64,
}

impl AnalysisChannels {
    /// Pop every filled buffer, hand its samples to `sink`, and recycle it
    ///
    /// # Returns
    /// Number of samples drained
    pub fn drain(&mut self, mut sink: impl FnMut(&[f32])) -> usize {
        let mut drained = 0;
        while let Ok(buffer) = self.data_consumer.pop() {
            drained += buffer.len();
            sink(&buffer);
            let _ = self.pool_producer.push(buffer);
        }
        drained
    }

    /// Total samples the capture side discarded because analysis fell behind
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples.load(Ordering::Relaxed)
    }

    /// Samples dropped since the previous call
    pub fn take_new_drops(&mut self) -> u64 {
        let total = self.dropped_samples();
        let fresh = total.saturating_sub(self.reported_drops);
        self.reported_drops = total;
        fresh
    }

    /// Share of the data queue currently holding filled buffers (0-100)
    pub fn occupancy_percent(&self) -> f32 {
        let capacity = self.data_consumer.buffer().capacity();
        if capacity == 0 {
            return 0.0;
        }
        self.data_consumer.slots() as f32 / capacity as f32 * 100.0
    }
}

/// Lock-free buffer pool using dual SPSC ring buffers
///
/// Pre-allocates a fixed number of audio buffers and manages them through
/// two lock-free queues. All heap allocations happen during initialization.
///
/// # Example
/// ```ignore
/// let (mut capture, mut analysis) = BufferPool::new(32, 1024).split_for_threads();
///
/// // In the device callback:
/// capture.push_interleaved(data, channels, |s| s);
///
/// // In the audio graph:
/// analysis.drain(|samples| window.extend_from_slice(samples));
/// ```
pub struct BufferPool;

impl BufferPool {
    /// Create a new BufferPool with specified buffer count and size
    ///
    /// # Arguments
    /// * `buffer_count` - Number of buffers to pre-allocate (typical: 8-32)
    /// * `buffer_size` - Size of each buffer in f32 samples (typical: 512-2048)
    ///
    /// Zero arguments are raised to one so the pool is always usable.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(buffer_count: usize, buffer_size: usize) -> BufferPoolChannels {
        let buffer_count = buffer_count.max(1);
        let buffer_size = buffer_size.max(1);

        let (mut pool_producer, pool_consumer) = rtrb::RingBuffer::new(buffer_count);
        let (data_producer, data_consumer) = rtrb::RingBuffer::new(buffer_count);

        for _ in 0..buffer_count {
            let buffer = Vec::with_capacity(buffer_size);
            if pool_producer.push(buffer).is_err() {
                break;
            }
        }

        BufferPoolChannels {
            data_producer,
            data_consumer,
            pool_producer,
            pool_consumer,
            dropped_samples: Arc::new(AtomicU64::new(0)),
        }
    }
}
