//! Bounded ring of recent audio samples.
//!
//! Each session owns one `AudioRing`: producers append PCM from the
//! socket, the scheduler drains it for inference. All operations are
//! serialised by a single internal lock so readers always see a
//! consistent snapshot.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Thread-safe bounded sequence of float samples in arrival order.
///
/// When a push would exceed `max_samples`, the oldest samples are dropped
/// first (strict FIFO head-drop): after any push the ring holds the last
/// `max_samples` samples of everything ever pushed.
pub struct AudioRing {
    buffer: Mutex<VecDeque<f32>>,
    sample_rate: u32,
    max_samples: usize,
}

impl AudioRing {
    /// Creates a ring retaining at most `max_seconds` of audio.
    pub fn new(max_seconds: u32, sample_rate: u32) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::new()),
            sample_rate,
            max_samples: max_seconds as usize * sample_rate as usize,
        }
    }

    /// Appends 16-bit PCM samples, normalising each to [-1.0, 1.0].
    ///
    /// The divisor is 32768 (not 32767): symmetric for the common case,
    /// off by one ULP for i16::MIN. Downstream models expect exactly this
    /// normalisation.
    pub fn push_pcm16(&self, samples: &[i16]) {
        let mut buffer = self.buffer.lock().unwrap();
        for &sample in samples {
            buffer.push_back(sample as f32 / 32768.0);
        }
        Self::trim(&mut buffer, self.max_samples);
    }

    /// Appends float samples without conversion.
    pub fn push_float(&self, samples: &[f32]) {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.extend(samples.iter().copied());
        Self::trim(&mut buffer, self.max_samples);
    }

    /// Copies up to `out.len()` samples from the head into `out`.
    ///
    /// Returns the number of samples copied. With `consume` set, the
    /// copied samples are removed from the ring.
    pub fn get(&self, out: &mut [f32], consume: bool) -> usize {
        let mut buffer = self.buffer.lock().unwrap();
        let count = out.len().min(buffer.len());
        for (slot, &sample) in out.iter_mut().zip(buffer.iter()) {
            *slot = sample;
        }
        if consume {
            buffer.drain(..count);
        }
        count
    }

    /// Returns a copy of all buffered samples without mutation.
    pub fn snapshot_all(&self) -> Vec<f32> {
        let buffer = self.buffer.lock().unwrap();
        buffer.iter().copied().collect()
    }

    /// Returns the tail of the buffer spanning at most `ms` milliseconds.
    pub fn snapshot_last_ms(&self, ms: u64) -> Vec<f32> {
        let buffer = self.buffer.lock().unwrap();
        let wanted = (ms as usize * self.sample_rate as usize) / 1000;
        let count = wanted.min(buffer.len());
        buffer.iter().skip(buffer.len() - count).copied().collect()
    }

    /// Removes all buffered samples.
    pub fn clear(&self) {
        self.buffer.lock().unwrap().clear();
    }

    /// Number of buffered samples.
    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    /// True when no samples are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffered duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        (self.len() as u64 * 1000) / self.sample_rate as u64
    }

    /// True when at least `min_ms` of audio is buffered.
    pub fn has_min_duration(&self, min_ms: u64) -> bool {
        self.duration_ms() >= min_ms
    }

    fn trim(buffer: &mut VecDeque<f32>, max_samples: usize) {
        if buffer.len() > max_samples {
            let excess = buffer.len() - max_samples;
            buffer.drain(..excess);
        }
    }
}
