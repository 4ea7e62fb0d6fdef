//! Audio frames and the capture-side chunker
//!
//! The platform callback delivers f32 samples at whatever granularity it
//! likes; the [`FrameChunker`] regroups them into fixed 20ms frames of
//! 16-bit PCM, the unit every downstream consumer works with.

/// Convert one f32 sample in [-1.0, 1.0] to signed 16-bit PCM
///
/// Symmetric scaling: positive values scale by 32767, negative by 32768,
/// input clamped first. This is the canonical conversion shared by the
/// frame producer and any consumer decoding network PCM.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn sample_to_pcm(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped >= 0.0 {
        (clamped * 32767.0) as i16
    } else {
        (clamped * 32768.0) as i16
    }
}

/// Convert one signed 16-bit PCM sample back to f32
///
/// Inverse of [`sample_to_pcm`]: divide by 32767 for non-negative values,
/// 32768 for negative ones.
#[must_use]
pub fn pcm_to_sample(pcm: i16) -> f32 {
    if pcm >= 0 {
        f32::from(pcm) / 32767.0
    } else {
        f32::from(pcm) / 32768.0
    }
}

/// A fixed-length block of 16-bit PCM samples
///
/// Immutable once produced; tagged with a monotonically increasing sequence
/// number so consumers can assert capture order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Capture-order sequence number
    pub seq: u64,
    /// PCM samples, exactly one frame's worth
    pub samples: Vec<i16>,
}

impl AudioFrame {
    /// Number of samples in the frame
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the frame is empty (never true for chunker output)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Accumulates raw f32 samples into fixed-size PCM frames
///
/// Exactly one frame is emitted per `frame_size` samples accumulated, in
/// order; the trailing incomplete remainder is retained for the next push.
#[derive(Debug)]
pub struct FrameChunker {
    frame_size: usize,
    pending: Vec<i16>,
    next_seq: u64,
}

impl FrameChunker {
    /// Create a chunker emitting frames of `frame_size` samples
    #[must_use]
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
            next_seq: 0,
        }
    }

    /// Append raw samples, returning every complete frame produced
    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend(samples.iter().copied().map(sample_to_pcm));

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_size {
            let rest = self.pending.split_off(self.frame_size);
            let samples = std::mem::replace(&mut self.pending, rest);
            frames.push(AudioFrame {
                seq: self.next_seq,
                samples,
            });
            self.next_seq += 1;
        }
        frames
    }

    /// Discard any partially accumulated samples
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Samples currently buffered short of a full frame
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
