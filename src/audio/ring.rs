//! Jitter-buffered playback ring
//!
//! A fixed-capacity circular buffer decoupling irregular network-delivered
//! audio chunks from the steady pull of the output device. Draining is held
//! off until `jitter_threshold` samples have accumulated, absorbing
//! arrival-time variance before audible playback starts.
//!
//! `write` is called from whatever task delivers synthesis chunks; `read`
//! from the audio render callback. Shared indices live behind one mutex and
//! the critical sections are index arithmetic plus a memcpy, nothing that
//! blocks.

use std::sync::Mutex;

/// Edge-triggered playback lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Buffer crossed the jitter threshold; playback is audible from here
    Started,
    /// Buffer drained to empty while primed; playback is over
    Ended,
}

#[derive(Debug)]
struct RingState {
    buf: Vec<f32>,
    read_index: usize,
    write_index: usize,
    available: usize,
    primed: bool,
}

/// Fixed-capacity sample ring with jitter buffering
#[derive(Debug)]
pub struct PlaybackRing {
    capacity: usize,
    jitter_threshold: usize,
    state: Mutex<RingState>,
}

impl PlaybackRing {
    /// Create a ring holding `capacity` samples, primed at `jitter_threshold`
    ///
    /// # Panics
    ///
    /// Panics if `jitter_threshold` exceeds `capacity` or either is zero.
    #[must_use]
    pub fn new(capacity: usize, jitter_threshold: usize) -> Self {
        assert!(capacity > 0 && jitter_threshold > 0);
        assert!(jitter_threshold <= capacity);
        Self {
            capacity,
            jitter_threshold,
            state: Mutex::new(RingState {
                buf: vec![0.0; capacity],
                read_index: 0,
                write_index: 0,
                available: 0,
                primed: false,
            }),
        }
    }

    /// Append samples, never blocking
    ///
    /// If the write would exceed capacity, the oldest unread samples are
    /// silently discarded and the read index snaps forward. Returns
    /// [`PlaybackEvent::Started`] on the write that crosses the jitter
    /// threshold, exactly once per priming.
    pub fn write(&self, samples: &[f32]) -> Option<PlaybackEvent> {
        if samples.is_empty() {
            return None;
        }

        let mut guard = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let state = &mut *guard;

        // A write larger than the ring keeps only its newest tail
        let samples = if samples.len() > self.capacity {
            &samples[samples.len() - self.capacity..]
        } else {
            samples
        };

        for &sample in samples {
            state.buf[state.write_index] = sample;
            state.write_index = (state.write_index + 1) % self.capacity;
        }

        let overflow = (state.available + samples.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            // Drop-oldest: consumer pointer snaps forward past discarded data
            state.read_index = (state.read_index + overflow) % self.capacity;
            tracing::trace!(dropped = overflow, "playback ring overflow");
        }
        state.available = (state.available + samples.len()).min(self.capacity);

        if !state.primed && state.available >= self.jitter_threshold {
            state.primed = true;
            return Some(PlaybackEvent::Started);
        }
        None
    }

    /// Drain up to `out.len()` samples at the render cadence
    ///
    /// Before priming, zero-fills and returns nothing. Once primed, an
    /// underrun zero-fills the shortfall; draining to empty reports
    /// [`PlaybackEvent::Ended`] exactly once and returns to unprimed.
    pub fn read(&self, out: &mut [f32]) -> Option<PlaybackEvent> {
        let mut guard = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let state = &mut *guard;

        if !state.primed {
            out.fill(0.0);
            return None;
        }

        let take = out.len().min(state.available);
        for slot in out.iter_mut().take(take) {
            *slot = state.buf[state.read_index];
            state.read_index = (state.read_index + 1) % self.capacity;
        }
        out[take..].fill(0.0);
        state.available -= take;

        if state.available == 0 {
            state.primed = false;
            return Some(PlaybackEvent::Ended);
        }
        None
    }

    /// Begin draining even though the jitter threshold was never reached
    ///
    /// Used when no more audio is coming for the current utterance and a
    /// sub-threshold remainder would otherwise sit unprimed forever. Returns
    /// [`PlaybackEvent::Started`] if this call primed the ring; a no-op when
    /// the ring is empty or already primed.
    pub fn flush(&self) -> Option<PlaybackEvent> {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !state.primed && state.available > 0 {
            state.primed = true;
            return Some(PlaybackEvent::Started);
        }
        None
    }

    /// Clear all state back to empty and unprimed
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        state.read_index = 0;
        state.write_index = 0;
        state.available = 0;
        state.primed = false;
    }

    /// Count of unread samples
    #[must_use]
    pub fn available(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .available
    }

    /// Whether the jitter threshold has been reached and playback is live
    #[must_use]
    pub fn is_primed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .primed
    }

    /// Ring capacity in samples
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_primed_until_jitter_threshold() {
        let ring = PlaybackRing::new(100, 20);

        assert_eq!(ring.write(&[0.1; 19]), None);
        assert!(!ring.is_primed());

        // Reads before priming zero-fill and report nothing
        let mut out = [1.0; 8];
        assert_eq!(ring.read(&mut out), None);
        assert_eq!(out, [0.0; 8]);
        assert_eq!(ring.available(), 19);

        // Crossing the threshold fires Started exactly once
        assert_eq!(ring.write(&[0.1; 1]), Some(PlaybackEvent::Started));
        assert!(ring.is_primed());
        assert_eq!(ring.write(&[0.1; 5]), None);
    }

    #[test]
    fn drain_to_empty_fires_ended_once() {
        let ring = PlaybackRing::new(100, 20);
        assert_eq!(ring.write(&[0.5; 20]), Some(PlaybackEvent::Started));

        let mut out = [0.0; 15];
        assert_eq!(ring.read(&mut out), None);
        assert!((out[0] - 0.5).abs() < f32::EPSILON);

        // Underrun: only 5 left, rest zero-filled, Ended fires
        let mut out = [1.0; 15];
        assert_eq!(ring.read(&mut out), Some(PlaybackEvent::Ended));
        assert!((out[4] - 0.5).abs() < f32::EPSILON);
        assert_eq!(out[5], 0.0);
        assert!(!ring.is_primed());

        // Further reads are silent, no second Ended
        let mut out = [1.0; 15];
        assert_eq!(ring.read(&mut out), None);
        assert_eq!(out, [0.0; 15]);
    }

    #[test]
    fn overflow_drops_oldest_and_bounds_available() {
        let ring = PlaybackRing::new(10, 2);

        let first: Vec<f32> = (0..8u8).map(f32::from).collect();
        ring.write(&first);
        let second: Vec<f32> = (8..14u8).map(f32::from).collect();
        ring.write(&second);

        // 14 written into capacity 10: oldest 4 dropped
        assert_eq!(ring.available(), 10);

        let mut out = [0.0; 10];
        ring.read(&mut out);
        let expected: Vec<f32> = (4..14u8).map(f32::from).collect();
        assert_eq!(out.to_vec(), expected);
    }

    #[test]
    fn single_write_larger_than_capacity_keeps_newest_tail() {
        let ring = PlaybackRing::new(10, 2);
        let big: Vec<f32> = (0..25u8).map(f32::from).collect();
        ring.write(&big);

        assert_eq!(ring.available(), 10);
        let mut out = [0.0; 10];
        ring.read(&mut out);
        let expected: Vec<f32> = (15..25u8).map(f32::from).collect();
        assert_eq!(out.to_vec(), expected);
    }

    #[test]
    fn reset_clears_primed_state() {
        let ring = PlaybackRing::new(100, 20);
        ring.write(&[0.5; 50]);
        assert!(ring.is_primed());

        ring.reset();
        assert!(!ring.is_primed());
        assert_eq!(ring.available(), 0);

        // Priming works again after reset
        assert_eq!(ring.write(&[0.5; 20]), Some(PlaybackEvent::Started));
    }

    #[test]
    fn flush_primes_a_sub_threshold_remainder() {
        let ring = PlaybackRing::new(100, 20);
        assert_eq!(ring.write(&[0.5; 10]), None);
        assert!(!ring.is_primed());

        assert_eq!(ring.flush(), Some(PlaybackEvent::Started));
        assert!(ring.is_primed());

        let mut out = [0.0; 10];
        assert_eq!(ring.read(&mut out), Some(PlaybackEvent::Ended));
        assert!((out[9] - 0.5).abs() < f32::EPSILON);

        // Empty or already primed: flush is a no-op
        assert_eq!(ring.flush(), None);
        ring.write(&[0.5; 20]);
        assert_eq!(ring.flush(), None);
    }

    #[test]
    fn reprimes_after_mid_stream_underrun() {
        let ring = PlaybackRing::new(100, 20);
        ring.write(&[0.5; 20]);
        let mut out = [0.0; 20];
        assert_eq!(ring.read(&mut out), Some(PlaybackEvent::Ended));

        // Next burst must cross the threshold again before playing
        assert_eq!(ring.write(&[0.5; 19]), None);
        assert_eq!(ring.write(&[0.5; 1]), Some(PlaybackEvent::Started));
    }
}
