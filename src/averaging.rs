//! Batch averaging of raw samples.
//!
//! Bursts of raw frames are smoothed with per-channel fixed-capacity windows
//! before a reading is surfaced, trading one batch interval of latency for
//! display/log jitter reduction. Batches do not overlap: an emission happens
//! only after a full `batch_size` of new frames, never on every sample.

use std::collections::VecDeque;

use crate::core::{AveragedSample, Channel, RawFrame, CHANNEL_COUNT};

/// Per-channel rolling windows plus the shared batch counter.
///
/// One counter is driven by complete frame arrivals; each channel's mean is
/// taken over its own window contents, so a reference channel that reports
/// less often than the sensors neither stalls emission nor skews the means.
#[derive(Debug)]
pub struct AveragingBuffer {
    windows: [VecDeque<f64>; CHANNEL_COUNT],
    reference: VecDeque<f64>,
    batch_size: usize,
    counter: usize,
}

impl AveragingBuffer {
    /// Create a buffer with the given batch size (window capacity).
    ///
    /// A `batch_size` of 1 disables smoothing: every frame emits.
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            windows: std::array::from_fn(|_| VecDeque::with_capacity(batch_size)),
            reference: VecDeque::with_capacity(batch_size),
            batch_size,
            counter: 0,
        }
    }

    /// Append one raw value to a channel's window, evicting the oldest entry
    /// at capacity.
    pub fn push(&mut self, channel: Channel, value: f64) {
        Self::push_window(&mut self.windows[channel.index()], self.batch_size, value);
    }

    /// Append a reference probe value.
    pub fn push_reference(&mut self, value: f64) {
        Self::push_window(&mut self.reference, self.batch_size, value);
    }

    /// Push every value of a decoded frame.
    pub fn push_frame(&mut self, frame: &RawFrame) {
        for ch in Channel::ALL {
            self.push(ch, frame.temps[ch.index()]);
        }
        if let Some(reference) = frame.reference {
            self.push_reference(reference);
        }
    }

    /// Call once per complete frame arrival.
    ///
    /// Increments the batch counter; when it reaches the batch size, resets
    /// it and returns the mean of each channel's current window contents.
    /// Otherwise returns `None` (no output this round).
    pub fn tick(&mut self) -> Option<AveragedSample> {
        self.counter += 1;
        if self.counter < self.batch_size {
            return None;
        }
        self.counter = 0;

        let mut temps = [0.0; CHANNEL_COUNT];
        for (mean, window) in temps.iter_mut().zip(&self.windows) {
            // A sensor window that never received a sample reads as 0.0, the
            // same as an unconnected probe.
            *mean = Self::mean(window).unwrap_or(0.0);
        }
        let reference = Self::mean(&self.reference);

        Some(AveragedSample { temps, reference })
    }

    fn push_window(window: &mut VecDeque<f64>, capacity: usize, value: f64) {
        if window.len() == capacity {
            window.pop_front();
        }
        window.push_back(value);
    }

    fn mean(window: &VecDeque<f64>) -> Option<f64> {
        if window.is_empty() {
            return None;
        }
        Some(window.iter().sum::<f64>() / window.len() as f64)
    }
}
