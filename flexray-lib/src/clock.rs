//! Sample index and wall clock conversions.

use crate::error::{Error, Result};

/// Converts between capture sample indices and seconds.
#[derive(Clone, Copy, Debug)]
pub struct SampleClock {
    sample_rate: u32,
}

impl SampleClock {
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        SampleClock { sample_rate }
    }

    /// Seconds elapsed at `sample` since the start of the capture.
    #[must_use]
    pub fn seconds_at(&self, sample: u64) -> f64 {
        sample as f64 / f64::from(self.sample_rate)
    }

    /// Nearest sample index to `seconds` into the capture.
    #[must_use]
    pub fn sample_at(&self, seconds: f64) -> u64 {
        (seconds * f64::from(self.sample_rate)).round() as u64
    }
}

/// Tracks a sample-index sequence that must never move backwards.
///
/// Edge capture layers feed sample indices in non-decreasing order; a
/// regression means the producer is broken and decoding cannot continue.
#[derive(Debug, Default)]
pub struct Monotonic {
    last: Option<u64>,
}

impl Monotonic {
    /// Record `sample`, rejecting regressions.
    ///
    /// # Errors
    /// [Error::EdgeOrder] if `sample` is below the last observed index.
    pub fn observe(&mut self, sample: u64) -> Result<()> {
        if let Some(last) = self.last {
            if sample < last {
                return Err(Error::EdgeOrder {
                    sample,
                    previous: last,
                });
            }
        }
        self.last = Some(sample);
        Ok(())
    }
}
