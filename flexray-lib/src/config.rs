use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Decoder configuration, read once at construction.
///
/// The decoder itself owns no persistent state; hosts that store settings do
/// so outside this crate and rebuild a `Config` on load.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// Opaque host capture channel identifier.
    pub channel: u32,
    /// Channel bit rate in bits per second.
    pub bit_rate: u32,
    /// Capture sample rate in samples per second. Must be at least four
    /// times the bit rate so mid-bit sampling has room to work with.
    pub sample_rate: u32,
    /// Swap the recessive/dominant mapping of the physical line.
    pub inverted: bool,
    /// Also emit TSS/FSS/BSS/FES sequence records, not only field records.
    pub framing_records: bool,
}

impl Config {
    pub const MAX_BIT_RATE: u32 = 10_000_000;

    /// Create a configuration for the given rates.
    ///
    /// # Errors
    /// [Error::Config] if `bit_rate` is zero or above [Self::MAX_BIT_RATE],
    /// or if `sample_rate` is below `4 * bit_rate`.
    pub fn new(bit_rate: u32, sample_rate: u32) -> Result<Self> {
        if bit_rate == 0 || bit_rate > Self::MAX_BIT_RATE {
            return Err(Error::Config(format!(
                "bit rate {bit_rate} outside 1..={}",
                Self::MAX_BIT_RATE
            )));
        }
        if u64::from(sample_rate) < 4 * u64::from(bit_rate) {
            return Err(Error::Config(format!(
                "sample rate {sample_rate} below 4x bit rate {bit_rate}"
            )));
        }
        Ok(Config {
            channel: 0,
            bit_rate,
            sample_rate,
            inverted: false,
            framing_records: false,
        })
    }

    #[must_use]
    pub fn with_channel(mut self, channel: u32) -> Self {
        self.channel = channel;
        self
    }

    #[must_use]
    pub fn with_inverted(mut self, inverted: bool) -> Self {
        self.inverted = inverted;
        self
    }

    #[must_use]
    pub fn with_framing_records(mut self, on: bool) -> Self {
        self.framing_records = on;
        self
    }

    /// Nominal bit period in sample units.
    #[must_use]
    pub fn samples_per_bit(&self) -> u64 {
        u64::from(self.sample_rate / self.bit_rate)
    }
}
