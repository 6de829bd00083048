//! Edge-driven bit sampler.
//!
//! The sampler turns a stream of timestamped line transitions into mid-bit
//! samples at the configured bit rate. It hunts for the transmission start
//! sequence out of idle bus, locks the bit clock onto the FSS bit, resyncs
//! on every byte start sequence, and yields one [FrameRun] per frame with
//! every consumed cell's sample range recorded.

use tracing::{debug, trace};

use crate::clock::Monotonic;
use crate::config::Config;
use crate::edge::EdgeSource;
use crate::error::Result;
use crate::frame::{FRAME_CRC_BYTES, HEADER_BYTES, PAYLOAD_LEN_BITS, PAYLOAD_LEN_OFFSET, TSS_BITS};
use crate::level::Level;

/// Bit times of continuous recessive level that count as idle bus.
pub const MIN_IDLE_BITS: u64 = 9;

/// Inclusive sample range of one or more consumed bit cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleRange {
    pub start: u64,
    pub end: u64,
}

/// A decoded physical bit: the cell's sample range and the level read at
/// its mid point, as a data bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecoderBit {
    pub start_sample: u64,
    pub end_sample: u64,
    pub value: bool,
}

/// Why a frame run ended before a clean frame end sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncFault {
    /// The byte start sequence ahead of byte `byte` was violated. Also
    /// covers the line falling idle mid-frame, which reads as a missing
    /// dominant BSS cell.
    Bss { byte: usize },
    /// The frame end sequence was violated.
    Fes,
}

/// One frame's worth of sampled cells.
///
/// `bits` holds the data bits only, byte start sequences already stripped;
/// bits within one byte abut, with the two BSS cells between bytes leaving
/// a gap in the sample ranges. A run with `fault` set was cut short and
/// carries however many whole bytes were decoded before the fault.
#[derive(Clone, Debug)]
pub struct FrameRun {
    /// Transmission start sequence cells.
    pub tss: SampleRange,
    /// Frame start sequence cell.
    pub fss: SampleRange,
    /// Byte start sequence cells, one entry per decoded byte.
    pub bss: Vec<SampleRange>,
    /// Data bits in wire order.
    pub bits: Vec<DecoderBit>,
    /// Frame end sequence cells, present on a clean end.
    pub fes: Option<SampleRange>,
    pub fault: Option<SyncFault>,
}

/// Tracks the logical line level over time from an edge stream.
///
/// Levels are queried at strictly advancing sample points, so the tracker
/// only ever walks forward, applying edges up to the queried sample. Once
/// the source is exhausted the last level is held indefinitely, which turns
/// the end of a capture into idle bus.
struct LevelTracker<S> {
    source: S,
    inverted: bool,
    level: Level,
    /// Sample of the transition that produced `level`.
    since: u64,
    pending: Option<(u64, Level)>,
    exhausted: bool,
    order: Monotonic,
}

impl<S: EdgeSource> LevelTracker<S> {
    fn new(source: S, inverted: bool) -> Self {
        LevelTracker {
            source,
            inverted,
            level: Level::Recessive,
            since: 0,
            pending: None,
            exhausted: false,
            order: Monotonic::default(),
        }
    }

    /// Pull edges until a level-changing one is buffered or the source runs
    /// dry. Edges that restate the current level are dropped.
    fn fetch(&mut self) -> Result<()> {
        while self.pending.is_none() && !self.exhausted {
            match self.source.next_edge()? {
                None => self.exhausted = true,
                Some(edge) => {
                    self.order.observe(edge.sample)?;
                    let level = Level::from_physical(edge.high, self.inverted);
                    if level != self.level {
                        self.pending = Some((edge.sample, level));
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply and return the next transition, or `None` once the stream is
    /// exhausted with no transition left.
    fn take_transition(&mut self) -> Result<Option<(u64, Level)>> {
        self.fetch()?;
        match self.pending.take() {
            Some((sample, level)) => {
                self.level = level;
                self.since = sample;
                Ok(Some((sample, level)))
            }
            None => Ok(None),
        }
    }

    /// Level of the line at `sample`, applying any transitions up to and
    /// including that sample.
    fn level_at(&mut self, sample: u64) -> Result<Level> {
        loop {
            self.fetch()?;
            match self.pending {
                Some((at, level)) if at <= sample => {
                    self.pending = None;
                    self.level = level;
                    self.since = at;
                }
                _ => return Ok(self.level),
            }
        }
    }
}

/// Converts an edge stream into per-frame [FrameRun]s.
pub struct Sampler<S> {
    tracker: LevelTracker<S>,
    samples_per_bit: u64,
}

impl<S: EdgeSource> Sampler<S> {
    #[must_use]
    pub fn new(source: S, config: &Config) -> Self {
        Sampler {
            tracker: LevelTracker::new(source, config.inverted),
            samples_per_bit: config.samples_per_bit(),
        }
    }

    /// Hunt for the next frame and sample it, or return `None` once the
    /// edge stream is exhausted with no further frame start in it.
    ///
    /// # Errors
    /// [crate::Error::EdgeOrder] if the source delivers edges out of order,
    /// or whatever fatal error the source itself raises.
    pub fn next_frame(&mut self) -> Result<Option<FrameRun>> {
        loop {
            let Some((tss_start, fss_start)) = self.hunt_tss()? else {
                return Ok(None);
            };
            match self.sample_frame(tss_start, fss_start)? {
                Some(run) => return Ok(Some(run)),
                // FSS did not hold recessive; keep hunting
                None => continue,
            }
        }
    }

    /// Find idle bus followed by a TSS-length dominant run and the
    /// dominant-to-recessive transition that opens the FSS bit. Returns
    /// the TSS start and FSS start samples.
    fn hunt_tss(&mut self) -> Result<Option<(u64, u64)>> {
        let spb = self.samples_per_bit;
        loop {
            if self.tracker.level == Level::Dominant {
                if self.tracker.take_transition()?.is_none() {
                    return Ok(None);
                }
                continue;
            }
            let quiet_since = self.tracker.since;
            let Some((tss_start, _)) = self.tracker.take_transition()? else {
                return Ok(None);
            };
            let Some((fss_start, _)) = self.tracker.take_transition()? else {
                return Ok(None);
            };
            let quiet = tss_start - quiet_since;
            let dominant = fss_start - tss_start;
            if quiet >= MIN_IDLE_BITS * spb && dominant >= TSS_BITS as u64 * spb {
                return Ok(Some((tss_start, fss_start)));
            }
            trace!(quiet, dominant, at = tss_start, "tss candidate rejected");
        }
    }

    /// Sample one frame with the bit clock anchored at `fss_start`.
    /// Returns `None` if the FSS bit does not read recessive at its mid
    /// point, in which case the hunt continues.
    fn sample_frame(&mut self, tss_start: u64, fss_start: u64) -> Result<Option<FrameRun>> {
        let spb = self.samples_per_bit;
        // Cell k spans [origin + k*spb, origin + (k+1)*spb); the FSS bit is
        // cell 0 and its mid point is the first sample point.
        let mut origin = fss_start;

        if self.tracker.level_at(origin + spb / 2)? != Level::Recessive {
            trace!(at = fss_start, "fss bit not recessive");
            return Ok(None);
        }

        let mut run = FrameRun {
            tss: SampleRange {
                start: tss_start,
                end: fss_start - 1,
            },
            fss: SampleRange {
                start: origin,
                end: origin + spb - 1,
            },
            bss: Vec::new(),
            bits: Vec::new(),
            fes: None,
            fault: None,
        };

        let mut expected_bytes: Option<usize> = None;
        let mut byte = 0usize;
        loop {
            // Two BSS cells ahead of every byte.
            let bss_cell = 1 + 10 * byte as u64;
            let bss_start = origin + bss_cell * spb;
            if self.tracker.level_at(bss_start + spb / 2)? != Level::Dominant {
                debug!(byte, at = bss_start, "bss dominant cell violated");
                run.fault = Some(SyncFault::Bss { byte });
                break;
            }
            let boundary = origin + (bss_cell + 1) * spb;
            if self.tracker.level_at(boundary + spb / 2)? != Level::Recessive {
                debug!(byte, at = boundary, "bss recessive cell violated");
                run.fault = Some(SyncFault::Bss { byte });
                break;
            }
            // The dominant-to-recessive transition inside the BSS is the
            // resync reference. Snap the bit clock to it when the drift is
            // within half a bit.
            let observed = self.tracker.since;
            if observed != boundary && observed.abs_diff(boundary) <= spb / 2 {
                trace!(byte, drift = boundary.abs_diff(observed), "bss resync");
                if observed >= boundary {
                    origin += observed - boundary;
                } else {
                    origin -= boundary - observed;
                }
            }
            run.bss.push(SampleRange {
                start: bss_start,
                end: origin + (bss_cell + 2) * spb - 1,
            });

            for i in 0..8 {
                let start = origin + (bss_cell + 2 + i) * spb;
                let value = self.tracker.level_at(start + spb / 2)?.bit();
                run.bits.push(DecoderBit {
                    start_sample: start,
                    end_sample: start + spb - 1,
                    value,
                });
            }
            byte += 1;

            if byte == HEADER_BYTES && expected_bytes.is_none() {
                let words = run.bits[PAYLOAD_LEN_OFFSET..PAYLOAD_LEN_OFFSET + PAYLOAD_LEN_BITS]
                    .iter()
                    .fold(0usize, |acc, b| (acc << 1) | usize::from(b.value));
                expected_bytes = Some(HEADER_BYTES + 2 * words + FRAME_CRC_BYTES);
                trace!(words, "payload length sampled");
            }

            if expected_bytes == Some(byte) {
                let fes_cell = 1 + 10 * byte as u64;
                let fes_start = origin + fes_cell * spb;
                let dominant = self.tracker.level_at(fes_start + spb / 2)?;
                let recessive = self.tracker.level_at(fes_start + spb + spb / 2)?;
                if dominant == Level::Dominant && recessive == Level::Recessive {
                    run.fes = Some(SampleRange {
                        start: fes_start,
                        end: fes_start + 2 * spb - 1,
                    });
                } else {
                    debug!(at = fes_start, "fes violated");
                    run.fault = Some(SyncFault::Fes);
                }
                break;
            }
        }

        debug!(
            bytes = byte,
            bits = run.bits.len(),
            clean = run.fault.is_none(),
            "frame run sampled"
        );
        Ok(Some(run))
    }
}

impl<S: EdgeSource> IntoIterator for Sampler<S> {
    type Item = Result<FrameRun>;
    type IntoIter = FrameRunIter<S>;

    fn into_iter(self) -> Self::IntoIter {
        FrameRunIter { sampler: self }
    }
}

/// Iterates frame runs from a [Sampler]. The iterator ends at edge stream
/// exhaustion; errors are passed through for the consumer to handle.
pub struct FrameRunIter<S> {
    sampler: Sampler<S>,
}

impl<S: EdgeSource> Iterator for FrameRunIter<S> {
    type Item = Result<FrameRun>;

    fn next(&mut self) -> Option<Self::Item> {
        self.sampler.next_frame().transpose()
    }
}
