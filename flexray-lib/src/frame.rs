//! Semantic frame values and the encode path.

use crate::bits::{extend_with_bss, to_bits};
use crate::crc::Crc;
use crate::error::{Error, Result};
use crate::level::Level;
use crate::record::{FieldKind, FieldRecord};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Transmission start sequence length in bit times.
pub const TSS_BITS: usize = 5;
/// Header section length in bytes: indicators, id, length, header CRC and
/// cycle count pack into exactly five bytes.
pub const HEADER_BYTES: usize = 5;
/// Header section length in bits.
pub const HEADER_BITS: usize = HEADER_BYTES * 8;
/// Frame CRC length in bytes.
pub const FRAME_CRC_BYTES: usize = 3;
/// Maximum payload length in 16-bit words.
pub const MAX_PAYLOAD_WORDS: u8 = 127;
/// Largest legal frame identifier.
pub const MAX_FRAME_ID: u16 = 2047;
/// Largest legal cycle counter value.
pub const MAX_CYCLE: u8 = 63;

/// Header field layout: bit offsets and widths within the BSS-stripped
/// frame body, in wire order.
pub(crate) const FLAGS_OFFSET: usize = 0;
pub(crate) const FLAGS_BITS: usize = 5;
pub(crate) const ID_OFFSET: usize = 5;
pub(crate) const ID_BITS: usize = 11;
pub(crate) const PAYLOAD_LEN_OFFSET: usize = 16;
pub(crate) const PAYLOAD_LEN_BITS: usize = 7;
pub(crate) const HCRC_OFFSET: usize = 23;
pub(crate) const HCRC_BITS: usize = 11;
pub(crate) const CYCLE_OFFSET: usize = 34;
pub(crate) const CYCLE_BITS: usize = 6;

/// A FlexRay frame as a value: the four indicator flags, identifier, cycle
/// counter and payload. The two checksums are derived from the other fields
/// and exposed through [Frame::header_crc] and [Frame::frame_crc].
///
/// A `Frame` is immutable once built; use [FrameBuilder] to construct one
/// with validation.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Frame {
    /// Frame identifier, 1..=2047.
    pub frame_id: u16,
    /// Payload preamble indicator; marks a network management vector or, in
    /// the dynamic segment, a message id at the start of the payload.
    pub payload_preamble: bool,
    /// Null frame indicator; a null frame carries no usable payload.
    pub null_frame: bool,
    /// Sync frame indicator.
    pub sync_frame: bool,
    /// Startup frame indicator.
    pub startup_frame: bool,
    /// Communication cycle counter, 0..=63.
    pub cycle_count: u8,
    /// Payload bytes; always an even count, two per payload word.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Payload length in 16-bit words.
    #[must_use]
    pub fn payload_length(&self) -> u8 {
        (self.payload.len() / 2) as u8
    }

    /// Check the value constraints every transmittable frame satisfies.
    ///
    /// # Errors
    /// [Error::InvalidFrame] naming the violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.frame_id == 0 || self.frame_id > MAX_FRAME_ID {
            return Err(Error::InvalidFrame(format!(
                "frame id {} outside 1..={MAX_FRAME_ID}",
                self.frame_id
            )));
        }
        if self.cycle_count > MAX_CYCLE {
            return Err(Error::InvalidFrame(format!(
                "cycle count {} outside 0..={MAX_CYCLE}",
                self.cycle_count
            )));
        }
        if self.payload.len() % 2 != 0 {
            return Err(Error::InvalidFrame(format!(
                "payload of {} bytes does not fill whole words",
                self.payload.len()
            )));
        }
        if self.payload.len() > 2 * usize::from(MAX_PAYLOAD_WORDS) {
            return Err(Error::InvalidFrame(format!(
                "payload of {} bytes exceeds {} words",
                self.payload.len(),
                MAX_PAYLOAD_WORDS
            )));
        }
        Ok(())
    }

    /// The five indicator bits in wire order: reserved (transmitted zero),
    /// payload preamble, null frame, sync frame, startup frame.
    fn indicator_bits(&self) -> [bool; 5] {
        [
            false,
            self.payload_preamble,
            self.null_frame,
            self.sync_frame,
            self.startup_frame,
        ]
    }

    /// Header bits covered by the header CRC: indicators, id, length.
    fn header_crc_input(&self) -> Vec<bool> {
        let mut bits = Vec::with_capacity(23);
        bits.extend_from_slice(&self.indicator_bits());
        bits.extend(to_bits(u32::from(self.frame_id), 11));
        bits.extend(to_bits(u32::from(self.payload_length()), PAYLOAD_LEN_BITS));
        bits
    }

    /// 11-bit header checksum over the indicator bits, id and length.
    #[must_use]
    pub fn header_crc(&self) -> u16 {
        Crc::header().compute(&self.header_crc_input()) as u16
    }

    /// Header plus payload bits, the region covered by the frame CRC.
    fn frame_crc_input(&self) -> Vec<bool> {
        let mut bits = self.header_crc_input();
        bits.extend(to_bits(u32::from(self.header_crc()), 11));
        bits.extend(to_bits(u32::from(self.cycle_count), 6));
        for &byte in &self.payload {
            bits.extend(to_bits(u32::from(byte), 8));
        }
        bits
    }

    /// 24-bit frame checksum over the whole header and payload.
    #[must_use]
    pub fn frame_crc(&self) -> u32 {
        Crc::frame().compute(&self.frame_crc_input())
    }

    /// Render the frame as the full wire bit sequence: TSS, FSS, the
    /// BSS-wrapped body, and FES. Bits follow [Level::from_bit]; replaying
    /// the sequence at the configured bit rate reproduces the frame exactly.
    ///
    /// # Errors
    /// [Error::InvalidFrame] if [Frame::validate] fails; nothing is emitted
    /// for an invalid value.
    pub fn encode(&self) -> Result<Vec<bool>> {
        self.validate()?;

        let mut body = self.frame_crc_input();
        body.extend(to_bits(self.frame_crc(), 24));
        debug_assert_eq!(body.len() % 8, 0, "frame body must fill whole bytes");

        let body_cells = body.len() + body.len() / 4;
        let mut wire = Vec::with_capacity(TSS_BITS + 1 + body_cells + 2);
        wire.resize(TSS_BITS, Level::Dominant.bit());
        wire.push(Level::Recessive.bit());
        wire.extend(extend_with_bss(&body));
        wire.push(Level::Dominant.bit());
        wire.push(Level::Recessive.bit());
        Ok(wire)
    }

    /// Rebuild a frame value from the field records of one decoded frame.
    ///
    /// Checksum and sequence records are ignored; the checksums of the
    /// returned value are recomputed on demand.
    ///
    /// # Errors
    /// [Error::InvalidFrame] if a required field record is missing, data
    /// byte indices are not contiguous from zero, or the byte count does
    /// not match the decoded payload length.
    pub fn from_records(records: &[FieldRecord]) -> Result<Frame> {
        let mut flags = None;
        let mut frame_id = None;
        let mut words = None;
        let mut cycle = None;
        let mut payload: Vec<u8> = Vec::new();

        for record in records {
            match record.kind {
                FieldKind::Flags => flags = Some(record.data1),
                FieldKind::FrameId => frame_id = Some(record.data1),
                FieldKind::PayloadLength => words = Some(record.data1),
                FieldKind::CycleCount => cycle = Some(record.data1),
                FieldKind::DataByte => {
                    if record.data2 as usize != payload.len() {
                        return Err(Error::InvalidFrame(format!(
                            "data byte index {} out of order",
                            record.data2
                        )));
                    }
                    payload.push(record.data1 as u8);
                }
                _ => {}
            }
        }

        let flags = flags.ok_or_else(|| Error::InvalidFrame("missing flags record".into()))?;
        let frame_id =
            frame_id.ok_or_else(|| Error::InvalidFrame("missing frame id record".into()))?;
        let words =
            words.ok_or_else(|| Error::InvalidFrame("missing payload length record".into()))?;
        let cycle =
            cycle.ok_or_else(|| Error::InvalidFrame("missing cycle count record".into()))?;
        if payload.len() != 2 * words as usize {
            return Err(Error::InvalidFrame(format!(
                "decoded {} payload bytes for length {words}",
                payload.len()
            )));
        }

        Ok(Frame {
            frame_id: frame_id as u16,
            payload_preamble: flags & 0b1000 != 0,
            null_frame: flags & 0b0100 != 0,
            sync_frame: flags & 0b0010 != 0,
            startup_frame: flags & 0b0001 != 0,
            cycle_count: cycle as u8,
            payload,
        })
    }
}

/// Fluent constructor for [Frame], validating on [FrameBuilder::build].
///
/// ```
/// use flexray::frame::FrameBuilder;
///
/// let frame = FrameBuilder::new(0x1c)
///     .startup_frame(true)
///     .sync_frame(true)
///     .cycle_count(17)
///     .payload(&[0x11, 0x22, 0x33, 0x44])
///     .build()
///     .unwrap();
/// assert_eq!(frame.payload_length(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct FrameBuilder {
    frame: Frame,
}

impl FrameBuilder {
    #[must_use]
    pub fn new(frame_id: u16) -> Self {
        FrameBuilder {
            frame: Frame {
                frame_id,
                payload_preamble: false,
                null_frame: false,
                sync_frame: false,
                startup_frame: false,
                cycle_count: 0,
                payload: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn payload_preamble(mut self, on: bool) -> Self {
        self.frame.payload_preamble = on;
        self
    }

    #[must_use]
    pub fn null_frame(mut self, on: bool) -> Self {
        self.frame.null_frame = on;
        self
    }

    #[must_use]
    pub fn sync_frame(mut self, on: bool) -> Self {
        self.frame.sync_frame = on;
        self
    }

    #[must_use]
    pub fn startup_frame(mut self, on: bool) -> Self {
        self.frame.startup_frame = on;
        self
    }

    #[must_use]
    pub fn cycle_count(mut self, cycle: u8) -> Self {
        self.frame.cycle_count = cycle;
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.frame.payload = payload.to_vec();
        self
    }

    /// Validate and return the finished frame.
    ///
    /// # Errors
    /// See [Frame::validate].
    pub fn build(self) -> Result<Frame> {
        self.frame.validate()?;
        Ok(self.frame)
    }
}
