//! Decoded output records.
//!
//! One [FieldRecord] is emitted per decoded frame field, annotated with the
//! inclusive sample range the field occupied on the wire. The kinds and the
//! meaning of `data1`/`data2` per kind form the stable interface consumed by
//! exporters and display layers.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What a [FieldRecord] describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FieldKind {
    /// Transmission start sequence run.
    Tss,
    /// Frame start sequence bit.
    Fss,
    /// Byte start sequence ahead of one byte; `data2` is the byte index.
    Bss,
    /// Frame end sequence pair.
    Fes,
    /// Indicator bits; `data1` packs preamble/null/sync/startup.
    Flags,
    /// Frame identifier; `data1` is the 11-bit id.
    FrameId,
    /// Payload length; `data1` is the 16-bit word count.
    PayloadLength,
    /// Header checksum; `data1` is the value seen on the wire.
    HeaderCrc,
    /// Communication cycle counter; `data1` is the 6-bit count.
    CycleCount,
    /// One payload byte; `data1` is the value, `data2` the payload index.
    DataByte,
    /// Frame checksum; `data1` is the value seen on the wire.
    FrameCrc,
}

impl FieldKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Tss => "TSS",
            FieldKind::Fss => "FSS",
            FieldKind::Bss => "BSS",
            FieldKind::Fes => "FES",
            FieldKind::Flags => "FLAGS",
            FieldKind::FrameId => "FRAME_ID",
            FieldKind::PayloadLength => "PAYLOAD_LENGTH",
            FieldKind::HeaderCrc => "HEADER_CRC",
            FieldKind::CycleCount => "CYCLE_COUNT",
            FieldKind::DataByte => "DATA_BYTE",
            FieldKind::FrameCrc => "FRAME_CRC",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error annotations carried by a record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RecordFlags(u8);

impl RecordFlags {
    pub const NONE: RecordFlags = RecordFlags(0);
    /// Checksum on the wire disagrees with the recomputed value.
    pub const CRC_ERROR: RecordFlags = RecordFlags(1 << 0);
    /// Field value is illegal for the protocol.
    pub const PROTOCOL_ERROR: RecordFlags = RecordFlags(1 << 1);

    #[must_use]
    pub fn contains(self, other: RecordFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: RecordFlags) {
        self.0 |= other.0;
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for RecordFlags {
    type Output = RecordFlags;

    fn bitor(self, rhs: RecordFlags) -> RecordFlags {
        RecordFlags(self.0 | rhs.0)
    }
}

/// One decoded field with its position in the capture.
///
/// `start_sample..=end_sample` is the inclusive sample range of the cells
/// the field was decoded from. Records reach the sink in non-decreasing
/// `start_sample` order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldRecord {
    pub kind: FieldKind,
    pub data1: u32,
    pub data2: u32,
    pub flags: RecordFlags,
    pub start_sample: u64,
    pub end_sample: u64,
}

impl FieldRecord {
    #[must_use]
    pub fn new(kind: FieldKind, data1: u32, data2: u32, start_sample: u64, end_sample: u64) -> Self {
        FieldRecord {
            kind,
            data1,
            data2,
            flags: RecordFlags::NONE,
            start_sample,
            end_sample,
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: RecordFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl std::fmt::Display for FieldRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} data1={:#x} data2={} flags={:#04b} samples={}..={}",
            self.kind, self.data1, self.data2, self.flags.bits(), self.start_sample, self.end_sample
        )
    }
}
