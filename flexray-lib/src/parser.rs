//! Frame field parsing.
//!
//! The parser walks the bit runs produced by the [Sampler](crate::sampler::Sampler)
//! and emits one [FieldRecord] per frame field, validating the two checksums
//! and the field value constraints as it goes. Checksum and value problems
//! never abort a frame; they only flag the offending record. A run cut
//! short by a sync fault emits the fields that were fully sampled and then
//! cancels the frame's packet, leaving no partial frame in durable output.
//!
//! # Example
//! ```no_run
//! use flexray::config::Config;
//! use flexray::edge::EdgeReplay;
//! use flexray::sink::MemorySink;
//!
//! let config = Config::new(10_000_000, 40_000_000).unwrap();
//! let edges = EdgeReplay::new(load_capture());
//! let mut sink = MemorySink::default();
//! let summary = flexray::decode(&config, edges, &mut sink).unwrap();
//! println!("{} frames, {} sync errors", summary.frames, summary.sync_errors);
//! # fn load_capture() -> Vec<flexray::edge::Edge> { vec![] }
//! ```

use tracing::debug;

use crate::bits::from_bits;
use crate::config::Config;
use crate::crc::Crc;
use crate::edge::EdgeSource;
use crate::error::Result;
use crate::frame::{
    CYCLE_BITS, CYCLE_OFFSET, FLAGS_BITS, FLAGS_OFFSET, HCRC_BITS, HCRC_OFFSET, HEADER_BITS,
    ID_BITS, ID_OFFSET, PAYLOAD_LEN_BITS, PAYLOAD_LEN_OFFSET,
};
use crate::record::{FieldKind, FieldRecord, RecordFlags};
use crate::sampler::{DecoderBit, FrameRun, Sampler};
use crate::sink::ResultSink;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How one frame run parsed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameOutcome {
    /// Every field through the frame CRC was present and the frame ended
    /// with a clean FES.
    pub complete: bool,
    /// Records emitted for this frame.
    pub records: usize,
    pub crc_error: bool,
    pub protocol_error: bool,
}

/// Counters for one decode pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DecodeSummary {
    /// Frames parsed to completion and committed.
    pub frames: usize,
    /// Frame runs abandoned on a TSS/BSS/FES fault.
    pub sync_errors: usize,
    /// Completed frames carrying at least one checksum mismatch.
    pub crc_errors: usize,
    /// Completed frames carrying at least one illegal field value.
    pub protocol_errors: usize,
    /// Total records committed.
    pub records: usize,
}

/// Parses frame runs into annotated field records.
pub struct FrameParser {
    header_crc: Crc,
    frame_crc: Crc,
    framing_records: bool,
}

impl FrameParser {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        FrameParser {
            header_crc: Crc::header(),
            frame_crc: Crc::frame(),
            framing_records: config.framing_records,
        }
    }

    /// Parse one frame run and deliver its records to `sink`.
    ///
    /// The frame is bracketed in a packet: completed frames commit it,
    /// abandoned frames cancel it.
    ///
    /// # Errors
    /// Only internal invariant failures; malformed frames are reported
    /// through record flags and the returned outcome.
    pub fn parse_run(&self, run: &FrameRun, sink: &mut dyn ResultSink) -> Result<FrameOutcome> {
        let values: Vec<bool> = run.bits.iter().map(|b| b.value).collect();
        let mut records = Vec::new();
        let mut outcome = FrameOutcome::default();

        let complete = self.field_records(run, &values, &mut records, &mut outcome)?;

        if self.framing_records {
            records.push(FieldRecord::new(
                FieldKind::Tss,
                0,
                0,
                run.tss.start,
                run.tss.end,
            ));
            records.push(FieldRecord::new(
                FieldKind::Fss,
                0,
                0,
                run.fss.start,
                run.fss.end,
            ));
            for (i, bss) in run.bss.iter().enumerate() {
                records.push(FieldRecord::new(FieldKind::Bss, 0, i as u32, bss.start, bss.end));
            }
            if let Some(fes) = run.fes {
                records.push(FieldRecord::new(FieldKind::Fes, 0, 0, fes.start, fes.end));
            }
            records.sort_by_key(|r| r.start_sample);
        }

        outcome.complete = complete && run.fault.is_none() && run.fes.is_some();
        outcome.records = records.len();

        sink.open_packet();
        for record in records {
            sink.commit(record);
        }
        if outcome.complete {
            sink.commit_packet();
        } else {
            debug!(records = outcome.records, fault = ?run.fault, "frame abandoned");
            sink.cancel_packet();
        }
        Ok(outcome)
    }

    /// Emit the value field records that are fully covered by `values`.
    /// Returns true when every field through the frame CRC was emitted.
    fn field_records(
        &self,
        run: &FrameRun,
        values: &[bool],
        records: &mut Vec<FieldRecord>,
        outcome: &mut FrameOutcome,
    ) -> Result<bool> {
        let span = |first: usize, count: usize| span_of(&run.bits, first, count);

        if values.len() < FLAGS_OFFSET + FLAGS_BITS {
            return Ok(false);
        }
        // reserved bit transmitted first, ignored; the four indicators
        // pack preamble high to startup low
        let indicators = from_bits(values, FLAGS_OFFSET + 1, FLAGS_BITS - 1)?;
        let null_frame = values[2];
        let (start, end) = span(FLAGS_OFFSET, FLAGS_BITS);
        records.push(FieldRecord::new(FieldKind::Flags, indicators, 0, start, end));

        if values.len() < ID_OFFSET + ID_BITS {
            return Ok(false);
        }
        let frame_id = from_bits(values, ID_OFFSET, ID_BITS)?;
        let mut flags = RecordFlags::NONE;
        if frame_id == 0 {
            flags.insert(RecordFlags::PROTOCOL_ERROR);
            outcome.protocol_error = true;
        }
        let (start, end) = span(ID_OFFSET, ID_BITS);
        records.push(FieldRecord::new(FieldKind::FrameId, frame_id, 0, start, end).with_flags(flags));

        if values.len() < PAYLOAD_LEN_OFFSET + PAYLOAD_LEN_BITS {
            return Ok(false);
        }
        let words = from_bits(values, PAYLOAD_LEN_OFFSET, PAYLOAD_LEN_BITS)?;
        let mut flags = RecordFlags::NONE;
        if null_frame && words != 0 {
            flags.insert(RecordFlags::PROTOCOL_ERROR);
            outcome.protocol_error = true;
        }
        let (start, end) = span(PAYLOAD_LEN_OFFSET, PAYLOAD_LEN_BITS);
        records
            .push(FieldRecord::new(FieldKind::PayloadLength, words, 0, start, end).with_flags(flags));

        if values.len() < HCRC_OFFSET + HCRC_BITS {
            return Ok(false);
        }
        let wire_crc = from_bits(values, HCRC_OFFSET, HCRC_BITS)?;
        let computed = self.header_crc.compute(&values[..HCRC_OFFSET]);
        let mut flags = RecordFlags::NONE;
        if wire_crc != computed {
            debug!(wire = wire_crc, computed, "header crc mismatch");
            flags.insert(RecordFlags::CRC_ERROR);
            outcome.crc_error = true;
        }
        let (start, end) = span(HCRC_OFFSET, HCRC_BITS);
        records.push(FieldRecord::new(FieldKind::HeaderCrc, wire_crc, 0, start, end).with_flags(flags));

        if values.len() < CYCLE_OFFSET + CYCLE_BITS {
            return Ok(false);
        }
        let cycle = from_bits(values, CYCLE_OFFSET, CYCLE_BITS)?;
        let (start, end) = span(CYCLE_OFFSET, CYCLE_BITS);
        records.push(FieldRecord::new(FieldKind::CycleCount, cycle, 0, start, end));

        let payload_bytes = 2 * words as usize;
        for index in 0..payload_bytes {
            let offset = HEADER_BITS + 8 * index;
            if values.len() < offset + 8 {
                return Ok(false);
            }
            let byte = from_bits(values, offset, 8)?;
            let (start, end) = span(offset, 8);
            records.push(FieldRecord::new(
                FieldKind::DataByte,
                byte,
                index as u32,
                start,
                end,
            ));
        }

        let fcrc_offset = HEADER_BITS + 8 * payload_bytes;
        if values.len() < fcrc_offset + 24 {
            return Ok(false);
        }
        let wire_crc = from_bits(values, fcrc_offset, 24)?;
        let computed = self.frame_crc.compute(&values[..fcrc_offset]);
        let mut flags = RecordFlags::NONE;
        if wire_crc != computed {
            debug!(wire = wire_crc, computed, "frame crc mismatch");
            flags.insert(RecordFlags::CRC_ERROR);
            outcome.crc_error = true;
        }
        let (start, end) = span(fcrc_offset, 24);
        records.push(FieldRecord::new(FieldKind::FrameCrc, wire_crc, 0, start, end).with_flags(flags));

        Ok(true)
    }
}

/// Sample range covered by `count` bits starting at `first`.
fn span_of(bits: &[DecoderBit], first: usize, count: usize) -> (u64, u64) {
    (
        bits[first].start_sample,
        bits[first + count - 1].end_sample,
    )
}

/// Decode a whole edge stream: sample, parse, and deliver every frame to
/// `sink`, returning the pass counters.
///
/// Frames are delivered strictly in wire order; all records of one frame
/// reach the sink before any record of the next.
///
/// # Errors
/// Fatal conditions only: edge ordering violations or a failing source.
/// Malformed frames are counted in the summary instead.
pub fn decode<S: EdgeSource>(
    config: &Config,
    source: S,
    sink: &mut dyn ResultSink,
) -> Result<DecodeSummary> {
    let mut sampler = Sampler::new(source, config);
    let parser = FrameParser::new(config);
    let mut summary = DecodeSummary::default();

    while let Some(run) = sampler.next_frame()? {
        let outcome = parser.parse_run(&run, sink)?;
        if outcome.complete {
            summary.frames += 1;
            summary.records += outcome.records;
            if outcome.crc_error {
                summary.crc_errors += 1;
            }
            if outcome.protocol_error {
                summary.protocol_errors += 1;
            }
        } else {
            summary.sync_errors += 1;
        }
    }
    debug!(
        frames = summary.frames,
        sync_errors = summary.sync_errors,
        "decode pass finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::{extend_with_bss, to_bits};
    use crate::edge::{edges_from_bits, EdgeReplay};
    use crate::frame::{Frame, FrameBuilder, TSS_BITS};
    use crate::level::Level;
    use crate::sink::MemorySink;

    fn config() -> Config {
        Config::new(10_000_000, 40_000_000).unwrap()
    }

    fn decode_bits(bits: &[bool], config: &Config) -> (DecodeSummary, MemorySink) {
        let edges = edges_from_bits(bits, config.samples_per_bit(), config.inverted);
        let mut sink = MemorySink::default();
        let summary = decode(config, EdgeReplay::new(edges), &mut sink).unwrap();
        (summary, sink)
    }

    fn capture_of(frame: &Frame) -> Vec<bool> {
        let mut bits = vec![Level::Recessive.bit(); 16];
        bits.extend(frame.encode().unwrap());
        bits
    }

    /// Wire bits for a raw header body, bypassing value validation so
    /// illegal field values can be exercised.
    fn raw_capture(indicators: [bool; 5], frame_id: u32, words: u32, cycle: u32) -> Vec<bool> {
        let mut body = indicators.to_vec();
        body.extend(to_bits(frame_id, 11));
        body.extend(to_bits(words, 7));
        let hcrc = Crc::header().compute(&body);
        body.extend(to_bits(hcrc, 11));
        body.extend(to_bits(cycle, 6));
        for i in 0..2 * words {
            body.extend(to_bits(i, 8));
        }
        let fcrc = Crc::frame().compute(&body);
        body.extend(to_bits(fcrc, 24));

        let mut bits = vec![Level::Recessive.bit(); 16];
        bits.extend(vec![Level::Dominant.bit(); TSS_BITS]);
        bits.push(Level::Recessive.bit());
        bits.extend(extend_with_bss(&body));
        bits.push(Level::Dominant.bit());
        bits.push(Level::Recessive.bit());
        bits
    }

    #[test]
    fn field_order_is_fixed() {
        let frame = FrameBuilder::new(0x44)
            .payload(&[1, 2, 3, 4])
            .build()
            .unwrap();
        let (summary, sink) = decode_bits(&capture_of(&frame), &config());

        assert_eq!(summary.frames, 1);
        let kinds: Vec<FieldKind> = sink.records().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FieldKind::Flags,
                FieldKind::FrameId,
                FieldKind::PayloadLength,
                FieldKind::HeaderCrc,
                FieldKind::CycleCount,
                FieldKind::DataByte,
                FieldKind::DataByte,
                FieldKind::DataByte,
                FieldKind::DataByte,
                FieldKind::FrameCrc,
            ]
        );
    }

    #[test]
    fn record_samples_never_regress() {
        let frame = FrameBuilder::new(0x155)
            .payload(&(0u8..32).collect::<Vec<u8>>())
            .build()
            .unwrap();
        let (_, sink) = decode_bits(&capture_of(&frame), &config());
        for pair in sink.records().windows(2) {
            assert!(pair[1].start_sample >= pair[0].start_sample);
            assert!(pair[1].start_sample > pair[0].end_sample, "fields overlap");
        }
    }

    #[test]
    fn frame_id_zero_flags_protocol_error() {
        let bits = raw_capture([false; 5], 0, 0, 0);
        let (summary, sink) = decode_bits(&bits, &config());
        assert_eq!(summary.frames, 1);
        assert_eq!(summary.protocol_errors, 1);
        let id = sink
            .records()
            .iter()
            .find(|r| r.kind == FieldKind::FrameId)
            .unwrap();
        assert!(id.flags.contains(RecordFlags::PROTOCOL_ERROR));
    }

    #[test]
    fn null_frame_with_payload_flags_length_record() {
        // null frame indicator with a one word payload
        let bits = raw_capture([false, false, true, false, false], 9, 1, 0);
        let (summary, sink) = decode_bits(&bits, &config());
        assert_eq!(summary.frames, 1);
        let len = sink
            .records()
            .iter()
            .find(|r| r.kind == FieldKind::PayloadLength)
            .unwrap();
        assert!(len.flags.contains(RecordFlags::PROTOCOL_ERROR));
        let id = sink
            .records()
            .iter()
            .find(|r| r.kind == FieldKind::FrameId)
            .unwrap();
        assert!(id.flags.is_empty(), "frame id itself is legal");
    }

    #[test]
    fn framing_records_bracket_the_fields() {
        let frame = FrameBuilder::new(3).build().unwrap();
        let config = config().with_framing_records(true);
        let (summary, sink) = decode_bits(&capture_of(&frame), &config);

        assert_eq!(summary.frames, 1);
        let kinds: Vec<FieldKind> = sink.records().iter().map(|r| r.kind).collect();
        assert_eq!(kinds.first(), Some(&FieldKind::Tss));
        assert_eq!(kinds[1], FieldKind::Fss);
        assert_eq!(kinds.last(), Some(&FieldKind::Fes));
        assert_eq!(
            kinds.iter().filter(|k| **k == FieldKind::Bss).count(),
            8,
            "one bss record per body byte"
        );
        for pair in sink.records().windows(2) {
            assert!(pair[1].start_sample >= pair[0].start_sample);
        }
    }

    #[test]
    fn summary_counts_multiple_frames() {
        let f1 = FrameBuilder::new(1).build().unwrap();
        let f2 = FrameBuilder::new(2).payload(&[9, 8]).build().unwrap();
        let mut bits = capture_of(&f1);
        bits.extend(vec![Level::Recessive.bit(); 12]);
        bits.extend(f2.encode().unwrap());
        let (summary, sink) = decode_bits(&bits, &config());

        assert_eq!(summary.frames, 2);
        assert_eq!(summary.sync_errors, 0);
        assert_eq!(summary.records, sink.records().len());
        assert_eq!(sink.packets().len(), 2);
    }
}
