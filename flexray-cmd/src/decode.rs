use std::fs::File;
use std::io::{stdout, BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use flexray::clock::SampleClock;
use flexray::config::Config;
use flexray::edge::{Edge, EdgeReplay};
use flexray::sink::MemorySink;

#[derive(Debug, Clone)]
pub enum Format {
    Text,
    Csv,
    Json,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Text, Self::Csv, Self::Json]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
            Self::Csv => Some(clap::builder::PossibleValue::new("csv")),
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
        }
    }
}

/// Parse a `<sample>,<level>` capture file into an edge list.
fn read_capture(path: &Path) -> Result<Vec<Edge>> {
    let file = File::open(path).with_context(|| format!("opening {path:?}"))?;
    let mut edges = Vec::new();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("reading capture")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((sample, level)) = line.split_once(',') else {
            bail!("line {}: expected <sample>,<level>", lineno + 1);
        };
        let sample: u64 = sample
            .trim()
            .parse()
            .with_context(|| format!("line {}: bad sample index", lineno + 1))?;
        let high = match level.trim() {
            "0" => false,
            "1" => true,
            other => bail!("line {}: bad level {other:?}", lineno + 1),
        };
        edges.push(Edge::new(sample, high));
    }
    debug!(count = edges.len(), "capture parsed");
    Ok(edges)
}

pub fn do_decode(
    input: &Path,
    format: &Format,
    bit_rate: u32,
    sample_rate: u32,
    channel: u32,
    inverted: bool,
    framing: bool,
) -> Result<()> {
    let config = Config::new(bit_rate, sample_rate)
        .context("bad rate options")?
        .with_channel(channel)
        .with_inverted(inverted)
        .with_framing_records(framing);

    let edges = read_capture(input)?;
    let mut sink = MemorySink::default();
    let summary = flexray::decode(&config, EdgeReplay::new(edges), &mut sink)
        .context("decoding capture")?;

    let clock = SampleClock::new(sample_rate);
    let mut out = stdout().lock();
    match format {
        Format::Text => {
            for record in sink.records() {
                writeln!(out, "{:.9}s {record}", clock.seconds_at(record.start_sample))?;
            }
        }
        Format::Csv => {
            writeln!(out, "kind,data1,data2,flags,start_sample,end_sample")?;
            for record in sink.records() {
                writeln!(
                    out,
                    "{},{},{},{},{},{}",
                    record.kind,
                    record.data1,
                    record.data2,
                    record.flags.bits(),
                    record.start_sample,
                    record.end_sample
                )?;
            }
        }
        Format::Json => {
            serde_json::to_writer_pretty(&mut out, &sink.records())
                .context("serializing records to json")?;
            writeln!(out)?;
        }
    }

    info!(
        frames = summary.frames,
        sync_errors = summary.sync_errors,
        crc_errors = summary.crc_errors,
        protocol_errors = summary.protocol_errors,
        "decode finished"
    );
    Ok(())
}
