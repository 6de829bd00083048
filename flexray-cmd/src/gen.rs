use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::info;

use flexray::config::Config;
use flexray::edge::edges_from_bits;
use flexray::frame::FrameBuilder;
use flexray::level::Level;

pub struct GenOpts {
    pub frame_id: u16,
    pub cycle: u8,
    pub payload: String,
    pub preamble: bool,
    pub null: bool,
    pub sync: bool,
    pub startup: bool,
    pub bit_rate: u32,
    pub sample_rate: u32,
    pub channel: u32,
    pub inverted: bool,
    pub idle: usize,
    pub bits: bool,
    pub output: PathBuf,
}

fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        bail!("hex payload must have an even number of digits");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .with_context(|| format!("bad hex byte {:?}", &s[i..i + 2]))
        })
        .collect()
}

pub fn do_gen(opts: &GenOpts) -> Result<()> {
    let payload = parse_hex(&opts.payload)?;
    let frame = FrameBuilder::new(opts.frame_id)
        .payload_preamble(opts.preamble)
        .null_frame(opts.null)
        .sync_frame(opts.sync)
        .startup_frame(opts.startup)
        .cycle_count(opts.cycle)
        .payload(&payload)
        .build()
        .context("frame parameters rejected")?;

    let config = Config::new(opts.bit_rate, opts.sample_rate)
        .context("bad rate options")?
        .with_channel(opts.channel)
        .with_inverted(opts.inverted);

    let mut wire = vec![Level::Recessive.bit(); opts.idle];
    wire.extend(frame.encode().context("encoding frame")?);

    let file = File::create(&opts.output).with_context(|| format!("creating {:?}", opts.output))?;
    let mut out = BufWriter::new(file);
    if opts.bits {
        for &bit in &wire {
            out.write_all(if bit { b"1" } else { b"0" })?;
        }
        out.write_all(b"\n")?;
    } else {
        let edges = edges_from_bits(&wire, config.samples_per_bit(), config.inverted);
        writeln!(out, "# frame {:#05x}, {} payload bytes", frame.frame_id, payload.len())?;
        for edge in &edges {
            writeln!(out, "{},{}", edge.sample, u8::from(edge.high))?;
        }
    }

    info!(
        frame_id = frame.frame_id,
        payload_bytes = payload.len(),
        wire_bits = wire.len(),
        output = ?opts.output,
        "frame written"
    );
    Ok(())
}
