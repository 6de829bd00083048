mod decode;
mod gen;

use std::io::stderr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a FlexRay edge capture into annotated field records.
    ///
    /// The capture file carries one edge per line as `<sample>,<level>`
    /// where level is the physical line state, 0 or 1. Lines starting with
    /// '#' are skipped.
    Decode {
        /// Input capture file.
        input: PathBuf,

        /// Output format.
        #[arg(short, long, default_value = "text")]
        format: decode::Format,

        /// Channel bit rate in bits per second.
        #[arg(short, long, default_value_t = 10_000_000)]
        bit_rate: u32,

        /// Capture sample rate in samples per second.
        #[arg(short, long, default_value_t = 40_000_000)]
        sample_rate: u32,

        /// Host capture channel identifier.
        #[arg(long, default_value_t = 0)]
        channel: u32,

        /// Treat the line as inverted, i.e. dominant is high.
        #[arg(long, action)]
        inverted: bool,

        /// Also emit TSS/FSS/BSS/FES sequence records.
        #[arg(long, action)]
        framing: bool,
    },
    /// Encode a frame and write it as an edge capture for replay.
    Gen {
        /// Frame identifier, 1..=2047.
        #[arg(short = 'i', long)]
        frame_id: u16,

        /// Cycle counter value, 0..=63.
        #[arg(short, long, default_value_t = 0)]
        cycle: u8,

        /// Payload bytes as hex, e.g. deadbeef. Must be a whole number of
        /// 16-bit words.
        #[arg(short, long, default_value = "")]
        payload: String,

        /// Set the payload preamble indicator.
        #[arg(long, action)]
        preamble: bool,

        /// Set the null frame indicator.
        #[arg(long, action)]
        null: bool,

        /// Set the sync frame indicator.
        #[arg(long, action)]
        sync: bool,

        /// Set the startup frame indicator.
        #[arg(long, action)]
        startup: bool,

        /// Channel bit rate in bits per second.
        #[arg(short, long, default_value_t = 10_000_000)]
        bit_rate: u32,

        /// Capture sample rate in samples per second.
        #[arg(short, long, default_value_t = 40_000_000)]
        sample_rate: u32,

        /// Host capture channel identifier.
        #[arg(long, default_value_t = 0)]
        channel: u32,

        /// Invert the physical line polarity.
        #[arg(long, action)]
        inverted: bool,

        /// Idle bit times written ahead of the frame.
        #[arg(long, default_value_t = 16)]
        idle: usize,

        /// Write the logical bit sequence instead of an edge capture.
        #[arg(long, action)]
        bits: bool,

        /// Output file path.
        #[arg(short, long, default_value = "frame.capture", value_name = "path")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("FLEXRAY_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Decode {
            input,
            format,
            bit_rate,
            sample_rate,
            channel,
            inverted,
            framing,
        } => decode::do_decode(
            &input, &format, bit_rate, sample_rate, channel, inverted, framing,
        ),
        Commands::Gen {
            frame_id,
            cycle,
            payload,
            preamble,
            null,
            sync,
            startup,
            bit_rate,
            sample_rate,
            channel,
            inverted,
            idle,
            bits,
            output,
        } => gen::do_gen(&gen::GenOpts {
            frame_id,
            cycle,
            payload,
            preamble,
            null,
            sync,
            startup,
            bit_rate,
            sample_rate,
            channel,
            inverted,
            idle,
            bits,
            output,
        }),
    }
}
