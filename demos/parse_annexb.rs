use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use h264_au_sync::{Action, Alignment, Chunk, Framerate, ParseSession, ParserConfig};

#[derive(Parser, Debug)]
#[command(about = "Split an Annex-B H.264 stream into access units")]
struct Args {
    #[arg(long)]
    input: PathBuf,
    #[arg(long, default_value_t = 65536)]
    chunk_bytes: usize,
    /// Synthesize timestamps at this rate, e.g. `30/1` or `30000/1001`.
    #[arg(long)]
    framerate: Option<String>,
    #[arg(long, default_value = "au")]
    alignment: String,
    #[arg(long, default_value_t = false)]
    attach_nalus: bool,
    #[arg(long, default_value_t = false)]
    skip_until_keyframe: bool,
    /// Bytes put in front of the first chunk, e.g. out-of-band SPS/PPS.
    #[arg(long)]
    prefix: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = ParserConfig::new()
        .with_alignment(parse_alignment(&args.alignment)?)
        .with_nalu_list(args.attach_nalus)
        .with_skip_until_keyframe(args.skip_until_keyframe);
    if let Some(raw) = args.framerate.as_deref() {
        config = config.with_framerate(parse_framerate(raw)?);
    }
    if let Some(path) = &args.prefix {
        let prefix = fs::read(path)
            .with_context(|| format!("failed to read prefix bytes: {}", path.display()))?;
        config = config.with_prefix_bytes(prefix);
    }

    let mut session = ParseSession::annexb(config).context("failed to create parser")?;
    let data = fs::read(&args.input)
        .with_context(|| format!("failed to read input stream: {}", args.input.display()))?;
    let step = args.chunk_bytes.max(1);

    for chunk in data.chunks(step) {
        session
            .submit(Chunk::new(chunk.to_vec()))
            .context("parse submit failed")?;
        while let Some(action) = session.try_reap() {
            report(&action, args.verbose);
        }
    }

    let finished = session.finish().context("flush failed")?;
    for action in &finished.actions {
        report(action, args.verbose);
    }
    for diagnostic in &finished.diagnostics {
        log::warn!("{diagnostic}");
    }

    println!(
        "{}, input={}, chunk_bytes={}",
        session.summary(),
        args.input.display(),
        step
    );
    Ok(())
}

fn report(action: &Action, verbose: bool) {
    match action {
        Action::Buffers(buffers) if verbose => {
            for buffer in buffers {
                println!(
                    "buffer bytes={} pts={:?} dts={:?} key_frame={}",
                    buffer.payload.len(),
                    buffer.pts,
                    buffer.dts,
                    buffer.metadata.key_frame
                );
            }
        }
        Action::Buffers(_) => {}
        Action::FormatChange(format) => println!("format change: {format}"),
        Action::RequestKeyframe => log::info!("key frame requested from source"),
        Action::EndOfStream => log::info!("end of stream"),
    }
}

fn parse_alignment(raw: &str) -> Result<Alignment> {
    match raw.to_ascii_lowercase().as_str() {
        "au" | "access_unit" => Ok(Alignment::AccessUnit),
        "nalu" | "nal" => Ok(Alignment::NalUnit),
        other => anyhow::bail!("unsupported alignment: {other}"),
    }
}

fn parse_framerate(raw: &str) -> Result<Framerate> {
    let (num, den) = raw.split_once('/').unwrap_or((raw, "1"));
    let num = num
        .trim()
        .parse()
        .with_context(|| format!("invalid framerate numerator: {raw}"))?;
    let den = den
        .trim()
        .parse()
        .with_context(|| format!("invalid framerate denominator: {raw}"))?;
    Framerate::new(num, den).context("invalid framerate")
}
