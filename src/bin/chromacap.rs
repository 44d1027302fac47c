use std::path::PathBuf;

use anyhow::Context as _;
use chromacap::FrameSource as _;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "chromacap", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print probed metadata for a video source (requires `ffprobe` on PATH).
    Probe(ProbeArgs),
    /// Chroma-key a source and export an animated artifact.
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Input video path.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input video path.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output directory for the artifact.
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,

    /// Output format.
    #[arg(long, value_enum, default_value_t = FormatChoice::Gif)]
    format: FormatChoice,

    /// Capture rate in frames per second.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Key configuration JSON (defaults to a green-screen preset).
    #[arg(long)]
    key: Option<PathBuf>,

    /// Override the target hue in degrees.
    #[arg(long)]
    target_hue: Option<f32>,

    /// Override the keying threshold (0..1).
    #[arg(long)]
    threshold: Option<f32>,

    /// Override the soft-edge half width (>= 0).
    #[arg(long)]
    softness: Option<f32>,

    /// Override the spill-suppression strength (0..1).
    #[arg(long)]
    spill: Option<f32>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatChoice {
    /// PNG image sequence in a ZIP archive.
    Frames,
    /// GIF with binary transparency.
    Gif,
    /// Batched APNG.
    Apng,
    /// Alpha-preserving WebM.
    Webm,
}

impl From<FormatChoice> for chromacap::ExportFormat {
    fn from(choice: FormatChoice) -> Self {
        match choice {
            FormatChoice::Frames => Self::ImageSequence,
            FormatChoice::Gif => Self::PaletteAnimation,
            FormatChoice::Apng => Self::BatchedAnimation,
            FormatChoice::Webm => Self::AlphaVideo,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Probe(args) => cmd_probe(args),
        Command::Export(args) => cmd_export(args),
    }
}

fn cmd_probe(args: ProbeArgs) -> anyhow::Result<()> {
    let source = chromacap::FfmpegFrameSource::open(&args.in_path)?;
    let info = source.info();
    println!("path:     {}", info.path.display());
    println!("size:     {}x{}", info.width, info.height);
    println!("fps:      {:.3}", info.source_fps());
    println!("duration: {:.3}s", info.duration_sec);
    Ok(())
}

fn read_key_config(args: &ExportArgs) -> anyhow::Result<chromacap::ChromaKeyConfig> {
    let mut key = match &args.key {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("open key config '{}'", path.display()))?;
            serde_json::from_str(&text).with_context(|| "parse key config JSON")?
        }
        None => chromacap::ChromaKeyConfig::default(),
    };

    if let Some(degrees) = args.target_hue {
        key.target = chromacap::KeyTarget::Hue { degrees };
    }
    if let Some(threshold) = args.threshold {
        key.threshold = threshold;
    }
    if let Some(softness) = args.softness {
        key.softness = softness;
    }
    if let Some(spill) = args.spill {
        key.spill = spill;
    }
    key.validate()?;
    Ok(key)
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let key = read_key_config(&args)?;
    let mut source = chromacap::FfmpegFrameSource::open(&args.in_path)?;

    let job = chromacap::ExportJob::new(args.format.into(), args.fps, source.duration_sec())?;
    anyhow::ensure!(
        job.total_frames > 0,
        "source '{}' yields zero frames at {} fps",
        args.in_path.display(),
        args.fps
    );

    let outcome = chromacap::run_export_job(&mut source, &key, &job)?;
    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }

    match outcome.artifact {
        Some(artifact) => {
            use chromacap::ArtifactStore as _;
            let store = chromacap::FsArtifactStore::new(&args.out_dir);
            let location = store.put(&artifact)?;
            eprintln!(
                "wrote {location} ({} frames, {} bytes)",
                outcome.frames_emitted,
                artifact.bytes.len()
            );
        }
        None => {
            eprintln!("export ended with state {:?}, no artifact", outcome.state);
        }
    }
    Ok(())
}
