//! Inspects chunks and frames produced from a fixture task, without needing
//! a running service behind `media_core` — useful while developing against
//! the crate by hand.

mod fixture;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};

use media_core::{
    ChunkStorage, FrameOutputType, FrameSource, MediaCache, MediaSources, Quality,
};

#[derive(Parser)]
#[command(name = "mc-cli", about = "Inspect media-core chunks and frames")]
struct Cli {
    /// Path to a fixture JSON file describing a task and its segments.
    #[arg(long, global = true)]
    fixture: PathBuf,

    /// Path to the `ffmpeg` binary, if not on `PATH`.
    #[arg(long, global = true)]
    ffmpeg_path: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Produce one task-level chunk and write its bytes to `--out`.
    GetChunk {
        #[arg(long)]
        chunk: i64,
        #[arg(long, value_enum, default_value_t = CliQuality::Compressed)]
        quality: CliQuality,
        #[arg(long)]
        out: PathBuf,
    },
    /// Produce one frame and write its bytes to `--out`.
    GetFrame {
        #[arg(long)]
        frame: i64,
        #[arg(long, value_enum, default_value_t = CliQuality::Compressed)]
        quality: CliQuality,
        #[arg(long, value_enum, default_value_t = CliOutType::Buffer)]
        out_type: CliOutType,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CliQuality {
    Original,
    Compressed,
}

impl From<CliQuality> for Quality {
    fn from(q: CliQuality) -> Self {
        match q {
            CliQuality::Original => Self::Original,
            CliQuality::Compressed => Self::Compressed,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CliOutType {
    Buffer,
    DecodedImage,
    NumpyArray,
}

impl From<CliOutType> for FrameOutputType {
    fn from(t: CliOutType) -> Self {
        match t {
            CliOutType::Buffer => Self::Buffer,
            CliOutType::DecodedImage => Self::DecodedImage,
            CliOutType::NumpyArray => Self::NumpyArray,
        }
    }
}

fn main() -> Result<()> {
    media_core::setup::init_logging(&media_core::MediaCoreConfig::default());

    let cli = Cli::parse();
    let loaded = fixture::load(&cli.fixture)?;

    let cache = Arc::new(MediaCache::with_in_memory_backend());
    let sources = MediaSources {
        image_repository: loaded.images.clone(),
        blob_store: None,
        manifest: None,
        ffmpeg_path: cli.ffmpeg_path.clone(),
    };
    let storage = ChunkStorage::Cache { cache, sources };

    let mut provider = media_core::make_frame_provider(
        FrameSource::Task(loaded.task.clone()),
        loaded.tasks.clone(),
        loaded.segments.clone(),
        storage,
        loaded.context_images.clone(),
        cli.ffmpeg_path.clone(),
    )?;

    match cli.command {
        Command::GetChunk { chunk, quality, out } => {
            let data = provider.get_chunk(chunk, quality.into())?;
            std::fs::write(&out, &data.data).with_context(|| format!("writing {}", out.display()))?;
            println!("wrote {} bytes ({}) to {}", data.data.len(), data.mime, out.display());
        }
        Command::GetFrame {
            frame,
            quality,
            out_type,
            out,
        } => {
            let data = provider.get_frame(frame, quality.into(), out_type.into())?;
            let bytes = match data.data {
                media_core::FrameData::Buffer(bytes) => bytes,
                media_core::FrameData::Image(image) => {
                    let mut bytes = Vec::new();
                    image
                        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
                        .context("re-encoding decoded frame as PNG for output")?;
                    bytes
                }
                media_core::FrameData::Array(array) => array.iter().copied().collect(),
            };
            std::fs::write(&out, &bytes).with_context(|| format!("writing {}", out.display()))?;
            println!("wrote {} bytes ({}) to {}", bytes.len(), data.mime, out.display());
        }
    }

    Ok(())
}
