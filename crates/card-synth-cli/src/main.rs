//! CLI генератора синтетических банковских карт

use std::path::PathBuf;

use anyhow::Context as _;
use card_synth::{AssetLibrary, DriverControl, GenerationDriver, SynthConfig, CLASS_NAMES};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "card-synth", version, about = "Synthetic credit card dataset generator")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a dataset.
    Generate(GenerateArgs),
    /// Draw the labels of one written sample over its image.
    Preview(PreviewArgs),
    /// Print the class table in id order.
    Classes,
    /// Write the default configuration as JSON.
    InitConfig(InitConfigArgs),
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Configuration JSON; flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Asset root (front-images/, chip-images/, fonts/, ...).
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Output root.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Samples per loop.
    #[arg(long)]
    samples: Option<u32>,

    /// Base seed for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,

    /// Output frame width.
    #[arg(long)]
    width: Option<u32>,

    /// Output frame height.
    #[arg(long)]
    height: Option<u32>,

    /// Keep generating after the sample count is reached.
    #[arg(long, default_value_t = false)]
    continuous: bool,

    /// Loop limit in continuous mode.
    #[arg(long)]
    max_loops: Option<u32>,

    /// Pause between samples, milliseconds.
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Write plain images without YOLO labels.
    #[arg(long, default_value_t = false)]
    no_yolo: bool,
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    /// Split directory, e.g. output/yolo/train.
    #[arg(long)]
    split_dir: PathBuf,

    /// Sample name without extension, e.g. card_000003.
    #[arg(long)]
    stem: String,

    /// Annotated PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct InitConfigArgs {
    /// Destination; stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Generate(args) => cmd_generate(args),
        Command::Preview(args) => cmd_preview(args),
        Command::Classes => {
            for (id, name) in CLASS_NAMES.iter().enumerate() {
                println!("{id} {name}");
            }
            Ok(())
        }
        Command::InitConfig(args) => cmd_init_config(args),
    }
}

fn cmd_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => SynthConfig::from_file(path)?,
        None => SynthConfig::default(),
    };

    if let Some(assets) = args.assets {
        config.assets_root = assets;
    }
    if let Some(output) = args.output {
        config.output.root = output;
    }
    if let Some(samples) = args.samples {
        config.samples = samples;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(width) = args.width {
        config.output.width = width;
    }
    if let Some(height) = args.height {
        config.output.height = height;
    }
    if args.continuous {
        config.continuous = true;
    }
    if args.max_loops.is_some() {
        config.max_loops = args.max_loops;
    }
    if let Some(delay) = args.delay_ms {
        config.generation_delay_ms = delay;
    }
    if args.no_yolo {
        config.output.yolo = false;
    }
    config.validate()?;

    let library = AssetLibrary::load(&config.assets_root);
    let mut driver = GenerationDriver::new(config, library);
    let report = driver
        .run(&DriverControl::new())
        .context("generation aborted")?;

    eprintln!(
        "generated {} samples ({} skipped, {} loops)",
        report.generated, report.skipped, report.loops
    );
    for (split, count) in &report.per_split {
        eprintln!("  {split}: {count}");
    }
    Ok(())
}

fn cmd_preview(args: PreviewArgs) -> anyhow::Result<()> {
    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    let path = card_synth::preview::render_preview(&args.split_dir, &args.stem, &args.out)?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

fn cmd_init_config(args: InitConfigArgs) -> anyhow::Result<()> {
    let json = SynthConfig::default().to_json()?;
    match args.out {
        Some(path) => {
            std::fs::write(&path, json).with_context(|| format!("write '{}'", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
