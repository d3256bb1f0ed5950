use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "decryptomatte", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the Cryptomatte layers of an image.
    Layers(LayersArgs),
    /// List manifest names.
    Names(NamesArgs),
    /// Write one image per matte.
    Extract(ExtractArgs),
}

#[derive(Parser, Debug)]
struct LayersArgs {
    /// Image containing Cryptomatte channels.
    image: PathBuf,
}

#[derive(Parser, Debug)]
struct NamesArgs {
    /// Image containing Cryptomatte channels.
    image: PathBuf,

    /// Only list names of this layer.
    #[arg(long)]
    layer: Option<String>,
}

#[derive(Parser, Debug)]
struct ExtractArgs {
    /// Image containing Cryptomatte channels.
    image: PathBuf,

    /// JSON settings file. Flags given on the command line take precedence.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Beauty render used to colour the mattes instead of ID colours.
    #[arg(long)]
    beauty: Option<PathBuf>,

    /// Output directory (defaults to the image's directory).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Output image format.
    #[arg(long, value_enum)]
    format: Option<FormatChoice>,

    /// Write straight alpha for layer-based editors (e.g. Photoshop).
    #[arg(long)]
    alpha_over: bool,

    /// Object name to extract (repeatable). Defaults to every manifest name.
    #[arg(long = "name")]
    names: Vec<String>,

    /// Layer to extract (repeatable). Defaults to every layer.
    #[arg(long = "layer")]
    layers: Vec<String>,

    /// Tolerance when matching ids (with --tolerant).
    #[arg(long)]
    epsilon: Option<f32>,

    /// Match ids within --epsilon instead of bit-exactly.
    #[arg(long)]
    tolerant: bool,

    /// Override rayon worker threads.
    #[arg(long)]
    threads: Option<usize>,

    /// Also write a stacked preview of all ID mattes per layer.
    #[arg(long)]
    preview: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatChoice {
    Png,
    Tiff,
    Exr,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.cmd {
        Command::Layers(args) => cmd_layers(args),
        Command::Names(args) => cmd_names(args),
        Command::Extract(args) => cmd_extract(args),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_layers(args: LayersArgs) -> anyhow::Result<()> {
    let layers = decryptomatte::list_layers(&args.image)
        .with_context(|| format!("list layers of '{}'", args.image.display()))?;
    for layer in layers {
        println!("{layer}");
    }
    Ok(())
}

fn cmd_names(args: NamesArgs) -> anyhow::Result<()> {
    let names = decryptomatte::list_names(&args.image, args.layer.as_deref())
        .with_context(|| format!("list names of '{}'", args.image.display()))?;
    for (layer, name) in names {
        println!("{layer}\t{name}");
    }
    Ok(())
}

fn read_settings_json(path: &Path) -> anyhow::Result<decryptomatte::ExtractSettings> {
    let f = File::open(path).with_context(|| format!("open settings '{}'", path.display()))?;
    let r = BufReader::new(f);
    let settings = serde_json::from_reader(r).with_context(|| "parse settings JSON")?;
    Ok(settings)
}

fn build_settings(args: ExtractArgs) -> anyhow::Result<decryptomatte::ExtractSettings> {
    let mut settings = match &args.settings {
        Some(path) => read_settings_json(path)?,
        None => decryptomatte::ExtractSettings::default(),
    };

    settings.input = args.image;
    if args.beauty.is_some() {
        settings.beauty = args.beauty;
    }
    if args.out.is_some() {
        settings.output_dir = args.out;
    }
    if let Some(format) = args.format {
        settings.format = match format {
            FormatChoice::Png => decryptomatte::OutputFormat::Png,
            FormatChoice::Tiff => decryptomatte::OutputFormat::Tiff,
            FormatChoice::Exr => decryptomatte::OutputFormat::Exr,
        };
    }
    settings.alpha_over |= args.alpha_over;
    if !args.names.is_empty() {
        settings.names = args.names;
    }
    if !args.layers.is_empty() {
        settings.layers = args.layers;
    }
    if let Some(eps) = args.epsilon {
        settings.epsilon = eps;
    }
    if args.tolerant {
        settings.match_mode = decryptomatte::MatchMode::Tolerant;
    }
    if args.threads.is_some() {
        settings.threads = args.threads;
    }
    settings.preview |= args.preview;

    settings.validate()?;
    Ok(settings)
}

fn cmd_extract(args: ExtractArgs) -> anyhow::Result<()> {
    let settings = build_settings(args)?;
    let report = decryptomatte::extract_to_images(&settings)
        .with_context(|| format!("extract mattes from '{}'", settings.input.display()))?;

    for written in &report.written {
        eprintln!("wrote {}", written.path.display());
    }
    for failed in &report.failed {
        match &failed.name {
            Some(name) => eprintln!("failed {}/{}: {}", failed.layer, name, failed.error),
            None => eprintln!("failed {}: {}", failed.layer, failed.error),
        }
    }

    if !report.is_success() {
        anyhow::bail!("{} matte(s) could not be written", report.failed.len());
    }
    Ok(())
}
