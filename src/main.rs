use anyhow::{anyhow, bail, Context};
use clap::Parser;
use docprep::params::{parse_assignment, ParameterBag};
use docprep::processors::available_processors;
use docprep::{create_processor, CommandKind, Pipeline, ProcessorEvent, ProcessorKind, SaveFormat};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

#[derive(Parser, Debug)]
#[command(name = "docprep")]
#[command(about = "Scanned document cleanup: binarize, enhance, deskew, remove punch holes")]
#[command(version)]
pub struct Args {
    /// Input image
    pub input: PathBuf,

    /// Where to write the processed image
    #[arg(short, long)]
    pub output: PathBuf,

    /// Command to apply (e.g., "deskew", "binarize", "punch-holes-remove"); repeatable
    #[arg(short, long, required = true)]
    pub command: Vec<String>,

    /// Command parameter as key=value; repeatable, overrides --params
    #[arg(short, long)]
    pub param: Vec<String>,

    /// JSON file with an object of command parameters
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// Processing backend (vision, classic)
    #[arg(long, env = "DOCPREP_BACKEND", default_value = "vision")]
    pub backend: String,

    /// Output format (png, jpeg, tiff, bmp); guessed from the output extension if unset
    #[arg(long, env = "DOCPREP_FORMAT")]
    pub format: Option<String>,

    /// Compression 0-100 (PNG effort bucket, JPEG quality)
    #[arg(long, env = "DOCPREP_COMPRESSION", default_value = "50")]
    pub compression: u8,

    /// Print a JSON timing report to stdout
    #[arg(long)]
    pub report: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so the report owns stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = config::Config::from(args);

    tracing::info!("Starting docprep v{}", env!("CARGO_PKG_VERSION"));

    run(config)
}

fn run(config: config::Config) -> anyhow::Result<()> {
    let backend = ProcessorKind::from_str(&config.backend).ok_or_else(|| {
        let available: Vec<&str> = available_processors()
            .iter()
            .map(|info| info.kind.as_str())
            .collect();
        anyhow!(
            "unknown backend '{}' (available: {})",
            config.backend,
            available.join(", ")
        )
    })?;
    let format = match &config.format {
        Some(name) => {
            SaveFormat::from_str(name).ok_or_else(|| anyhow!("unknown output format '{name}'"))?
        }
        None => SaveFormat::from_path(&config.output).unwrap_or_default(),
    };
    let parameters = load_parameters(&config)?;

    let mut pipeline = Pipeline::new();
    for name in &config.commands {
        let kind =
            CommandKind::from_str(name).ok_or_else(|| anyhow!("unknown command '{name}'"))?;
        pipeline.push(kind, parameters.clone());
    }

    let bytes = fs::read(&config.input)
        .with_context(|| format!("reading {}", config.input.display()))?;

    let mut processor = create_processor(backend)?;
    processor.subscribe(Box::new(|event: &ProcessorEvent| {
        if let ProcessorEvent::ErrorOccurred(message) = event {
            tracing::error!(%message, "Processing failed");
        }
    }));
    processor.load(&bytes)?;

    let report = pipeline.run(processor.as_mut())?;

    let encoded = processor.stream_for_saving(format, config.compression)?;
    fs::write(&config.output, &encoded)
        .with_context(|| format!("writing {}", config.output.display()))?;
    tracing::info!(
        output = %config.output.display(),
        format = format.as_str(),
        bytes = encoded.len(),
        "Saved"
    );

    if config.report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

/// Merge the `--params` file with the `--param` assignments
fn load_parameters(config: &config::Config) -> anyhow::Result<ParameterBag> {
    let mut parameters = match &config.params_file {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            match serde_json::from_str::<serde_json::Value>(&text)
                .with_context(|| format!("parsing {}", path.display()))?
            {
                serde_json::Value::Object(map) => map,
                _ => bail!("{} must contain a JSON object", path.display()),
            }
        }
        None => ParameterBag::new(),
    };
    for raw in &config.assignments {
        let (key, value) =
            parse_assignment(raw).ok_or_else(|| anyhow!("expected key=value, got '{raw}'"))?;
        parameters.insert(key, value);
    }
    Ok(parameters)
}
