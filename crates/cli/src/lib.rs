use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_viewer_cache::Point;
use pdf_viewer_core::{closest_token, OcrResult, TokenWithPosition, Tokenizer, ViewerTextConfig};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pdf-viewer-cli")]
#[command(about = "PDF viewer text tools")]
pub struct Cli {
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Split text into words and print them as JSON.
    Tokenize {
        #[arg(value_name = "TEXT")]
        text: String,
        /// Dictionary directory enabling CJK segmentation.
        #[arg(long, value_name = "DIR")]
        dict: Option<PathBuf>,
    },
    /// Find the word nearest to a point in a saved OCR result.
    Locate {
        #[arg(value_name = "OCR_JSON")]
        file: PathBuf,
        #[arg(long)]
        x: f32,
        #[arg(long)]
        y: f32,
        #[arg(long, value_name = "DIR")]
        dict: Option<PathBuf>,
    },
    /// Check that a dictionary directory is complete.
    CheckDict {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Print the effective configuration.
    Config {
        /// Configuration file; environment variables are used otherwise.
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct LocateOutput {
    token: TokenWithPosition,
    distance: f32,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Tokenize { text, dict } => run_tokenize(&text, dict.as_deref()),
        Commands::Locate { file, x, y, dict } => run_locate(&file, Point::new(x, y), dict.as_deref()),
        Commands::CheckDict { dir } => run_check_dict(&dir),
        Commands::Config { file } => run_config(file.as_deref()),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // A subscriber may already be installed when `run` is called twice in
    // one process.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_tokenize(text: &str, dict: Option<&Path>) -> Result<()> {
    let tokenizer = build_tokenizer(dict)?;
    let tokens = tokenizer.tokenize(text);

    let json = serde_json::to_string_pretty(&tokens)?;
    println!("{json}");

    Ok(())
}

fn run_locate(file: &Path, point: Point, dict: Option<&Path>) -> Result<()> {
    ensure_file_exists(file)?;

    let contents = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let result: OcrResult = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse OCR result from {}", file.display()))?;

    let tokenizer = build_tokenizer(dict)?;
    let tokens = tokenizer.tokenize_with_position(&result);
    tracing::debug!(tokens = tokens.len(), "tokenized OCR result");

    let (token, distance) =
        closest_token(&tokens, &point).context("OCR result contains no tokens")?;

    let payload = LocateOutput {
        token: token.clone(),
        distance,
    };
    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_check_dict(dir: &Path) -> Result<()> {
    let mut tokenizer = Tokenizer::new();
    tokenizer
        .initialize(dir)
        .with_context(|| format!("dictionary directory {} is unusable", dir.display()))?;

    println!("ok");
    Ok(())
}

fn run_config(file: Option<&Path>) -> Result<()> {
    let config = match file {
        Some(path) => {
            ensure_file_exists(path)?;
            ViewerTextConfig::from_file(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?
        }
        None => ViewerTextConfig::from_env().context("invalid configuration in environment")?,
    };

    print!("{}", config.to_toml());
    Ok(())
}

fn build_tokenizer(dict: Option<&Path>) -> Result<Tokenizer> {
    let mut tokenizer = Tokenizer::new();

    if let Some(dir) = dict {
        tokenizer
            .initialize(dir)
            .with_context(|| format!("failed to load dictionaries from {}", dir.display()))?;
    }

    Ok(tokenizer)
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
