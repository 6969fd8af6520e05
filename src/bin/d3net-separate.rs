use clap::{Args, Parser, Subcommand};
use d3net_separator::{
    set_download_progress_callback, InputStorage, ModelSource, PartSelection, Separator,
    SeparatorConfig, SpectralOptions, Stem,
};
use std::{path::PathBuf, process};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "d3net-separate")]
#[command(about = "D3Net music source separation", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write vocals/drums/bass/other MP3s into a directory
    Split {
        #[arg(short, long)]
        input: String,

        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Write one MP3 containing only the selected stems
    Mix {
        #[arg(short, long)]
        input: String,

        #[arg(short, long)]
        output: PathBuf,

        /// Comma-separated stems to keep, e.g. `drums,bass`
        #[arg(short, long, value_delimiter = ',', required = true)]
        parts: Vec<Stem>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Download or repair the model weights
    Prepare {
        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Weights URL (defaults to D3NET_MODEL_URL or the release artifact)
    #[arg(long)]
    model_url: Option<String>,

    /// Directory the weights are stored in
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Expected SHA-256 of the weights file
    #[arg(long)]
    model_sha256: Option<String>,
}

#[derive(Args)]
struct CommonArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Run inference on CUDA (needs a build with the `cuda` feature)
    #[arg(long)]
    gpu: bool,

    /// Intra-op threads for inference
    #[arg(long)]
    threads: Option<usize>,

    /// MP3 bitrate in kbps
    #[arg(short, long, default_value_t = 256)]
    bitrate: u32,

    /// Treat the input as a URL and fetch it first
    #[arg(long)]
    remote: bool,

    /// Directory holding `<stem>.yaml` hyperparameter files
    #[arg(long)]
    hparams_dir: Option<PathBuf>,

    /// Directory for temporary downloads
    #[arg(long)]
    tmp_dir: Option<PathBuf>,

    #[arg(long)]
    no_mwf: bool,

    #[arg(long)]
    no_flip_average: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    let result = match cli.command {
        Commands::Split {
            input,
            output,
            common,
        } => handle_split(&input, output, common),
        Commands::Mix {
            input,
            output,
            parts,
            common,
        } => handle_mix(&input, output, &parts, common),
        Commands::Prepare { model } => handle_prepare(model, cli.quiet),
    };

    if let Err(e) = result {
        error!("{e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn model_source(args: ModelArgs) -> ModelSource {
    let mut source = ModelSource::default();
    if let Some(url) = args.model_url {
        source.url = url;
    }
    if let Some(dir) = args.model_dir {
        source.dir = dir;
    }
    source.sha256 = args.model_sha256;
    source
}

fn build_separator(common: CommonArgs) -> Separator {
    let config = SeparatorConfig {
        cpu_separation: !common.gpu,
        bitrate_kbps: common.bitrate,
        intra_threads: common.threads,
    };
    let spectral = SpectralOptions {
        apply_mwf: !common.no_mwf,
        ch_flip_average: !common.no_flip_average,
        ..SpectralOptions::default()
    };

    let storage = match (common.remote, common.tmp_dir) {
        (false, _) => InputStorage::Local,
        (true, Some(tmp_dir)) => InputStorage::Remote { tmp_dir },
        (true, None) => InputStorage::remote(),
    };

    let mut separator = Separator::new(config)
        .with_spectral_options(spectral)
        .with_storage(storage)
        .with_model_source(model_source(common.model));
    if let Some(dir) = common.hparams_dir {
        separator = separator.with_hparams_dir(dir);
    }
    separator
}

fn handle_split(
    input: &str,
    output: PathBuf,
    common: CommonArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let separator = build_separator(common);
    let result = separator.separate_into_parts(input, &output)?;

    for stem in Stem::ALL {
        println!("{}", result.path(stem).display());
    }
    Ok(())
}

fn handle_mix(
    input: &str,
    output: PathBuf,
    parts: &[Stem],
    common: CommonArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let separator = build_separator(common);
    let written = separator.create_static_mix(&PartSelection::only(parts), input, &output)?;

    println!("{}", written.display());
    Ok(())
}

fn handle_prepare(model: ModelArgs, quiet: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !quiet {
        set_download_progress_callback(|downloaded, total| {
            if total > 0 {
                let percent = (downloaded as f64 / total as f64 * 100.0).round() as u64;
                eprint!(
                    "\rDownloading model: {:>3}% ({:.2} MB / {:.2} MB)",
                    percent,
                    downloaded as f64 / 1_000_000.0,
                    total as f64 / 1_000_000.0
                );
                if downloaded >= total {
                    eprintln!();
                }
            } else {
                eprint!("\rDownloading model: {:.2} MB", downloaded as f64 / 1_000_000.0);
            }
        });
    }

    let handle = d3net_separator::ensure_model(&model_source(model))?;
    println!("{}", handle.local_path.display());
    Ok(())
}
