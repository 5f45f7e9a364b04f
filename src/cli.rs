use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_MANIFEST_PATH: &str = "gapwatch.jsonld";

#[derive(Parser, Debug)]
#[command(
    name = "gapwatch",
    version,
    about = "GapWatch: reproducibility & green-meter for ML",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[arg(
        long,
        global = true,
        help = "Settings file (defaults to $GAPWATCH_CONFIG, then ./gapwatch.json)"
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create lockfile (gapwatch.jsonld).
    Init {
        #[arg(long, default_value = DEFAULT_MANIFEST_PATH)]
        output_path: PathBuf,
    },
    /// Run training script with GapWatch monitoring.
    Train {
        script: String,
        #[arg(long, default_value_t = 1)]
        epochs: u32,
        #[arg(long, help = "Tokens processed, for energy normalization")]
        tokens: Option<u64>,
        #[arg(long, help = "Sleep this many seconds instead of launching the script")]
        simulate_secs: Option<f64>,
    },
    /// Rerun a previous GapWatch run against its recorded manifest.
    Replay {
        run_id: String,
        #[arg(long, help = "Only compare environments; don't re-execute")]
        dry_run: bool,
        #[arg(long, help = "Sleep this many seconds instead of launching the script")]
        simulate_secs: Option<f64>,
    },
    /// Run GapWatch in CI mode (includes quantization check & notification).
    Ci {
        #[arg(long, help = "Quantization type (e.g. int8, int4). Enables EdgeGuard")]
        quantize: Option<String>,
        #[arg(long, help = "Maximum acceptable accuracy drop")]
        threshold: Option<f64>,
        #[arg(long, help = "Post results as a PR comment")]
        notify: bool,
        #[arg(last = true, help = "Command to monitor (after --)")]
        command: Vec<String>,
    },
}
