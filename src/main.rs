use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use diffbot_motion::config::{LINK_BAUDRATE, LINK_PORT, load_calibration};
use diffbot_motion::motion::Calibration;
use diffbot_motion::runtime::{self, CommandSource, RuntimeOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    Zenoh,
    Serial,
}

/// Differential-drive motion runtime
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Calibration JSON file; built-in reference robot values if omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where commands come from
    #[arg(short, long, value_enum, default_value = "zenoh")]
    source: Source,

    /// Serial device for the text link
    #[arg(long, default_value = LINK_PORT)]
    port: String,

    /// Text link baud rate
    #[arg(long, default_value_t = LINK_BAUDRATE)]
    baud: u32,

    /// Fail a maneuver whose wheels have not arrived after this many ms (0 = wait forever)
    #[arg(long, default_value_t = 0)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let calibration = match &args.config {
        Some(path) => match load_calibration(path) {
            Ok(cal) => {
                info!("Loaded calibration from {}", path.display());
                cal
            }
            Err(e) => {
                eprintln!("Calibration error ({}): {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Calibration::default(),
    };

    let source = match args.source {
        Source::Zenoh => CommandSource::Zenoh,
        Source::Serial => CommandSource::Serial {
            port: args.port,
            baudrate: args.baud,
        },
    };

    let options = RuntimeOptions {
        calibration,
        source,
        run_timeout: (args.timeout_ms > 0).then(|| Duration::from_millis(args.timeout_ms)),
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
