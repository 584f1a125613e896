//! CLI entry point for the CRTM stop times poller.
//!
//! Provides subcommands for fetching one stop or a batch of stops, printing
//! the raw answers or flattening them into arrival CSV rows.

use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use crtm_poll::config::{DEFAULT_MAX_CONNECTIONS, DEFAULT_TIMEOUT};
use crtm_poll::output::{append_rows, write_rows};
use crtm_poll::{CrtmError, FetchConfig, StopTimesFetcher};
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "crtm_poll")]
#[command(about = "Poll CRTM bus stop arrival times", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the arrival times of a single stop and print the raw answer
    Stop {
        /// Stop code in CRTM's format (e.g. 8_17491)
        #[arg(value_name = "COD_STOP")]
        cod_stop: String,

        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Fetch several stops concurrently
    Batch {
        /// Stop codes in CRTM's format (e.g. 8_17491)
        #[arg(value_name = "COD_STOP")]
        cod_stops: Vec<String>,

        /// File with one stop code per line
        #[arg(short, long)]
        stops_file: Option<PathBuf>,

        /// Flatten the answers into arrival CSV rows
        #[arg(short, long, default_value_t = false)]
        parsed: bool,

        /// CSV file to append arrival rows to, implies --parsed
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        fetch: FetchArgs,
    },
}

#[derive(Args)]
struct FetchArgs {
    /// CSV file recording every request attempt
    #[arg(short, long, env = "CRTM_FETCH_LOG")]
    log: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(short, long, env = "CRTM_TIMEOUT", default_value_t = DEFAULT_TIMEOUT.as_secs_f64())]
    timeout: f64,

    /// Maximum number of concurrent connections
    #[arg(short = 'c', long, env = "CRTM_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,
}

impl FetchArgs {
    fn into_config(self) -> Result<FetchConfig> {
        let timeout = Duration::try_from_secs_f64(self.timeout)
            .with_context(|| format!("invalid timeout {}", self.timeout))?;
        let config = FetchConfig::new(self.log, timeout, self.max_connections);
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/crtm_poll.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("crtm_poll.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let fetcher = StopTimesFetcher::new()?;

    match cli.command {
        Commands::Stop { cod_stop, fetch } => {
            let config = fetch.into_config()?;
            match fetcher.single(&cod_stop, &config).await {
                Ok((response, time)) => {
                    info!(cod_stop = %response.cod_stop, time = time.as_secs_f64(), "Stop fetched");
                    println!("{}", response.body);
                }
                Err(CrtmError::EmptyAnswer { cod_stop }) => {
                    error!(cod_stop = %cod_stop, "Empty answer");
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Batch {
            mut cod_stops,
            stops_file,
            parsed,
            output,
            fetch,
        } => {
            if let Some(path) = stops_file {
                cod_stops.extend(read_stops_file(&path)?);
            }
            if cod_stops.is_empty() {
                bail!("no stops given, pass COD_STOP arguments or --stops-file");
            }
            let config = fetch.into_config()?;

            if parsed || output.is_some() {
                let (rows, time) = fetcher.batch_parsed(&cod_stops, &config).await?;
                info!(
                    stops = cod_stops.len(),
                    rows = rows.len(),
                    time = time.as_secs_f64(),
                    "Batch parsed"
                );
                match output {
                    Some(path) => append_rows(&path, &rows)?,
                    None => write_rows(std::io::stdout().lock(), &rows)?,
                }
            } else {
                let (responses, time) = fetcher.batch(&cod_stops, &config).await?;
                info!(
                    stops = cod_stops.len(),
                    responses = responses.len(),
                    time = time.as_secs_f64(),
                    "Batch fetched"
                );
                let mut stdout = std::io::stdout().lock();
                for response in &responses {
                    writeln!(stdout, "{}", response.body)?;
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Reads stop codes from a file, one per line, skipping blanks and `#` comments.
fn read_stops_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read stops file {}", path.display()))?;
    Ok(parse_stop_list(&content))
}

fn parse_stop_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stop_list() {
        let stops = parse_stop_list("8_17491\n\n# depot\n  8_06036  \n");
        assert_eq!(stops, ["8_17491", "8_06036"]);
    }

    #[test]
    fn test_fetch_args_into_config() {
        let args = FetchArgs {
            log: None,
            timeout: 2.5,
            max_connections: 4,
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.max_connections, 4);
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let args = FetchArgs {
            log: None,
            timeout: -1.0,
            max_connections: 4,
        };
        assert!(args.into_config().is_err());
    }

    #[test]
    fn test_cli_parses_batch() {
        let cli = Cli::try_parse_from([
            "crtm_poll", "batch", "8_1", "8_2", "--parsed", "-c", "3", "-t", "1.5",
        ])
        .unwrap();
        match cli.command {
            Commands::Batch {
                cod_stops,
                parsed,
                fetch,
                ..
            } => {
                assert_eq!(cod_stops, ["8_1", "8_2"]);
                assert!(parsed);
                assert_eq!(fetch.max_connections, 3);
                assert_eq!(fetch.timeout, 1.5);
            }
            Commands::Stop { .. } => panic!("expected batch"),
        }
    }
}
