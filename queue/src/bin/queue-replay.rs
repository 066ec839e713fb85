//! Replay recorded queue frames and print the resulting state.
//!
//! ```text
//! queue-replay <ROUTE_ID> [FRAMES] [--metrics]
//! ```
//!
//! Frames are read one per line from the file, or from stdin when no file is
//! given. Blank lines are skipped. The final state is printed as JSON on
//! stdout. With `--metrics` (or `QUEUE_REPLAY_METRICS=1`) the Prometheus
//! exposition is printed to stderr afterwards.

use anyhow::{Context, Result};
use clap::Parser;
use clap::builder::BoolishValueParser;
use komiut_queue::{ConnectionState, QueueConfig, QueueSession, TransportSignal};
use komiut_runtime::metrics::MetricsRecorder;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "queue-replay", version, about = "Fold recorded queue frames into a route's state")]
struct Args {
    /// Route whose queue the frames belong to
    route_id: String,

    /// Newline-delimited JSON frames; stdin when omitted
    frames: Option<PathBuf>,

    /// Print Prometheus metrics to stderr after the replay
    #[arg(long, env = "QUEUE_REPLAY_METRICS", value_parser = BoolishValueParser::new())]
    metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "komiut_queue=info,komiut_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let recorder = if args.metrics {
        let recorder = MetricsRecorder::install().context("Failed to install metrics recorder")?;
        komiut_queue::register_metrics();
        Some(recorder)
    } else {
        None
    };

    let config = QueueConfig::from_env().context("Invalid queue configuration")?;
    let input = read_input(args.frames.as_deref()).await?;

    let mut signals = vec![TransportSignal::connection(ConnectionState::Connected)];
    signals.extend(frames(&input));

    let session = QueueSession::with_config(args.route_id, config);
    let folded = session
        .ingest(futures::stream::iter(signals))
        .await
        .context("Replay interrupted")?;

    let state = session.snapshot();
    info!(
        route_id = %session.route_id(),
        frames = folded.saturating_sub(1),
        vehicles = state.vehicle_count(),
        available_seats = state.total_available_seats(),
        version = %state.version(),
        "Replay finished"
    );

    println!(
        "{}",
        serde_json::to_string_pretty(&*state).context("Failed to serialize queue state")?
    );

    session.shutdown().await.context("Session did not shut down cleanly")?;

    if let Some(text) = recorder.as_ref().and_then(MetricsRecorder::render) {
        eprintln!("{text}");
    }

    Ok(())
}

/// One frame signal per non-blank line
fn frames(input: &str) -> impl Iterator<Item = TransportSignal> + '_ {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| TransportSignal::Frame(line.to_string()))
}

async fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read frames from {}", path.display())),
        None => {
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("Failed to read frames from stdin")?;
            Ok(input)
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_route_and_file() {
        let args =
            Args::try_parse_from(["queue-replay", "route-42", "frames.ndjson", "--metrics"]).unwrap();
        assert_eq!(args.route_id, "route-42");
        assert_eq!(args.frames, Some(PathBuf::from("frames.ndjson")));
        assert!(args.metrics);
    }

    #[test]
    fn test_route_is_required_and_extras_rejected() {
        assert!(Args::try_parse_from(["queue-replay"]).is_err());
        assert!(Args::try_parse_from(["queue-replay", "route-42", "a.ndjson", "b.ndjson"]).is_err());
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let signals: Vec<_> = frames("{\"type\":\"error\"}\n\n   \n{}\n").collect();
        assert_eq!(
            signals,
            [
                TransportSignal::Frame("{\"type\":\"error\"}".to_string()),
                TransportSignal::Frame("{}".to_string()),
            ]
        );
    }
}
