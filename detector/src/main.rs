mod capture;
mod cli;
mod debounce;
mod enhance;
mod hands;
mod notify;
mod pipeline;

use std::time::Duration;

use clap::Parser;
use gesture_alert_common::config::Config;
use tracing::{error, info, warn};

use capture::VideoCapture;
use cli::Cli;
use debounce::Debouncer;
use enhance::Clahe;
use hands::LandmarkHelper;
use notify::Notifier;
use pipeline::Pipeline;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match Config::load_or_default(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", cli.config.display());
            std::process::exit(1);
        }
    };
    if let Some(delay) = cli.delay {
        config.alert.delay_secs = delay;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    let source = match cli.source() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot start");
            std::process::exit(1);
        }
    };

    info!(
        source = %source,
        delay_secs = config.alert.delay_secs,
        alert_url = config.alert.url,
        "starting gesture detection"
    );

    capture::check_ffmpeg_available(&config.capture.ffmpeg).await;

    let capture = match VideoCapture::open(&source, &config.capture) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, source = %source, "could not open video source");
            return;
        }
    };

    let detector = match LandmarkHelper::spawn(&config.detector).await {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "could not start hand landmark detector");
            return;
        }
    };

    let notifier = match Notifier::from_config(&config.alert) {
        Ok(n) => n,
        Err(e) => {
            error!(error = %e, "could not set up alert delivery");
            return;
        }
    };

    let mut pipeline = Pipeline::new(
        capture,
        detector,
        Clahe::from_config(&config.enhance),
        Debouncer::new(Duration::from_secs(config.alert.delay_secs)),
        notifier,
    );

    match pipeline.run(ctrl_c()).await {
        Ok(summary) => {
            info!(
                frames = summary.frames,
                alerts_sent = summary.alerts_sent,
                "detection finished"
            );
        }
        Err(e) => {
            error!(error = %e, "video processing stopped");
        }
    }
}

/// Completes on Ctrl+C. If the handler cannot be installed, never completes.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
