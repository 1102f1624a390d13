mod config;
mod idle;
mod validation;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, warn};
use tts_core::{
    fetch_endpoint, CancellationToken, HttpTransport, Session, SessionError, StatusCallback, SynthesisTransport,
    TruncationPolicy, WavDecoder, WavRenderClock,
};

use crate::config::ClientConfig;
use crate::idle::IdleTimeout;
use crate::validation::validate_request;

/// Speak text through a streaming TTS backend, starting playback while the
/// backend is still synthesizing.
#[derive(Debug, Parser)]
#[command(name = "tts_client", version)]
struct Args {
    /// Text to synthesize
    text: String,

    /// Voice id (overrides TTS_VOICE)
    #[arg(long)]
    voice: Option<String>,

    /// Synthesis endpoint, e.g. localhost:8002 (overrides TTS_URL)
    #[arg(long)]
    endpoint: Option<String>,

    /// Settings service to read the endpoint from when none is given
    #[arg(long)]
    settings_url: Option<String>,

    /// Write the rendered timeline to this WAV file
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Cancel the session when the backend sends nothing for this many seconds
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Fail when the stream ends in the middle of a frame
    #[arg(long)]
    fail_on_truncation: bool,

    /// Print the session report as JSON
    #[arg(long)]
    report: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main(Args::parse()).await
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    let mut config = ClientConfig::from_env();
    if let Some(voice) = args.voice {
        config.voice = voice;
    }
    if args.endpoint.is_some() {
        config.endpoint = args.endpoint;
    }
    if args.settings_url.is_some() {
        config.settings_url = args.settings_url;
    }
    if args.output.is_some() {
        config.output = args.output;
    }
    if let Some(secs) = args.idle_timeout.filter(|secs| *secs > 0) {
        config.idle_timeout_secs = Some(secs);
    }
    if args.fail_on_truncation {
        config.truncation = TruncationPolicy::Fail;
    }

    validate_request(&args.text, &config.voice)?;

    let http = reqwest::Client::new();
    let endpoint = match (config.endpoint.clone(), config.settings_url.as_deref()) {
        (Some(endpoint), _) => Some(endpoint),
        (None, Some(settings_url)) => Some(
            fetch_endpoint(&http, settings_url)
                .await
                .context("Error getting TTS settings")?,
        ),
        (None, None) => None,
    };
    info!(
        "Client configuration loaded: endpoint={:?}, voice={}, truncation={:?}",
        endpoint, config.voice, config.truncation
    );

    let cancel = CancellationToken::new();
    let transport: Arc<dyn SynthesisTransport> = match config.idle_timeout() {
        Some(limit) => Arc::new(IdleTimeout::new(
            HttpTransport::with_client(http),
            limit,
            cancel.clone(),
        )),
        None => Arc::new(HttpTransport::with_client(http)),
    };
    let clock = Arc::new(WavRenderClock::new());
    let status: StatusCallback = Arc::new(|status: &str| {
        if status.is_empty() {
            debug!("Status cleared");
        } else {
            info!("{status}");
        }
    });

    let mut session = Session::new(
        config.session_config(endpoint),
        args.text,
        transport,
        Arc::new(WavDecoder),
        clock.clone(),
    )
    .with_status_callback(status)
    .with_cancellation(cancel);

    let token = session.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping stream");
            token.cancel();
        }
    });

    let result = session.run().await;

    // Whatever was scheduled before a failure still gets rendered.
    if let Some(path) = &config.output {
        match clock.finish(path) {
            Ok(secs) => info!("Wrote {:.2}s of audio to {}", secs, path.display()),
            Err(e) => warn!("Nothing written to {}: {e}", path.display()),
        }
    }
    if args.report {
        println!("{}", serde_json::to_string_pretty(session.report())?);
    }

    match result {
        Ok(report) => {
            if let Some(truncation) = report.truncated {
                warn!("Stream ended early: {truncation}");
            }
            Ok(())
        }
        Err(SessionError::Cancelled) => {
            info!("Session cancelled");
            Ok(())
        }
        Err(e) => {
            error!("Error generating or playing audio: {e}");
            Err(e.into())
        }
    }
}
