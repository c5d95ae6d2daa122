use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use hotpath_relay::auth::{AccessTokenCache, SystemClock};
use hotpath_relay::config::Config;
use hotpath_relay::flush::{Delivery, FlushController};
use hotpath_relay::samples::SampleAggregator;
use hotpath_relay::upstream::SubmissionClient;
use hotpath_relay::{logging, server, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    logging::init(config.log_format);

    // ── 1. Pick the delivery mode ────────────────────────────────
    let delivery = build_delivery(&config)
        .await
        .context("hotpath relay: failed to initialise credentials")?;

    // ── 2. Build shared state ────────────────────────────────────
    let samples = Arc::new(SampleAggregator::new());
    let flush = Arc::new(FlushController::new(
        samples.clone(),
        config.cache_len,
        delivery,
    ));
    let state = Arc::new(AppState { samples, flush });

    // ── 3. Build Axum router ─────────────────────────────────────
    let app = server::create_router(state, config.body_limit);

    // ── 4. Bind & serve ──────────────────────────────────────────
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    tracing::info!(
        %addr,
        cache = config.cache_len,
        test_mode = config.test_mode,
        server = %config.server,
        "hotpath relay listening"
    );

    axum::serve(listener, app)
        .await
        .context("server exited with error")
}

/// In test mode samples are only dumped and no credentials are read.
/// Otherwise the credentials are checked up front by fetching one token, so
/// a bad configuration fails at startup rather than on the first flush.
async fn build_delivery(config: &Config) -> anyhow::Result<Delivery> {
    if config.test_mode {
        tracing::warn!("test mode enabled, samples will be logged and not sent");
        return Ok(Delivery::Dump);
    }

    let credentials = config.credentials()?;
    let http = reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .context("failed to build HTTP client")?;

    let tokens = Arc::new(AccessTokenCache::new(
        http.clone(),
        config.token_url.as_str(),
        credentials,
        Arc::new(SystemClock),
    ));
    tokens
        .get_access_token()
        .await
        .context("testing credentials")?;

    Ok(Delivery::Submit {
        endpoint: config.server.clone(),
        tokens,
        client: SubmissionClient::new(http),
    })
}
