use anyhow::Context;
use commerce_loadgen::config::Config;
use commerce_loadgen::engine::Engine;
use commerce_loadgen::transport::ReqwestTransport;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "commerce_loadgen=info,loadgen=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env();
    info!(
        "Loaded configuration: scenario={}, base_url={}, total_users={}",
        config.scenario, config.base_url, config.total_users
    );
    if let Some(seed) = config.seed {
        info!("Using seed {}", seed);
    }

    let transport = ReqwestTransport::new(config.request_timeout)
        .context("Failed to build HTTP client")?;
    let summary_path = config.summary_path.clone();
    let engine = Engine::new(config, Arc::new(transport));

    // Ctrl-C stops the run; VUs finish their iteration and the summary is still printed
    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping run");
            cancel.cancel();
        }
    });

    let summary = engine.run().await.context("Run setup failed")?;
    summary.print_summary();

    if let Some(path) = summary_path {
        summary
            .write_json(&path)
            .with_context(|| format!("Failed to write summary to {path}"))?;
        info!("Summary written to {}", path);
    }

    if !summary.passed() {
        std::process::exit(1);
    }
    Ok(())
}
