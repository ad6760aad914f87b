use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use sahaay_gateway::api::{self, AppState};
use sahaay_gateway::channels::create_transport;
use sahaay_gateway::config::{GatewayConfig, LoggingConfig};
use sahaay_gateway::crypto::FieldCipher;
use sahaay_gateway::llm::create_collaborator;
use sahaay_gateway::pipeline::{Orchestrator, OrchestratorSettings, create_synthesizer};
use sahaay_gateway::rate_limit::{self, RateLimiter};
use sahaay_gateway::store::{LibSqlBackend, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();

    let logging = LoggingConfig::from_env();
    let _log_guard = init_tracing(&logging)?;

    let config = GatewayConfig::from_env().context("loading configuration")?;

    eprintln!("🤝 Sahaay Gateway v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Listening: http://{}:{}", config.host, config.port);
    eprintln!("   Database: {}", config.storage.database_path.display());
    eprintln!("   AI backend: {} ({})", config.ai.backend, config.ai.model);

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn Store> = Arc::new(
        LibSqlBackend::new_local(&config.storage.database_path)
            .await
            .with_context(|| {
                format!(
                    "opening database at {}",
                    config.storage.database_path.display()
                )
            })?,
    );

    let audio_dir = config.storage.file_storage_path.join("audio");
    std::fs::create_dir_all(&audio_dir)
        .with_context(|| format!("creating {}", audio_dir.display()))?;

    // ── Services ─────────────────────────────────────────────────────────
    let cipher = Arc::new(FieldCipher::new(&config.encryption_key)?);
    let collaborator = create_collaborator(&config.ai)?;
    let transport = create_transport(config.twilio.as_ref());
    eprintln!(
        "   Outbound: {}",
        if transport.is_enabled() {
            transport.name()
        } else {
            "disabled"
        }
    );

    let speech = create_synthesizer(config.speech.as_ref(), &audio_dir);
    eprintln!(
        "   Speech: {}",
        config
            .speech
            .as_ref()
            .map_or("disabled", |s| s.model.as_str())
    );

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        cipher,
        collaborator,
        speech,
        transport,
        OrchestratorSettings::from_config(&config),
    ));

    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
    let _sweep_handle =
        rate_limit::spawn_sweep_task(Arc::clone(&limiter), config.rate_limit.sweep_interval);
    eprintln!(
        "   Rate limit: {}/min, {}/hour\n",
        config.rate_limit.per_minute, config.rate_limit.per_hour
    );

    // ── HTTP ─────────────────────────────────────────────────────────────
    let state = AppState::new(
        orchestrator,
        limiter,
        store,
        config.default_language.clone(),
        audio_dir,
    );
    let app = api::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(addr = %addr, "Gateway started");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serving HTTP")?;

    tracing::info!("Gateway stopped");
    Ok(())
}

/// Console plus daily rolling file output. The guard must outlive the server.
fn init_tracing(
    logging: &LoggingConfig,
) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(&logging.directory)
        .with_context(|| format!("creating log directory {}", logging.directory.display()))?;
    let file_appender = tracing_appender::rolling::daily(&logging.directory, "gateway.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
