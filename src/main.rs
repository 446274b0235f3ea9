use anyhow::{Context, Result};
use beam::{
    app::{create_app, AppState},
    config::Config,
    services::*,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Starting Beam API v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    let store = init_store(&config).await?;

    let chain: Arc<dyn SponsorChain> = Arc::new(EvmSponsorChain::new(
        &config.rpc_url,
        config.chain_id,
        config.usdc_address,
        config.sponsor_address,
        config.sponsor_private_key.as_deref(),
    )?);

    let mailer: Arc<dyn Mailer> = match &config.resend_api_key {
        Some(key) => Arc::new(ResendMailer::new(
            config.resend_api_url.clone(),
            key.clone(),
            config.from_email.clone(),
        )),
        None => {
            tracing::warn!("RESEND_API_KEY not set, claim emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let claim_lock = Arc::new(
        ClaimLock::new(config.redis_url.as_deref(), config.claim_lock_ttl_secs).await?,
    );
    if !claim_lock.is_shared() {
        tracing::warn!("Claim locks are local to this instance, run a single replica or set REDIS_URL");
    }

    let transfers = Arc::new(TransferService::new(
        store,
        chain,
        mailer,
        claim_lock,
        TransferSettings {
            app_url: config.app_url.clone(),
            verify_funding: config.verify_funding,
            payout_timeout: Duration::from_secs(config.payout_timeout_secs),
        },
    ));

    let app = create_app(AppState::new(transfers));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn init_store(config: &Config) -> Result<Arc<dyn TransferStore>> {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, transfers are kept in memory only");
        return Ok(Arc::new(MemoryTransferStore::new()));
    };

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(database_url)
        .await
        .context("Failed to create database connection pool")?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations completed successfully");

    Ok(Arc::new(PgTransferStore::new(pool)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl+c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down gracefully...");
}
