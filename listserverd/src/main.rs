use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use listserverd::api;
use listserverd::api::rate_limit::{self, RateLimiter};
use listserverd::config::Config;
use listserverd::registry::clock::SystemClock;
use listserverd::registry::{Registry, RegistryPolicy};
use listserverd::registry_manager::RegistryHandle;
use listserverd::scheduler::ExpiryScheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("listserverd=info"))
        )
        .init();

    tracing::info!("Starting listserverd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/listserver/listserverd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);
    if config.auth.use_access_control {
        tracing::warn!(
            "Access control enabled; only {} addresses may register servers",
            config.auth.allowed_addresses.len()
        );
    }

    // Start registry thread
    let policy = RegistryPolicy::from(&config);
    tracing::info!(
        "Servers expire after {} minutes without a refresh",
        config.pruning.inactive_server_removal_minutes
    );
    let registry = RegistryHandle::spawn(Registry::new(policy, Arc::new(SystemClock)));

    let mut scheduler = ExpiryScheduler::new(registry.clone(), config.pruning.sweep_period());
    scheduler.start();

    let cancel = CancellationToken::new();

    let rate_limiter = if config.security.use_rate_limiter {
        tracing::info!(
            "Rate limiting clients to {} requests per {:?}",
            config.security.rate_limiter_max_requests,
            config.security.rate_limiter_window()
        );
        let limiter = Arc::new(RateLimiter::new(
            config.security.rate_limiter_window(),
            config.security.rate_limiter_max_requests,
        ));
        tokio::spawn(rate_limit::run_cleanup(limiter.clone(), cancel.clone()));
        Some(limiter)
    } else {
        tracing::warn!("Rate limiter disabled");
        None
    };

    // Build API router
    let app_state = api::routes::AppState {
        registry: registry.clone(),
        auth: Arc::new(config.auth.clone()),
        trust_address_override: config.security.trust_address_override,
        rate_limiter,
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.core.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.core.listen))?;

    tracing::info!("List server listening on {}", config.core.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { server_cancel.cancelled().await })
        .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();
    if let Err(e) = server_handle.await {
        tracing::error!("Server task failed: {}", e);
    }

    scheduler.stop().await;

    // Shutdown registry thread; everything registered is dropped with it
    if let Err(e) = registry.shutdown().await {
        tracing::error!("Failed to shutdown registry: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
