//! Server wiring: config, watcher, verifier, and the public listener.

use crate::api;
use crate::config;
use crate::config_store::ConfigStore;
use crate::config_watch;
use crate::context::AppContext;
use crate::error::{ResolverError, ResolverResult};
use crate::logging;
use crate::rate_limit::RequestRateLimiter;
use crate::status::DomainStatusStore;
use crate::verify::DomainVerifier;
use crate::wallet::WalletResolver;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run the service until shutdown.
pub async fn run(config_path: &str) -> ResolverResult<()> {
    let config_path = if config_path.trim().is_empty() {
        "config.yml"
    } else {
        config_path
    };
    let path = Path::new(config_path);

    let cfg = config::load_or_create_config(path, &config::default_config())?;
    cfg.validate()?;

    logging::init(&cfg.logging.level);
    info!(path = %path.display(), base_url = %cfg.base_url, "config loaded");
    for domain in &cfg.domains {
        info!(
            domain = %domain.domain,
            name = %format!("_cryptalias.{}", domain.domain),
            value = %domain.dns_txt_value(),
            "dns txt record"
        );
    }

    let store = Arc::new(ConfigStore::new(path, cfg.clone()));
    let statuses = Arc::new(DomainStatusStore::new(&cfg));
    let resolver = Arc::new(WalletResolver::new(path)?);
    let rate_limiter = Arc::new(RequestRateLimiter::new());

    // The watcher must stay alive for the lifetime of the server.
    let _watcher = config_watch::watch_config_file(path, Arc::clone(&store))?;
    info!(path = %path.display(), "config watcher started");

    let ctx = AppContext::new(
        Arc::clone(&store),
        Arc::clone(&statuses),
        resolver,
        rate_limiter,
    );
    let app = api::router(ctx).into_make_service_with_connect_info::<SocketAddr>();

    let addr = format!("0.0.0.0:{}", cfg.public_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ResolverError::Internal(format!("public listen failed on {addr}: {e}")))?;
    info!(addr = %addr, base_url = %cfg.base_url, "public server listening");

    // Start verification only after the listener is live so the self-probe
    // can reach us.
    let shutdown = CancellationToken::new();
    let verifier = DomainVerifier::new(
        Arc::clone(&store),
        Arc::clone(&statuses),
        cfg.verify.interval_minutes,
    )?;
    let verifier_handle = verifier.start(shutdown.clone());
    info!(
        interval_minutes = cfg.verify.interval_minutes,
        "domain verifier started"
    );

    let signal = {
        let shutdown = shutdown.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            shutdown.cancel();
        }
    };
    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| ResolverError::Internal(format!("server error: {e}")))?;

    shutdown.cancel();
    let _ = verifier_handle.await;
    Ok(())
}
