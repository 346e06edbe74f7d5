//! Application assembly and lifecycle.
//!
//! Everything mutable and shared -- provider handle, caches, token oracle --
//! is constructed here once and handed to the router through [`AppState`].

use crate::booking::FlightService;
use crate::cache::FlightCache;
use crate::config::{Config, DEV_AUTH_SECRET};
use crate::provider::http::HttpFlightProvider;
use crate::provider::mock::MockFlightProvider;
use crate::provider::FlightProvider;
use crate::state::AppState;
use crate::utils::fmt_duration;
use crate::web::auth::JwtOracle;
use crate::web::create_router;
use anyhow::Context;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::pin::pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Main application struct containing all necessary components
pub struct App {
    config: Config,
    app_state: AppState,
}

impl App {
    /// Create a new App instance with configuration loaded from the
    /// environment.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_config(Config::load()?)
    }

    pub fn with_config(config: Config) -> anyhow::Result<Self> {
        let (provider, provider_mode): (Arc<dyn FlightProvider>, &'static str) =
            match &config.provider_base_url {
                Some(base_url) => {
                    info!(base_url = %base_url, "using HTTP flight provider");
                    (
                        Arc::new(
                            HttpFlightProvider::new(base_url, config.provider_timeout)
                                .context("Failed to create HTTP flight provider")?,
                        ),
                        "http",
                    )
                }
                None => {
                    info!(
                        latency = fmt_duration(config.mock_latency),
                        "PROVIDER_BASE_URL not set, using mock flight provider"
                    );
                    (Arc::new(MockFlightProvider::new(config.mock_latency)), "mock")
                }
            };

        let cache = FlightCache::new(&config.cache_settings());
        let flights = FlightService::new(provider, cache, config.retry_policy());

        if config.auth_secret == DEV_AUTH_SECRET {
            warn!("AUTH_SECRET not set, using the built-in development secret");
        }
        let oracle = Arc::new(JwtOracle::new(&config.auth_secret));

        let app_state = AppState::new(flights, oracle, config.auth_settings(), provider_mode);

        Ok(App { config, app_state })
    }

    /// Shared state handle, exposed for tests.
    pub fn state(&self) -> &AppState {
        &self.app_state
    }

    /// Serve the API until SIGINT/SIGTERM, then drain in-flight requests for
    /// at most the configured shutdown timeout.
    pub async fn run(self) -> anyhow::Result<()> {
        let router = create_router(self.app_state.clone());
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        info!(%addr, "web server listening");

        let shutdown = CancellationToken::new();
        tokio::spawn(wait_for_shutdown_signal(shutdown.clone()));

        let graceful = shutdown.clone();
        let mut server = pin!(
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { graceful.cancelled().await })
                .into_future()
        );

        tokio::select! {
            result = &mut server => result.context("server error")?,
            _ = shutdown.cancelled() => {
                match tokio::time::timeout(self.config.shutdown_timeout, &mut server).await {
                    Ok(result) => result.context("server error during drain")?,
                    Err(_) => warn!(
                        timeout = fmt_duration(self.config.shutdown_timeout),
                        "drain timed out, aborting in-flight requests"
                    ),
                }
            }
        }

        info!("shutdown complete");
        Ok(())
    }
}

async fn wait_for_shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler available; park forever rather than spin.
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
    shutdown.cancel();
}
