//! Application assembly and lifecycle.
//!
//! `Application::build` does the full production wiring: database pool,
//! migrations, provider registry, rate limiters, listener. Tests inject an
//! in-memory store and mock providers through `build_with_state` and read the
//! bound port back with `port()`.

use std::net::SocketAddr;
use std::sync::Arc;

use service_core::error::AppError;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use tokio::net::TcpListener;
use tokio::signal;

use crate::config::IdentityConfig;
use crate::providers::{ProviderRegistry, RegisteredProviders};
use crate::services::{AuthService, IdentityStore, PostgresStore};
use crate::{build_router, AppState};

pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    pub async fn build(config: IdentityConfig) -> Result<Self, AppError> {
        crate::services::metrics::init_metrics();

        let pool = crate::db::create_pool(&config.database)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
        crate::db::run_migrations(&pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;

        let store: Arc<dyn IdentityStore> = Arc::new(PostgresStore::new(pool));
        let registry = Arc::new(ProviderRegistry::new(config.auth.clone()));

        Self::bind(config, store, registry).await
    }

    /// Assembly with an injected store and a pre-seeded provider set. No
    /// database or provider adapters are constructed.
    pub async fn build_with_state(
        config: IdentityConfig,
        store: Arc<dyn IdentityStore>,
        providers: RegisteredProviders,
    ) -> Result<Self, AppError> {
        crate::services::metrics::init_metrics();

        let registry = Arc::new(ProviderRegistry::with_providers(
            config.auth.clone(),
            providers,
        ));

        Self::bind(config, store, registry).await
    }

    async fn bind(
        config: IdentityConfig,
        store: Arc<dyn IdentityStore>,
        registry: Arc<ProviderRegistry>,
    ) -> Result<Self, AppError> {
        let auth_service = AuthService::new(Arc::clone(&registry), Arc::clone(&store));

        let login_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
        );
        let register_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.register_attempts,
            config.rate_limit.register_window_seconds,
        );
        let password_reset_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.password_reset_attempts,
            config.rate_limit.password_reset_window_seconds,
        );
        let ip_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        );

        // Port 0 asks the OS for an ephemeral port; `port()` reports the
        // one actually bound.
        let address = format!("{}:{}", config.common.bind_address, config.common.port);
        let listener = TcpListener::bind(&address).await?;
        let port = listener.local_addr()?.port();

        let state = AppState {
            config,
            store,
            registry,
            auth_service,
            login_rate_limiter,
            register_rate_limiter,
            password_reset_rate_limiter,
            ip_rate_limiter,
        };

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), AppError> {
        let Application {
            listener, state, ..
        } = self;

        tracing::info!(
            address = %listener.local_addr()?,
            service = %state.config.service_name,
            version = %state.config.service_version,
            environment = ?state.config.environment,
            primary_provider = %state.config.auth.primary_provider,
            "Listening"
        );

        let app = build_router(state).await?;

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("Service shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    // Give in-flight requests time to complete
    tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;
}
