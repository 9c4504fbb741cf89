//! Application startup and lifecycle management.

use crate::config::HouseholdConfig;
use crate::handlers;
use crate::services::{init_metrics, Database, InMemoryStore, LedgerStore};
use axum::{middleware, routing::get, Router};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: HouseholdConfig,
    pub store: Arc<dyn LedgerStore>,
    /// `"postgres"` or `"memory"`, reported by the health endpoint.
    pub store_kind: &'static str,
}

impl AppState {
    pub fn new(config: HouseholdConfig, store: Arc<dyn LedgerStore>, store_kind: &'static str) -> Self {
        Self {
            config,
            store,
            store_kind,
        }
    }
}

/// Build the HTTP router for the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route(
            "/items",
            get(handlers::list_items).post(handlers::create_item),
        )
        .route(
            "/items/:item",
            get(handlers::get_item)
                .put(handlers::update_item)
                .delete(handlers::delete_item),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
    database: Option<Database>,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: HouseholdConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: HouseholdConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: HouseholdConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let opening_balance = config.ledger.opening_balance;

        let (store, store_kind, database) = match &config.database {
            Some(db_config) => {
                let db = Database::new(
                    &db_config.url,
                    db_config.max_connections,
                    db_config.min_connections,
                    opening_balance,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    e
                })?;

                if run_migrations {
                    db.run_migrations().await.map_err(|e| {
                        tracing::error!(error = %e, "Failed to run migrations");
                        e
                    })?;
                }

                let store: Arc<dyn LedgerStore> = Arc::new(db.clone());
                (store, "postgres", Some(db))
            }
            None => {
                tracing::warn!(
                    "DATABASE_URL not set, using in-memory ledger store (data is lost on restart)"
                );
                let store: Arc<dyn LedgerStore> = Arc::new(InMemoryStore::new(opening_balance));
                (store, "memory", None)
            }
        };

        let state = AppState::new(config.clone(), store, store_kind);

        // Bind HTTP listener (port 0 = random port for testing)
        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(
            http_port = http_port,
            store = store_kind,
            opening_balance = opening_balance,
            "Household service listener bound"
        );

        Ok(Self {
            http_port,
            http_listener,
            state,
            database,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Get the PostgreSQL store, if one is configured.
    pub fn db(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    /// Serve until `shutdown` resolves, then drain connections and close the
    /// pool.
    pub async fn run_with_shutdown<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = build_router(self.state);

        tracing::info!(
            service = "household-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        let result = axum::serve(self.http_listener, router)
            .with_graceful_shutdown(shutdown)
            .await;

        if let Some(db) = &self.database {
            db.close().await;
        }

        if let Err(e) = result {
            tracing::error!(error = %e, "HTTP server error");
            return Err(std::io::Error::other(format!("HTTP server error: {}", e)));
        }

        Ok(())
    }
}
