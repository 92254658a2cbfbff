use crate::{
    app::AppContext,
    config::Config,
    health,
    http::RouteModule,
    jobs::{JobRegistry, WorkerPool},
    middleware::MakeRequestUuid,
};
use axum::{Router, extract::DefaultBodyLimit, routing::get};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// The HTTP service plus its background workers
pub struct App {
    router: Router<AppContext>,
    config: Config,
    context: AppContext,
    worker_pool: Option<WorkerPool>,
}

impl App {
    pub fn with_config(config: Config) -> Self {
        Self {
            router: Router::new(),
            config,
            context: AppContext::new(),
            worker_pool: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn register_module<M: RouteModule>(mut self, module: M) -> Self {
        self.router = module.register(self.router);
        self
    }

    /// Set the application context and mount `GET /health`
    pub fn with_context(mut self, context: AppContext) -> Self {
        self.context = context;
        self.router = self
            .router
            .route("/health", get(health::health_handler));
        self
    }

    /// Router with state and middleware applied, for in-process tests
    pub fn into_test_router(self) -> Router {
        let app = self.with_middleware();
        app.router.with_state(app.context)
    }

    /// Middleware, innermost first. The request id is set outside the
    /// propagation layer so the response echoes the generated id.
    fn with_middleware(mut self) -> Self {
        self.router = self
            .router
            .layer(DefaultBodyLimit::max(self.config.server.max_body_size))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));
        self
    }

    /// Spawn job workers against the context's queue
    ///
    /// Does nothing when jobs are disabled or no queue is configured, so
    /// several processes can share one database queue with only some of them
    /// running workers.
    pub fn start_workers(mut self, registry: Arc<JobRegistry>) -> Self {
        if !self.config.jobs.enabled {
            tracing::info!("Background jobs disabled, not starting workers");
            return self;
        }
        let Some(queue) = self.context.jobs_opt().cloned() else {
            tracing::warn!("No job queue configured, not starting workers");
            return self;
        };

        let pool = WorkerPool::new(
            queue,
            registry,
            Arc::new(self.context.clone()),
            self.config.jobs.worker_count,
        );
        tracing::info!(worker_count = pool.len(), "Background job workers started");
        self.worker_pool = Some(pool);
        self
    }

    pub fn has_workers(&self) -> bool {
        self.worker_pool.as_ref().is_some_and(|pool| !pool.is_empty())
    }

    /// Serve until SIGINT/SIGTERM, then drain the worker pool
    pub async fn serve(self) -> Result<(), std::io::Error> {
        let addr = self
            .config
            .server
            .addr()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let mut app = self.with_middleware();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        tracing::info!("Server starting on http://{}", addr);
        tracing::info!(
            path = %app.config.notify.path,
            "Accepting Adyen notifications"
        );

        let worker_pool = app.worker_pool.take();
        let shutdown = async move {
            shutdown_signal().await;
            if let Some(pool) = worker_pool {
                pool.shutdown().await;
            }
        };

        let router = app.router.with_state(app.context);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

impl Default for App {
    fn default() -> Self {
        Self::with_config(Config::default())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, starting graceful shutdown");
        },
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    tracing::info!("Shutdown complete");
}
