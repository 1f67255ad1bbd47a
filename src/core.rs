use crate::{
    app::AppContext,
    config::Config,
    health,
    http::RouteModule,
    institutes::InstituteRoutes,
    members::RegistrationRoutes,
    middleware::MakeRequestUuid,
    subscriptions::{SchedulerHandle, SubscriptionRoutes},
};
use axum::{Router, extract::DefaultBodyLimit, routing::get};
use std::time::Duration;
use tokio::signal;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// The campus-ledger server: routes, middleware, and the in-process scheduler
pub struct App {
    router: Router<AppContext>,
    config: Config,
    context: AppContext,
    scheduler: Option<SchedulerHandle>,
}

impl App {
    /// Creates a new App with default configuration
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a new App with the provided configuration
    pub fn with_config(config: Config) -> Self {
        crate::error::set_dev_mode(config.dev.is_dev_mode());

        Self {
            router: Self::build_router(),
            config,
            context: AppContext::new(),
            scheduler: None,
        }
    }

    /// Builder pattern for constructing an App
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    fn build_router() -> Router<AppContext> {
        Router::<AppContext>::new().route("/health", get(health::health_handler))
    }

    /// Register a route module with the application
    ///
    /// Handlers should use `State<AppContext>` to access the application context.
    pub fn register_module<M: RouteModule>(mut self, module: M) -> Self {
        let module_router = module.routes();
        if let Some(prefix) = module.prefix() {
            self.router = self.router.nest(prefix, module_router);
        } else {
            self.router = self.router.merge(module_router);
        }
        self
    }

    /// Register the subscription, institute and registration endpoints
    pub fn with_default_routes(self) -> Self {
        self.register_module(SubscriptionRoutes)
            .register_module(InstituteRoutes)
            .register_module(RegistrationRoutes)
    }

    /// Set the application context
    pub fn with_context(mut self, context: AppContext) -> Self {
        self.context = context;
        self
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    /// Get the router for testing purposes
    ///
    /// The returned router has the AppContext state applied and can be driven
    /// with the `campus_ledger::testing` helpers.
    pub fn into_test_router(self) -> Router {
        self.router.with_state(self.context)
    }

    /// Spawn the lifecycle scheduler if it is enabled in the configuration
    ///
    /// The context records the tick interval so `/health` can judge freshness.
    pub fn start_scheduler(mut self) -> Self {
        if !self.config.scheduler.enabled {
            tracing::info!("Lifecycle scheduler disabled");
            return self;
        }

        let interval = self.config.scheduler.interval();
        self.context.scheduler_interval = Some(interval);

        let handle = self
            .context
            .scheduler()
            .with_batch_size(self.config.scheduler.batch_size)
            .spawn(interval);
        self.scheduler = Some(handle);
        self
    }

    /// Apply middleware stack and prepare for serving
    fn with_middleware(mut self) -> Self {
        let mut router = self.router;

        // Middleware order (from outer to inner):
        // 1. Body size limit
        router = router.layer(DefaultBodyLimit::max(self.config.server.max_body_size));

        // 2. Request ID
        router = router
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(PropagateRequestIdLayer::x_request_id());

        // 3. HTTP tracing
        router = router.layer(TraceLayer::new_for_http());

        self.router = router;
        self
    }

    /// Start the application server
    pub async fn serve(self) -> Result<(), std::io::Error> {
        let addr = self
            .config
            .server
            .addr()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let mut app = self.with_middleware();

        let listener = tokio::net::TcpListener::bind(addr).await?;

        tracing::info!("Server starting on http://{}", addr);
        tracing::info!("Health check available at http://{}/health", addr);

        let scheduler = app.scheduler.take();
        let shutdown = async move {
            shutdown_signal().await;
            if let Some(handle) = scheduler {
                handle.shutdown().await;
            }
        };

        // Router<AppContext> is a router missing its state; only Router<()> can be served
        let final_router = app.router.with_state(app.context);

        axum::serve(listener, final_router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for App with fluent API
#[must_use = "builder does nothing until you call build()"]
pub struct AppBuilder {
    config: Config,
    context: AppContext,
    modules: Vec<(Option<String>, Router<AppContext>)>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            context: AppContext::new(),
            modules: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_context(mut self, context: AppContext) -> Self {
        self.context = context;
        self
    }

    pub fn register_module<M: RouteModule>(mut self, module: M) -> Self {
        let prefix = module.prefix().map(str::to_string);
        self.modules.push((prefix, module.routes()));
        self
    }

    pub fn build(self) -> App {
        let mut app = App::with_config(self.config).with_context(self.context);

        for (prefix, module_router) in self.modules {
            app.router = match prefix {
                Some(prefix) => app.router.nest(&prefix, module_router),
                None => app.router.merge(module_router),
            };
        }

        app
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    // Give connections a grace period to close
    tokio::time::sleep(Duration::from_secs(1)).await;
    tracing::info!("Shutdown complete");
}
