//! Application startup and lifecycle management.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::handlers;
use crate::middleware::session::session_middleware;
use crate::services::{
    configured_gateway, CartStore, CatalogRepository, CheckoutService, InvoiceDispatcher,
    InvoiceMailer, MemoryCartStore, MongoCatalogRepository, MongoOrderRepository,
    OrderRepository, PaymentGateway, ReconciliationService, RedisCartStore, SmtpInvoiceMailer,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub catalog: Arc<dyn CatalogRepository>,
    pub carts: Arc<dyn CartStore>,
    pub checkout: CheckoutService,
    pub reconciliation: ReconciliationService,
}

impl AppState {
    /// Wire the checkout and reconciliation services over the given backends.
    pub fn new(
        config: Config,
        catalog: Arc<dyn CatalogRepository>,
        orders: Arc<dyn OrderRepository>,
        carts: Arc<dyn CartStore>,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn InvoiceMailer>,
    ) -> Self {
        let checkout = CheckoutService::new(
            catalog.clone(),
            orders.clone(),
            carts.clone(),
            gateway.clone(),
            config.checkout.clone(),
            config.server.public_url.clone(),
        );
        let reconciliation = ReconciliationService::new(
            orders,
            carts.clone(),
            gateway,
            InvoiceDispatcher::new(mailer),
            config.checkout.currency.clone(),
        );

        Self {
            config,
            catalog,
            carts,
            checkout,
            reconciliation,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let payments = Router::new()
        .route(
            "/payment/verification",
            post(handlers::payments::verify_payment)
                .fallback(handlers::payments::verification_method_not_allowed),
        )
        .route("/payment/failed", get(handlers::payments::payment_failed_page))
        .route(
            "/payment/success/:gateway_order_id",
            get(handlers::payments::payment_success),
        )
        .route(
            "/payment/failed/:gateway_order_id",
            get(handlers::payments::payment_failed),
        )
        .route(
            "/payment/cancelled/:gateway_order_id",
            get(handlers::payments::payment_cancelled),
        );

    #[cfg(feature = "ccavenue")]
    let payments = payments.route(
        crate::services::checkout::GATEWAY_RETURN_PATH,
        post(handlers::payments::ccavenue_response),
    );

    let router = Router::new()
        .route("/plans", get(handlers::catalog::list_plans))
        .route("/plans/:plan_id", get(handlers::catalog::get_plan))
        .route("/cart", get(handlers::cart::view_cart))
        .route("/cart/add/:plan_id", post(handlers::cart::add_to_cart))
        .route("/cart/remove/:plan_id", post(handlers::cart::remove_from_cart))
        .route("/order/create", post(handlers::orders::create_order))
        .merge(payments)
        .layer(from_fn(session_middleware));

    // Server-to-server routes carry no browser session.
    #[cfg(feature = "razorpay")]
    let router = router.route(
        "/webhooks/razorpay",
        post(handlers::webhooks::razorpay_webhook),
    );

    router
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    local_addr: SocketAddr,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Connect every backend named in `config` and bind the HTTP listener.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret())
            .await
            .map_err(|e| {
                tracing::error!("Failed to parse MongoDB connection string: {}", e);
                AppError::DatabaseError(e.into())
            })?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options).map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            AppError::DatabaseError(e.into())
        })?;
        let db = client.database(&config.database.db_name);

        let orders = MongoOrderRepository::new(&db);
        orders.init_indexes().await.map_err(|e| {
            tracing::error!("Failed to initialize database indexes: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let catalog = MongoCatalogRepository::new(&db);

        let carts: Arc<dyn CartStore> = match &config.redis.url {
            Some(url) => {
                let redis = redis::Client::open(url.expose_secret().as_str()).map_err(|e| {
                    tracing::error!("Failed to connect to Redis: {}", e);
                    AppError::RedisError(e)
                })?;
                Arc::new(RedisCartStore::connect(redis, config.redis.session_ttl_secs).await?)
            }
            None => {
                tracing::warn!("Redis not configured - carts are kept in process memory");
                Arc::new(MemoryCartStore::new())
            }
        };

        let gateway = configured_gateway(&config);
        let mailer = SmtpInvoiceMailer::new(config.smtp.clone(), config.company.clone())
            .map_err(|e| {
                tracing::error!("Failed to initialize invoice mailer: {}", e);
                AppError::ConfigError(e.into())
            })?;

        let state = AppState::new(
            config.clone(),
            Arc::new(catalog),
            Arc::new(orders),
            carts,
            Arc::new(gateway),
            Arc::new(mailer),
        );

        Self::build_with_state(&config, state).await
    }

    /// Bind the listener around a pre-wired state (port 0 = random port for testing).
    pub async fn build_with_state(config: &Config, state: AppState) -> Result<Self, AppError> {
        let addr = (config.server.host.as_str(), config.server.port);
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(
                "Failed to bind HTTP listener to {}:{}: {}",
                config.server.host,
                config.server.port,
                e
            );
            AppError::from(e)
        })?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Storefront service: HTTP on {}", local_addr);

        Ok(Self {
            local_addr,
            listener,
            router: build_router(state),
        })
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router).await
    }
}
