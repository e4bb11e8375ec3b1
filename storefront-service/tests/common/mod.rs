#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use secrecy::Secret;
use serde_json::{json, Value};
use storefront_service::config::{
    CheckoutConfig, CompanyConfig, Config, DatabaseConfig, RedisConfig, ServerConfig, SmtpConfig,
};
use storefront_service::models::Plan;
use storefront_service::services::{
    configured_gateway, InMemoryCatalog, InMemoryOrderRepository, MemoryCartStore,
    MockInvoiceMailer,
};
use storefront_service::startup::{AppState, Application};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[cfg(feature = "razorpay")]
pub const KEY_SECRET: &str = "test_key_secret";
#[cfg(feature = "razorpay")]
pub const WEBHOOK_SECRET: &str = "test_webhook_secret";
#[cfg(feature = "ccavenue")]
pub const WORKING_KEY: &str = "TESTWORKINGKEY";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub orders: Arc<InMemoryOrderRepository>,
    pub catalog: Arc<InMemoryCatalog>,
    pub mailer: Arc<MockInvoiceMailer>,
    pub gateway: MockServer,
}

pub fn test_config(gateway_uri: &str) -> Config {
    Config {
        service_name: "storefront-service-test".to_string(),
        log_level: "info".to_string(),
        otlp_endpoint: None,
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            public_url: "http://localhost:3010".to_string(),
        },
        database: DatabaseConfig {
            url: Secret::new("mongodb://localhost:27017".to_string()),
            db_name: "storefront_test".to_string(),
        },
        redis: RedisConfig {
            url: None,
            session_ttl_secs: 3600,
        },
        checkout: CheckoutConfig {
            gateway_timeout_secs: 2,
            ..CheckoutConfig::default()
        },
        #[cfg(feature = "razorpay")]
        razorpay: storefront_service::config::RazorpayConfig {
            key_id: "rzp_test_key".to_string(),
            key_secret: Secret::new(KEY_SECRET.to_string()),
            webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
            api_base: gateway_uri.to_string(),
        },
        #[cfg(feature = "ccavenue")]
        ccavenue: storefront_service::config::CcavenueConfig {
            merchant_id: "123456".to_string(),
            access_code: "AVTEST00".to_string(),
            working_key: Secret::new(WORKING_KEY.to_string()),
            transaction_url: format!("{}/transaction", gateway_uri),
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 587,
            user: String::new(),
            password: Secret::new(String::new()),
            from_email: "billing@bellserver.com".to_string(),
            from_name: "Bell Server".to_string(),
            enabled: false,
        },
        company: CompanyConfig::default(),
    }
}

pub fn test_plans() -> Vec<Plan> {
    vec![
        Plan::new("vps-basic", "VPS Basic", dec!(999)),
        Plan::new("vps-pro", "VPS Pro", dec!(2499)).single_instance(),
        Plan::new("trial", "Trial", dec!(0.50)),
    ]
}

/// State over fresh in-memory backends.
pub fn test_state(config: &Config) -> AppState {
    AppState::new(
        config.clone(),
        Arc::new(InMemoryCatalog::new(test_plans())),
        Arc::new(InMemoryOrderRepository::new()),
        Arc::new(MemoryCartStore::new()),
        Arc::new(configured_gateway(config)),
        Arc::new(MockInvoiceMailer::new()),
    )
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_mailer(MockInvoiceMailer::new()).await
    }

    pub async fn spawn_with_mailer(mailer: MockInvoiceMailer) -> Self {
        let gateway = MockServer::start().await;
        let config = test_config(&gateway.uri());

        let orders = Arc::new(InMemoryOrderRepository::new());
        let catalog = Arc::new(InMemoryCatalog::new(test_plans()));
        let mailer = Arc::new(mailer);

        let state = AppState::new(
            config.clone(),
            catalog.clone(),
            orders.clone(),
            Arc::new(MemoryCartStore::new()),
            Arc::new(configured_gateway(&config)),
            mailer.clone(),
        );

        let app = Application::build_with_state(&config, state)
            .await
            .expect("Failed to build test application");
        let address = format!("http://127.0.0.1:{}", app.port());

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to build HTTP client");

        for _ in 0..50 {
            if client
                .get(format!("{}/health", address))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            client,
            orders,
            catalog,
            mailer,
            gateway,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn add_to_cart(&self, plan_id: &str, quantity: u32) -> reqwest::Response {
        self.client
            .post(self.url(&format!("/cart/add/{}", plan_id)))
            .form(&[("quantity", quantity.to_string())])
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn cart(&self) -> Value {
        self.client
            .get(self.url("/cart"))
            .send()
            .await
            .expect("Failed to execute request")
            .json()
            .await
            .expect("Cart response is not JSON")
    }

    pub async fn create_order(&self) -> reqwest::Response {
        self.client
            .post(self.url("/order/create"))
            .form(&order_form())
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Razorpay answers the next order creation with `gateway_order_id`.
    pub async fn mount_gateway_order(&self, gateway_order_id: &str, amount: u64) {
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": gateway_order_id,
                "entity": "order",
                "amount": amount,
                "currency": "INR",
                "status": "created"
            })))
            .mount(&self.gateway)
            .await;
    }

    pub async fn mount_gateway_outage(&self) {
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {
                    "code": "SERVER_ERROR",
                    "description": "The server encountered an error"
                }
            })))
            .mount(&self.gateway)
            .await;
    }

    /// Invoice delivery runs in the background; poll until it settles.
    pub async fn wait_for_invoices(&self, expected: u64) -> u64 {
        for _ in 0..40 {
            if self.mailer.send_count() >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        self.mailer.send_count()
    }
}

pub fn order_form() -> Vec<(&'static str, &'static str)> {
    vec![
        ("first_name", "Asha"),
        ("last_name", "Rao"),
        ("email", "asha@example.com"),
        ("address", "12 MG Road"),
        ("postal_code", "560001"),
        ("city", "Bengaluru"),
        ("state", "Karnataka"),
        ("phone", "9000000000"),
        ("domain_name", "algo.example.com"),
        ("broker_name", "zerodha"),
    ]
}
