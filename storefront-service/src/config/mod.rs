use rust_decimal::Decimal;
use secrecy::Secret;
use service_core::config::{get_env, is_production, parse_env};
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub checkout: CheckoutConfig,
    #[cfg(feature = "razorpay")]
    pub razorpay: RazorpayConfig,
    #[cfg(feature = "ccavenue")]
    pub ccavenue: CcavenueConfig,
    pub smtp: SmtpConfig,
    pub company: CompanyConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally visible origin, used for gateway return URLs and invoice links.
    pub public_url: String,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// Carts fall back to process memory when unset.
    pub url: Option<Secret<String>>,
    pub session_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CheckoutConfig {
    pub currency: String,
    pub minimum_amount: Decimal,
    pub gateway_timeout_secs: u64,
}

impl CheckoutConfig {
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            minimum_amount: Decimal::ONE,
            gateway_timeout_secs: 10,
        }
    }
}

#[cfg(feature = "razorpay")]
#[derive(Clone, Debug)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base: String,
}

#[cfg(feature = "ccavenue")]
#[derive(Clone, Debug)]
pub struct CcavenueConfig {
    pub merchant_id: String,
    pub access_code: String,
    pub working_key: Secret<String>,
    pub transaction_url: String,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub from_email: String,
    pub from_name: String,
    pub enabled: bool,
}

/// Seller block printed on invoices.
#[derive(Clone, Debug)]
pub struct CompanyConfig {
    pub name: String,
    pub address: String,
    pub email: String,
    pub phone: String,
    pub gst_number: String,
}

impl Default for CompanyConfig {
    fn default() -> Self {
        Self {
            name: "Bell Server Pvt Ltd".to_string(),
            address: "123 Tech Park, Digital City, Bengaluru, Karnataka 560001, India".to_string(),
            email: "support@bellserver.com".to_string(),
            phone: String::new(),
            gst_number: String::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let is_prod = is_production();

        let port = parse_env("STOREFRONT_PORT", 3010u16);
        let public_url = get_env(
            "STOREFRONT_PUBLIC_URL",
            Some(&format!("http://localhost:{}", port)),
            is_prod,
        )?;

        let minimum_amount = get_env("STOREFRONT_MINIMUM_AMOUNT", Some("1"), is_prod)?
            .parse::<Decimal>()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("STOREFRONT_MINIMUM_AMOUNT: {}", e)))?;

        Ok(Self {
            service_name: "storefront-service".to_string(),
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            server: ServerConfig {
                host: get_env("STOREFRONT_HOST", Some("0.0.0.0"), is_prod)?,
                port,
                public_url: public_url.trim_end_matches('/').to_string(),
            },
            database: DatabaseConfig {
                url: Secret::new(get_env(
                    "STOREFRONT_DATABASE_URL",
                    Some("mongodb://localhost:27017"),
                    is_prod,
                )?),
                db_name: get_env("STOREFRONT_DATABASE_NAME", Some("storefront_db"), is_prod)?,
            },
            redis: RedisConfig {
                url: env::var("STOREFRONT_REDIS_URL").ok().map(Secret::new),
                session_ttl_secs: parse_env("STOREFRONT_SESSION_TTL_SECS", 1_209_600u64),
            },
            checkout: CheckoutConfig {
                currency: get_env("STOREFRONT_CURRENCY", Some("INR"), is_prod)?,
                minimum_amount,
                gateway_timeout_secs: parse_env("STOREFRONT_GATEWAY_TIMEOUT_SECS", 10u64),
            },
            #[cfg(feature = "razorpay")]
            razorpay: RazorpayConfig {
                key_id: get_env("RAZORPAY_KEY_ID", Some(""), is_prod)?,
                key_secret: Secret::new(get_env("RAZORPAY_KEY_SECRET", Some(""), is_prod)?),
                webhook_secret: Secret::new(get_env("RAZORPAY_WEBHOOK_SECRET", Some(""), is_prod)?),
                api_base: get_env(
                    "RAZORPAY_API_BASE",
                    Some("https://api.razorpay.com/v1"),
                    false,
                )?,
            },
            #[cfg(feature = "ccavenue")]
            ccavenue: CcavenueConfig {
                merchant_id: get_env("CCAVENUE_MERCHANT_ID", Some(""), is_prod)?,
                access_code: get_env("CCAVENUE_ACCESS_CODE", Some(""), is_prod)?,
                working_key: Secret::new(get_env("CCAVENUE_WORKING_KEY", Some(""), is_prod)?),
                transaction_url: get_env(
                    "CCAVENUE_TRANSACTION_URL",
                    Some("https://secure.ccavenue.com/transaction/transaction.do?command=initiateTransaction"),
                    false,
                )?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                port: parse_env("SMTP_PORT", 587u16),
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: Secret::new(get_env("SMTP_PASSWORD", Some(""), is_prod)?),
                from_email: get_env("SMTP_FROM_EMAIL", Some("billing@bellserver.com"), is_prod)?,
                from_name: get_env("SMTP_FROM_NAME", Some("Bell Server"), is_prod)?,
                enabled: parse_env("SMTP_ENABLED", false),
            },
            company: CompanyConfig {
                name: env::var("INVOICE_COMPANY_NAME")
                    .unwrap_or_else(|_| CompanyConfig::default().name),
                address: env::var("INVOICE_COMPANY_ADDRESS")
                    .unwrap_or_else(|_| CompanyConfig::default().address),
                email: env::var("INVOICE_COMPANY_EMAIL")
                    .unwrap_or_else(|_| CompanyConfig::default().email),
                phone: env::var("INVOICE_COMPANY_PHONE").unwrap_or_default(),
                gst_number: env::var("INVOICE_COMPANY_GST").unwrap_or_default(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_defaults_match_gateway_expectations() {
        let checkout = CheckoutConfig::default();
        assert_eq!(checkout.currency, "INR");
        assert_eq!(checkout.minimum_amount, Decimal::ONE);
        assert_eq!(checkout.gateway_timeout(), Duration::from_secs(10));
    }
}
