//! Invoice documents and their delivery.
//!
//! Delivery is best effort: it runs on a detached task after the order is
//! already paid, and failures are only logged.

use askama::Template;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{CompanyConfig, SmtpConfig};
use crate::models::Order;

#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("failed to render invoice: {0}")]
    Render(String),

    #[error("invalid address: {0}")]
    Address(String),

    #[error("failed to build message: {0}")]
    Message(String),

    #[error("failed to send email: {0}")]
    Transport(String),

    #[error("invoice email is not enabled")]
    NotEnabled,
}

fn money(amount: Decimal) -> String {
    format!("INR {:.2}", amount)
}

/// Writes text top-down on one A4 page.
struct PageWriter {
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
}

impl PageWriter {
    const LEFT: f32 = 20.0;
    const LINE: f32 = 6.0;

    fn text(&mut self, text: &str, size: f32) {
        self.layer
            .use_text(text, size, Mm(Self::LEFT), Mm(self.y), &self.regular);
        self.y -= Self::LINE;
    }

    fn heading(&mut self, text: &str, size: f32) {
        self.layer
            .use_text(text, size, Mm(Self::LEFT), Mm(self.y), &self.bold);
        self.y -= Self::LINE + 1.0;
    }

    fn columns(&mut self, cells: &[(&str, f32)], bold: bool) {
        let font = if bold { &self.bold } else { &self.regular };
        for (text, x) in cells {
            self.layer.use_text(*text, 10.0, Mm(*x), Mm(self.y), font);
        }
        self.y -= Self::LINE;
    }

    fn gap(&mut self) {
        self.y -= Self::LINE / 2.0;
    }
}

/// Render a one-page PDF invoice for a paid order.
pub fn render_invoice_pdf(order: &Order, company: &CompanyConfig) -> Result<Vec<u8>, InvoiceError> {
    let invoice_number = order.id.invoice_number();
    let (doc, page, layer) = PdfDocument::new(
        format!("Invoice {}", invoice_number),
        Mm(210.0),
        Mm(297.0),
        "Invoice".to_string(),
    );
    let render = |e: printpdf::Error| InvoiceError::Render(e.to_string());
    let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(render)?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(render)?;

    let mut page = PageWriter {
        layer: doc.get_page(page).get_layer(layer),
        regular,
        bold,
        y: 277.0,
    };

    page.heading(&company.name, 16.0);
    page.text(&company.address, 9.0);
    page.text(&format!("Email: {}", company.email), 9.0);
    if !company.phone.is_empty() {
        page.text(&format!("Phone: {}", company.phone), 9.0);
    }
    if !company.gst_number.is_empty() {
        page.text(&format!("GST: {}", company.gst_number), 9.0);
    }
    page.gap();

    page.heading("TAX INVOICE", 14.0);
    page.text(&format!("Invoice No: {}", invoice_number), 10.0);
    page.text(
        &format!("Invoice Date: {}", order.updated_at.format("%d %b %Y")),
        10.0,
    );
    page.text(&format!("Order Date: {}", order.created_at.format("%d %b %Y")), 10.0);
    page.text(&format!("Status: {}", order.status.as_str().to_uppercase()), 10.0);
    if let Some(payment_id) = &order.gateway_payment_id {
        page.text(&format!("Payment ID: {}", payment_id), 10.0);
    }
    if let Some(gateway_order_id) = &order.gateway_order_id {
        page.text(&format!("Gateway Order ID: {}", gateway_order_id), 10.0);
    }
    page.gap();

    let billing = &order.billing;
    page.heading("Bill To", 12.0);
    page.text(&billing.name, 10.0);
    page.text(&billing.address, 10.0);
    page.text(
        &format!("{}, {} {}", billing.city, billing.state, billing.postal_code),
        10.0,
    );
    page.text(&order.customer.email, 10.0);
    page.text(&order.customer.phone, 10.0);
    if !billing.gst_number.is_empty() {
        page.text(&format!("GSTIN: {}", billing.gst_number), 10.0);
    }
    page.gap();

    page.heading("Service", 12.0);
    page.text(&format!("Domain: {}", order.hosting.domain_name), 10.0);
    page.text(&format!("Broker: {}", order.hosting.broker.display_name()), 10.0);
    page.gap();

    page.columns(
        &[
            ("Plan", 20.0),
            ("Billing", 90.0),
            ("Qty", 120.0),
            ("Price", 140.0),
            ("Amount", 170.0),
        ],
        true,
    );
    for item in &order.items {
        let quantity = item.quantity.to_string();
        let price = money(item.price);
        let amount = money(item.cost());
        page.columns(
            &[
                (item.plan_name.as_str(), 20.0),
                (item.duration.label(), 90.0),
                (quantity.as_str(), 120.0),
                (price.as_str(), 140.0),
                (amount.as_str(), 170.0),
            ],
            false,
        );
    }
    page.gap();
    let total = money(order.total_cost());
    page.columns(&[("Total", 140.0), (total.as_str(), 170.0)], true);
    page.gap();
    page.text(&format!("Thank you for choosing {}.", company.name), 9.0);

    doc.save_to_bytes().map_err(render)
}

#[derive(Template)]
#[template(path = "invoice_email.html")]
struct InvoiceEmailTemplate<'a> {
    company: &'a str,
    customer_name: String,
    invoice_number: String,
    domain_name: &'a str,
    items: Vec<EmailLine>,
    total: String,
    support_email: &'a str,
}

struct EmailLine {
    name: String,
    quantity: u32,
    amount: String,
}

#[async_trait]
pub trait InvoiceMailer: Send + Sync {
    async fn send(&self, order: &Order) -> Result<(), InvoiceError>;
}

pub struct SmtpInvoiceMailer {
    config: SmtpConfig,
    company: CompanyConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpInvoiceMailer {
    pub fn new(config: SmtpConfig, company: CompanyConfig) -> Result<Self, InvoiceError> {
        if !config.enabled {
            return Ok(Self {
                config,
                company,
                transport: None,
            });
        }

        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().clone(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| InvoiceError::Transport(format!("Failed to create SMTP relay: {}", e)))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            config,
            company,
            transport: Some(transport),
        })
    }

    fn build_message(&self, order: &Order, pdf: Vec<u8>) -> Result<Message, InvoiceError> {
        let invoice_number = order.id.invoice_number();

        let from: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| InvoiceError::Address(format!("from: {}", e)))?;
        let to: Mailbox = format!("{} <{}>", order.customer.full_name(), order.customer.email)
            .parse()
            .map_err(|e| InvoiceError::Address(format!("to: {}", e)))?;

        let html = InvoiceEmailTemplate {
            company: &self.config.from_name,
            customer_name: order.customer.full_name(),
            invoice_number: invoice_number.clone(),
            domain_name: &order.hosting.domain_name,
            items: order
                .items
                .iter()
                .map(|item| EmailLine {
                    name: item.plan_name.clone(),
                    quantity: item.quantity,
                    amount: money(item.cost()),
                })
                .collect(),
            total: money(order.total_cost()),
            support_email: &self.company.email,
        }
        .render()
        .map_err(|e| InvoiceError::Render(e.to_string()))?;

        let pdf_type = ContentType::parse("application/pdf")
            .map_err(|e| InvoiceError::Message(e.to_string()))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(format!(
                "{} Invoice #{} - Payment Confirmed",
                self.config.from_name, invoice_number
            ))
            .multipart(
                MultiPart::mixed()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    )
                    .singlepart(
                        Attachment::new(format!("Invoice_{}.pdf", invoice_number))
                            .body(pdf, pdf_type),
                    ),
            )
            .map_err(|e| InvoiceError::Message(e.to_string()))
    }
}

#[async_trait]
impl InvoiceMailer for SmtpInvoiceMailer {
    async fn send(&self, order: &Order) -> Result<(), InvoiceError> {
        let transport = self.transport.as_ref().ok_or(InvoiceError::NotEnabled)?;

        let pdf = render_invoice_pdf(order, &self.company)?;
        let message = self.build_message(order, pdf)?;

        transport
            .send(message)
            .await
            .map_err(|e| InvoiceError::Transport(e.to_string()))?;

        tracing::info!(
            order_id = %order.id,
            to = %order.customer.email,
            "Invoice email sent"
        );
        Ok(())
    }
}

/// Renders the invoice but sends nothing; counts deliveries.
pub struct MockInvoiceMailer {
    company: CompanyConfig,
    fail: bool,
    send_count: AtomicU64,
}

impl MockInvoiceMailer {
    pub fn new() -> Self {
        Self {
            company: CompanyConfig::default(),
            fail: false,
            send_count: AtomicU64::new(0),
        }
    }

    /// A mailer whose every delivery fails after rendering.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }
}

impl Default for MockInvoiceMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvoiceMailer for MockInvoiceMailer {
    async fn send(&self, order: &Order) -> Result<(), InvoiceError> {
        let pdf = render_invoice_pdf(order, &self.company)?;
        if self.fail {
            return Err(InvoiceError::Transport("mock transport down".to_string()));
        }

        self.send_count.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            order_id = %order.id,
            to = %order.customer.email,
            bytes = pdf.len(),
            "[MOCK] Invoice email would be sent"
        );
        Ok(())
    }
}

/// Fire-and-forget invoice delivery.
#[derive(Clone)]
pub struct InvoiceDispatcher {
    mailer: Arc<dyn InvoiceMailer>,
}

impl InvoiceDispatcher {
    pub fn new(mailer: Arc<dyn InvoiceMailer>) -> Self {
        Self { mailer }
    }

    pub fn dispatch(&self, order: Order) -> JoinHandle<()> {
        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send(&order).await {
                tracing::warn!(
                    order_id = %order.id,
                    error = %e,
                    "Invoice delivery failed"
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BillingDetails, Broker, CustomerDetails, HostingDetails, OrderItem, OrderStatus,
        PlanDuration, PlanId,
    };
    use rust_decimal_macros::dec;

    fn paid_order() -> Order {
        let mut order = Order::new(
            CustomerDetails {
                first_name: "Asha".to_string(),
                last_name: "Rao".to_string(),
                email: "asha@example.com".to_string(),
                address: "12 MG Road".to_string(),
                postal_code: "560001".to_string(),
                city: "Bengaluru".to_string(),
                state: "Karnataka".to_string(),
                phone: "9000000000".to_string(),
            },
            HostingDetails {
                domain_name: "algo.example.com".to_string(),
                broker: Broker::Fyers,
                api_key: String::new(),
                api_secret: String::new(),
            },
            BillingDetails {
                gst_number: "29ABCDE1234F1Z5".to_string(),
                ..Default::default()
            },
            vec![OrderItem {
                plan_id: PlanId::new("vps"),
                plan_name: "Trading VPS".to_string(),
                duration: PlanDuration::OneYear,
                price: dec!(999.00),
                quantity: 1,
            }],
        );
        order.status = OrderStatus::Paid;
        order.gateway_order_id = Some("order_RZP001".to_string());
        order.gateway_payment_id = Some("pay_RZP001".to_string());
        order
    }

    #[test]
    fn renders_a_pdf_document() {
        let pdf = render_invoice_pdf(&paid_order(), &CompanyConfig::default()).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[test]
    fn email_carries_pdf_attachment() {
        let config = SmtpConfig {
            host: "localhost".to_string(),
            port: 25,
            user: String::new(),
            password: secrecy::Secret::new(String::new()),
            from_email: "billing@bellserver.com".to_string(),
            from_name: "Bell Server".to_string(),
            enabled: false,
        };
        let mailer = SmtpInvoiceMailer::new(config, CompanyConfig::default()).unwrap();
        let order = paid_order();

        let message = mailer.build_message(&order, b"%PDF-1.3".to_vec()).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).to_string();

        assert!(raw.contains("application/pdf"));
        assert!(raw.contains(&format!("Invoice_{}.pdf", order.id.invoice_number())));
    }

    #[tokio::test]
    async fn disabled_smtp_reports_not_enabled() {
        let config = SmtpConfig {
            host: "localhost".to_string(),
            port: 25,
            user: String::new(),
            password: secrecy::Secret::new(String::new()),
            from_email: "billing@bellserver.com".to_string(),
            from_name: "Bell Server".to_string(),
            enabled: false,
        };
        let mailer = SmtpInvoiceMailer::new(config, CompanyConfig::default()).unwrap();
        assert!(matches!(
            mailer.send(&paid_order()).await,
            Err(InvoiceError::NotEnabled)
        ));
    }

    #[tokio::test]
    async fn dispatch_swallows_delivery_failures() {
        let mailer = Arc::new(MockInvoiceMailer::failing());
        let dispatcher = InvoiceDispatcher::new(mailer.clone());

        dispatcher.dispatch(paid_order()).await.unwrap();

        assert_eq!(mailer.send_count(), 0);
    }
}
