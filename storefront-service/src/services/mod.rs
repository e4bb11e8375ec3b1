pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod gateway;
pub mod invoice;
pub mod metrics;
pub mod reconciliation;
pub mod repository;

pub use cart::{Cart, CartEntry, CartLine, CartStore, MemoryCartStore, RedisCartStore};
pub use catalog::{CatalogRepository, InMemoryCatalog, MongoCatalogRepository};
pub use checkout::{CheckoutIntent, CheckoutService, OrderDraft};
pub use gateway::{configured_gateway, ConfiguredGateway, PaymentGateway};
pub use invoice::{InvoiceDispatcher, InvoiceMailer, MockInvoiceMailer, SmtpInvoiceMailer};
pub use metrics::{get_metrics, init_metrics};
pub use reconciliation::ReconciliationService;
pub use repository::{InMemoryOrderRepository, MongoOrderRepository, OrderRepository};
