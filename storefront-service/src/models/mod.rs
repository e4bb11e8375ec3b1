pub mod order;
pub mod plan;

pub use order::{
    BillingDetails, Broker, CustomerDetails, HostingDetails, IllegalTransition, Order, OrderId,
    OrderItem, OrderStatus, PaymentEvent, Transition,
};
pub use plan::{Plan, PlanDuration, PlanId, QuantityPolicy};
