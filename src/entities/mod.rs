pub mod checkout_session;
pub mod checkout_session_item;
pub mod customer_address;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod payment_webhook_event;
pub mod product_variant;

pub use checkout_session::Entity as CheckoutSession;
pub use checkout_session_item::Entity as CheckoutSessionItem;
pub use customer_address::Entity as CustomerAddress;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use payment::Entity as Payment;
pub use payment_webhook_event::Entity as PaymentWebhookEvent;
pub use product_variant::Entity as ProductVariant;
