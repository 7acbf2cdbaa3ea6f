//! Payment side of the marketplace.
//!
//! - [`PaymentGateway`]: the external gateway, backed by Xendit in production
//!   and [`InMemoryPaymentGateway`] in tests.
//! - [`CheckoutService`]: creates orders through the invoice or
//!   payment-request flow and cancels them, expiring or refunding the charge.
//! - [`WebhookProcessor`]: settles gateway callbacks, issuing e-tickets for
//!   successful payments.

pub mod checkout;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod retry;
pub mod webhook;
pub mod xendit;

pub use checkout::{CheckoutService, PaymentFlow, RedirectUrls};
pub use error::{GatewayError, PaymentError, Result};
pub use gateway::{
    ChannelProperties, ChargeItem, CreateInvoice, CreatePaymentRequest, CreateRefund, Invoice,
    PaymentAction, PaymentGateway, PaymentRequestCharge, RefundResult, RefundTarget,
};
pub use memory::InMemoryPaymentGateway;
pub use retry::RetryPolicy;
pub use webhook::{
    InvoiceWebhook, PaymentRequestWebhook, PaymentRequestWebhookData, WebhookOutcome,
    WebhookProcessor,
};
pub use xendit::{XenditConfig, XenditGateway};
