//! Payment gateway trait and request/response types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Money;
use domain::{PaymentDetail, PaymentMethodType, PaymentReusability};

use crate::error::GatewayError;

/// Currency every charge is made in.
pub const CURRENCY: &str = Money::CURRENCY;

/// How long a hosted invoice stays payable.
pub const INVOICE_DURATION_SECS: u64 = 48 * 60 * 60;

/// How long a virtual account stays payable.
pub const VIRTUAL_ACCOUNT_EXPIRY_HOURS: i64 = 24;

/// One line of an invoice or payment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeItem {
    pub name: String,
    pub price: Money,
    pub quantity: u32,
    pub category: String,
    /// Catalog id of the service being charged.
    pub reference_id: String,
}

/// A hosted-checkout invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInvoice {
    /// Our transaction id; echoed back by webhooks as `external_id`.
    pub external_id: String,
    pub amount: Money,
    pub payer_email: String,
    pub description: Option<String>,
    pub invoice_duration_secs: u64,
    /// Days before expiry to send a reminder.
    pub reminder_time: u32,
    /// Channel names offered on the checkout page.
    pub payment_methods: Vec<String>,
    pub items: Vec<ChargeItem>,
    pub success_redirect_url: String,
    pub failure_redirect_url: String,
    pub should_send_email: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub id: String,
    pub invoice_url: String,
    pub status: String,
}

/// Channel-specific part of a payment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelProperties {
    Ewallet {
        channel_code: String,
        mobile_number: Option<String>,
        success_return_url: String,
        failure_return_url: String,
    },
    VirtualAccount {
        channel_code: String,
        customer_name: String,
        expires_at: DateTime<Utc>,
    },
    /// Channels that need no properties from us.
    None,
}

/// A charge where we pick the channel instead of the gateway's checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePaymentRequest {
    /// Our transaction id; echoed back by webhooks as `reference_id`.
    pub reference_id: String,
    pub amount: Money,
    pub description: Option<String>,
    pub items: Vec<ChargeItem>,
    pub method_type: PaymentMethodType,
    pub reusability: PaymentReusability,
    pub channel: ChannelProperties,
}

/// Where the customer completes a payment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentAction {
    /// `WEB`, `MOBILE` or `DEEPLINK`.
    pub url_type: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequestCharge {
    pub id: String,
    pub payment_method_id: String,
    pub status: String,
    pub actions: Vec<PaymentAction>,
    pub virtual_account_number: Option<String>,
}

impl PaymentRequestCharge {
    pub fn action_url(&self, url_type: &str) -> Option<String> {
        self.actions
            .iter()
            .find(|a| a.url_type.eq_ignore_ascii_case(url_type))
            .map(|a| a.url.clone())
    }

    /// The payment detail recorded for this charge.
    pub fn payment_detail(&self) -> PaymentDetail {
        PaymentDetail {
            xendit_payment_request_id: Some(self.id.clone()),
            xendit_payment_method_id: Some(self.payment_method_id.clone()),
            web_url: self.action_url("WEB"),
            mobile_url: self.action_url("MOBILE"),
            deeplink_url: self.action_url("DEEPLINK"),
            virtual_account_number: self.virtual_account_number.clone(),
            ..Default::default()
        }
    }
}

/// The captured charge a refund applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundTarget {
    Invoice(String),
    PaymentRequest(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRefund {
    pub target: RefundTarget,
    pub amount: Money,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundResult {
    pub id: String,
    /// Missing when the gateway did not accept the refund.
    pub amount: Option<Money>,
    pub status: String,
    pub updated: Option<DateTime<Utc>>,
}

/// Operations against the external payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_invoice(&self, request: &CreateInvoice) -> Result<Invoice, GatewayError>;

    async fn create_payment_request(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<PaymentRequestCharge, GatewayError>;

    /// Stops an unpaid invoice from being paid.
    async fn expire_invoice(&self, invoice_id: &str) -> Result<(), GatewayError>;

    /// Stops an unpaid payment method from being charged.
    async fn expire_payment_method(&self, payment_method_id: &str) -> Result<(), GatewayError>;

    async fn create_refund(&self, request: &CreateRefund) -> Result<RefundResult, GatewayError>;

    /// Pays a payment method in test mode.
    async fn simulate_payment(
        &self,
        payment_method_id: &str,
        amount: Money,
    ) -> Result<(), GatewayError>;
}
