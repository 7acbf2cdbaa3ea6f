//! In-memory payment gateway for tests and local runs.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use common::Money;

use crate::error::GatewayError;
use crate::gateway::{
    ChannelProperties, CreateInvoice, CreatePaymentRequest, CreateRefund, Invoice,
    PaymentAction, PaymentGateway, PaymentRequestCharge, RefundResult,
};

#[derive(Debug, Default)]
struct GatewayState {
    invoices: HashMap<String, CreateInvoice>,
    payment_requests: HashMap<String, CreatePaymentRequest>,
    payment_methods: HashSet<String>,
    expired: HashSet<String>,
    refunds: Vec<CreateRefund>,
    simulated: Vec<(String, Money)>,
    next_id: u32,
    fail_on_create: bool,
    fail_on_expire: bool,
    fail_on_refund: bool,
    reject_refunds: bool,
}

impl GatewayState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:04}", self.next_id)
    }
}

/// Gateway double that records every call.
///
/// Ids are sequential (`INV-0001`, `PR-0002`, ...). Failure toggles make the
/// next calls of a kind fail until reset.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes invoice and payment-request creation fail.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state().fail_on_create = fail;
    }

    /// Makes expiring invoices and payment methods fail.
    pub fn set_fail_on_expire(&self, fail: bool) {
        self.state().fail_on_expire = fail;
    }

    /// Makes refunds fail with a gateway error.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state().fail_on_refund = fail;
    }

    /// Makes refunds return without an amount.
    pub fn set_reject_refunds(&self, reject: bool) {
        self.state().reject_refunds = reject;
    }

    pub fn invoice_count(&self) -> usize {
        self.state().invoices.len()
    }

    pub fn payment_request_count(&self) -> usize {
        self.state().payment_requests.len()
    }

    /// Returns the invoice created with the given id.
    pub fn invoice(&self, id: &str) -> Option<CreateInvoice> {
        self.state().invoices.get(id).cloned()
    }

    /// Returns the payment request created with the given id.
    pub fn payment_request(&self, id: &str) -> Option<CreatePaymentRequest> {
        self.state().payment_requests.get(id).cloned()
    }

    /// Returns true if the invoice or payment method was expired.
    pub fn is_expired(&self, id: &str) -> bool {
        self.state().expired.contains(id)
    }

    pub fn refunds(&self) -> Vec<CreateRefund> {
        self.state().refunds.clone()
    }

    pub fn simulated_payments(&self) -> Vec<(String, Money)> {
        self.state().simulated.clone()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_invoice(&self, request: &CreateInvoice) -> Result<Invoice, GatewayError> {
        let mut state = self.state();
        if state.fail_on_create {
            return Err(GatewayError::new(
                400,
                "API_VALIDATION_ERROR",
                "Invoice amount is below the channel minimum",
            ));
        }

        let id = state.next_id("INV");
        state.invoices.insert(id.clone(), request.clone());
        Ok(Invoice {
            invoice_url: format!("https://checkout.example/web/{id}"),
            id,
            status: "PENDING".to_string(),
        })
    }

    async fn create_payment_request(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<PaymentRequestCharge, GatewayError> {
        let mut state = self.state();
        if state.fail_on_create {
            return Err(GatewayError::new(
                400,
                "API_VALIDATION_ERROR",
                "Payment method channel is not activated",
            ));
        }

        let id = state.next_id("PR");
        let payment_method_id = state.next_id("PM");
        let (actions, virtual_account_number) = match &request.channel {
            ChannelProperties::Ewallet { channel_code, .. } => (
                vec![
                    PaymentAction {
                        url_type: "DEEPLINK".to_string(),
                        url: format!("{}://pay/{id}", channel_code.to_ascii_lowercase()),
                    },
                    PaymentAction {
                        url_type: "WEB".to_string(),
                        url: format!("https://ewallet.example/{id}"),
                    },
                ],
                None,
            ),
            ChannelProperties::VirtualAccount { .. } => {
                (Vec::new(), Some(format!("8808{:08}", state.next_id)))
            }
            ChannelProperties::None => (Vec::new(), None),
        };
        state.payment_requests.insert(id.clone(), request.clone());
        state.payment_methods.insert(payment_method_id.clone());

        Ok(PaymentRequestCharge {
            id,
            payment_method_id,
            status: "REQUIRES_ACTION".to_string(),
            actions,
            virtual_account_number,
        })
    }

    async fn expire_invoice(&self, invoice_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state();
        if state.fail_on_expire {
            return Err(GatewayError::new(
                503,
                "SERVER_ERROR",
                "Invoice could not be expired",
            ));
        }
        if !state.invoices.contains_key(invoice_id) {
            return Err(GatewayError::new(
                404,
                "INVOICE_NOT_FOUND_ERROR",
                "Invoice not found",
            ));
        }
        state.expired.insert(invoice_id.to_string());
        Ok(())
    }

    async fn expire_payment_method(&self, payment_method_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state();
        if state.fail_on_expire {
            return Err(GatewayError::new(
                503,
                "SERVER_ERROR",
                "Payment method could not be expired",
            ));
        }
        if !state.payment_methods.contains(payment_method_id) {
            return Err(GatewayError::new(
                404,
                "DATA_NOT_FOUND",
                "Payment method not found",
            ));
        }
        state.expired.insert(payment_method_id.to_string());
        Ok(())
    }

    async fn create_refund(&self, request: &CreateRefund) -> Result<RefundResult, GatewayError> {
        let mut state = self.state();
        if state.fail_on_refund {
            return Err(GatewayError::new(
                400,
                "REFUND_NOT_SUPPORTED",
                "Refund is not supported for this channel",
            ));
        }

        let id = state.next_id("RF");
        state.refunds.push(request.clone());
        if state.reject_refunds {
            return Ok(RefundResult {
                id,
                amount: None,
                status: "FAILED".to_string(),
                updated: None,
            });
        }
        Ok(RefundResult {
            id,
            amount: Some(request.amount),
            status: "SUCCEEDED".to_string(),
            updated: Some(Utc::now()),
        })
    }

    async fn simulate_payment(
        &self,
        payment_method_id: &str,
        amount: Money,
    ) -> Result<(), GatewayError> {
        let mut state = self.state();
        if !state.payment_methods.contains(payment_method_id) {
            return Err(GatewayError::new(
                404,
                "DATA_NOT_FOUND",
                "Payment method not found",
            ));
        }
        state
            .simulated
            .push((payment_method_id.to_string(), amount));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use domain::{PaymentMethodType, PaymentReusability};

    use super::*;
    use crate::gateway::RefundTarget;

    fn invoice_request() -> CreateInvoice {
        CreateInvoice {
            external_id: "tx-1".to_string(),
            amount: Money::from_rupiah(151_000),
            payer_email: "budi@example.com".to_string(),
            description: None,
            invoice_duration_secs: 172_800,
            reminder_time: 1,
            payment_methods: vec!["QRIS".to_string()],
            items: vec![],
            success_redirect_url: "https://app.example/ok".to_string(),
            failure_redirect_url: "https://app.example/fail".to_string(),
            should_send_email: true,
        }
    }

    #[tokio::test]
    async fn test_sequential_ids() {
        let gateway = InMemoryPaymentGateway::new();

        let first = gateway.create_invoice(&invoice_request()).await.unwrap();
        let second = gateway.create_invoice(&invoice_request()).await.unwrap();

        assert_eq!(first.id, "INV-0001");
        assert_eq!(second.id, "INV-0002");
        assert_eq!(gateway.invoice_count(), 2);
    }

    #[tokio::test]
    async fn test_fail_on_create() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_fail_on_create(true);

        let err = gateway.create_invoice(&invoice_request()).await.unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.field(), "invoice");
        assert_eq!(gateway.invoice_count(), 0);
    }

    #[tokio::test]
    async fn test_expire_unknown_invoice() {
        let gateway = InMemoryPaymentGateway::new();
        let err = gateway.expire_invoice("INV-9999").await.unwrap_err();
        assert_eq!(err.status, 404);

        let invoice = gateway.create_invoice(&invoice_request()).await.unwrap();
        gateway.expire_invoice(&invoice.id).await.unwrap();
        assert!(gateway.is_expired(&invoice.id));
    }

    #[tokio::test]
    async fn test_virtual_account_payment_request() {
        let gateway = InMemoryPaymentGateway::new();
        let charge = gateway
            .create_payment_request(&CreatePaymentRequest {
                reference_id: "tx-2".to_string(),
                amount: Money::from_rupiah(50_000),
                description: None,
                items: vec![],
                method_type: PaymentMethodType::VirtualAccount,
                reusability: PaymentReusability::OneTimeUse,
                channel: ChannelProperties::VirtualAccount {
                    channel_code: "BCA".to_string(),
                    customer_name: "budi".to_string(),
                    expires_at: Utc::now(),
                },
            })
            .await
            .unwrap();

        assert!(charge.virtual_account_number.is_some());
        gateway
            .simulate_payment(&charge.payment_method_id, Money::from_rupiah(50_000))
            .await
            .unwrap();
        assert_eq!(gateway.simulated_payments().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_refund_has_no_amount() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.set_reject_refunds(true);

        let refund = gateway
            .create_refund(&CreateRefund {
                target: RefundTarget::Invoice("INV-0001".to_string()),
                amount: Money::from_rupiah(10_000),
                reason: "CANCELLATION".to_string(),
            })
            .await
            .unwrap();
        assert!(refund.amount.is_none());
        assert_eq!(gateway.refunds().len(), 1);
    }
}
