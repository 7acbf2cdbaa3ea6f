//! Xendit REST client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Money;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::{GatewayError, GatewayErrorBody};
use crate::gateway::{
    CURRENCY, ChannelProperties, ChargeItem, CreateInvoice, CreatePaymentRequest, CreateRefund,
    Invoice, PaymentAction, PaymentGateway, PaymentRequestCharge, RefundResult, RefundTarget,
};

pub const DEFAULT_BASE_URL: &str = "https://api.xendit.co";

/// Connection settings for the Xendit API.
#[derive(Debug, Clone)]
pub struct XenditConfig {
    pub base_url: String,
    /// Secret API key, sent as the basic-auth user name.
    pub secret_key: String,
}

/// [`PaymentGateway`] backed by the Xendit API.
#[derive(Debug, Clone)]
pub struct XenditGateway {
    config: XenditConfig,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct InvoiceResponse {
    id: String,
    invoice_url: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct PaymentRequestResponse {
    id: String,
    status: String,
    #[serde(default)]
    actions: Vec<ActionResponse>,
    payment_method: PaymentMethodResponse,
}

#[derive(Debug, Deserialize)]
struct ActionResponse {
    url_type: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentMethodResponse {
    id: String,
    virtual_account: Option<VirtualAccountResponse>,
}

#[derive(Debug, Deserialize)]
struct VirtualAccountResponse {
    channel_properties: VirtualAccountProperties,
}

#[derive(Debug, Deserialize)]
struct VirtualAccountProperties {
    virtual_account_number: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    amount: Option<i64>,
    status: String,
    updated: Option<DateTime<Utc>>,
}

fn items_json(items: &[ChargeItem], item_type: Option<&str>) -> Vec<Value> {
    items
        .iter()
        .map(|item| {
            let mut value = json!({
                "name": item.name,
                "price": item.price.rupiah(),
                "quantity": item.quantity,
                "category": item.category,
                "reference_id": item.reference_id,
            });
            if let Some(item_type) = item_type {
                value["type"] = json!(item_type);
                value["currency"] = json!(CURRENCY);
            }
            value
        })
        .collect()
}

fn payment_request_body(request: &CreatePaymentRequest) -> Value {
    let mut payment_method = json!({
        "type": request.method_type.as_str(),
        "reusability": request.reusability.as_str(),
        "reference_id": request.reference_id,
    });
    match &request.channel {
        ChannelProperties::Ewallet {
            channel_code,
            mobile_number,
            success_return_url,
            failure_return_url,
        } => {
            let mut properties = json!({
                "success_return_url": success_return_url,
                "failure_return_url": failure_return_url,
            });
            if let Some(mobile_number) = mobile_number {
                properties["mobile_number"] = json!(mobile_number);
            }
            payment_method["ewallet"] = json!({
                "channel_code": channel_code,
                "channel_properties": properties,
            });
        }
        ChannelProperties::VirtualAccount {
            channel_code,
            customer_name,
            expires_at,
        } => {
            payment_method["virtual_account"] = json!({
                "channel_code": channel_code,
                "channel_properties": {
                    "customer_name": customer_name,
                    "expires_at": expires_at.to_rfc3339(),
                },
            });
        }
        ChannelProperties::None => {}
    }

    json!({
        "reference_id": request.reference_id,
        "amount": request.amount.rupiah(),
        "currency": CURRENCY,
        "description": request.description,
        "items": items_json(&request.items, Some("SERVICE")),
        "payment_method": payment_method,
    })
}

impl XenditGateway {
    pub fn new(config: XenditConfig) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http
            .post(format!("{}{}", self.config.base_url.trim_end_matches('/'), path))
            .basic_auth(&self.config.secret_key, Some(""))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = Self::check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Turns non-2xx responses into a [`GatewayError`] carrying Xendit's error body.
    async fn check(response: Response) -> Result<Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body: Option<GatewayErrorBody> = serde_json::from_str(&text).ok();
        let (error_code, message) = match body {
            Some(body) => (
                body.error_code.unwrap_or_else(|| "UNKNOWN_ERROR".to_string()),
                body.message.unwrap_or(text),
            ),
            None => ("UNKNOWN_ERROR".to_string(), text),
        };
        tracing::warn!(status = status.as_u16(), %error_code, %message, "xendit request failed");
        Err(GatewayError::new(status.as_u16(), error_code, message))
    }
}

#[async_trait]
impl PaymentGateway for XenditGateway {
    #[tracing::instrument(skip(self, request), fields(external_id = %request.external_id))]
    async fn create_invoice(&self, request: &CreateInvoice) -> Result<Invoice, GatewayError> {
        let body = json!({
            "external_id": request.external_id,
            "amount": request.amount.rupiah(),
            "currency": CURRENCY,
            "payer_email": request.payer_email,
            "description": request.description,
            "invoice_duration": request.invoice_duration_secs,
            "reminder_time": request.reminder_time,
            "payment_methods": request.payment_methods,
            "items": items_json(&request.items, None),
            "success_redirect_url": request.success_redirect_url,
            "failure_redirect_url": request.failure_redirect_url,
            "should_send_email": request.should_send_email,
        });

        let invoice: InvoiceResponse = self.send(self.post("/v2/invoices").json(&body)).await?;
        Ok(Invoice {
            id: invoice.id,
            invoice_url: invoice.invoice_url,
            status: invoice.status,
        })
    }

    #[tracing::instrument(skip(self, request), fields(reference_id = %request.reference_id))]
    async fn create_payment_request(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<PaymentRequestCharge, GatewayError> {
        let body = payment_request_body(request);
        let response: PaymentRequestResponse =
            self.send(self.post("/payment_requests").json(&body)).await?;

        // The account number arrives as a string or a number depending on the bank.
        let virtual_account_number = response
            .payment_method
            .virtual_account
            .and_then(|va| va.channel_properties.virtual_account_number)
            .map(|number| match number {
                Value::String(s) => s,
                other => other.to_string(),
            });

        Ok(PaymentRequestCharge {
            id: response.id,
            payment_method_id: response.payment_method.id,
            status: response.status,
            actions: response
                .actions
                .into_iter()
                .filter_map(|a| {
                    Some(PaymentAction {
                        url_type: a.url_type?,
                        url: a.url?,
                    })
                })
                .collect(),
            virtual_account_number,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn expire_invoice(&self, invoice_id: &str) -> Result<(), GatewayError> {
        let path = format!("/invoices/{invoice_id}/expire!");
        Self::check(self.post(&path).send().await?).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn expire_payment_method(&self, payment_method_id: &str) -> Result<(), GatewayError> {
        let path = format!("/v2/payment_methods/{payment_method_id}/expire");
        Self::check(self.post(&path).send().await?).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, request), fields(amount = %request.amount))]
    async fn create_refund(&self, request: &CreateRefund) -> Result<RefundResult, GatewayError> {
        let mut body = json!({
            "amount": request.amount.rupiah(),
            "currency": CURRENCY,
            "reason": request.reason,
        });
        match &request.target {
            RefundTarget::Invoice(id) => body["invoice_id"] = json!(id),
            RefundTarget::PaymentRequest(id) => body["payment_request_id"] = json!(id),
        }

        let refund: RefundResponse = self.send(self.post("/refunds").json(&body)).await?;
        Ok(RefundResult {
            id: refund.id,
            amount: refund.amount.map(Money::from_rupiah),
            status: refund.status,
            updated: refund.updated,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn simulate_payment(
        &self,
        payment_method_id: &str,
        amount: Money,
    ) -> Result<(), GatewayError> {
        let path = format!("/v2/payment_methods/{payment_method_id}/payments/simulate");
        let body = json!({ "amount": amount.rupiah() });
        Self::check(self.post(&path).json(&body).send().await?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use domain::{PaymentMethodType, PaymentReusability};

    use super::*;

    #[test]
    fn test_ewallet_payment_request_body() {
        let body = payment_request_body(&CreatePaymentRequest {
            reference_id: "tx-1".to_string(),
            amount: Money::from_rupiah(75_000),
            description: Some("oil change".to_string()),
            items: vec![ChargeItem {
                name: "Oil change".to_string(),
                price: Money::from_rupiah(75_000),
                quantity: 1,
                category: "CAR_SERVICE".to_string(),
                reference_id: "svc-1".to_string(),
            }],
            method_type: PaymentMethodType::Ewallet,
            reusability: PaymentReusability::OneTimeUse,
            channel: ChannelProperties::Ewallet {
                channel_code: "OVO".to_string(),
                mobile_number: Some("+6281234567890".to_string()),
                success_return_url: "https://app.example/ok".to_string(),
                failure_return_url: "https://app.example/fail".to_string(),
            },
        });

        assert_eq!(body["amount"], 75_000);
        assert_eq!(body["currency"], "IDR");
        assert_eq!(body["payment_method"]["type"], "EWALLET");
        assert_eq!(body["payment_method"]["ewallet"]["channel_code"], "OVO");
        assert_eq!(
            body["payment_method"]["ewallet"]["channel_properties"]["mobile_number"],
            "+6281234567890"
        );
        assert_eq!(body["items"][0]["type"], "SERVICE");
        assert!(body["payment_method"].get("virtual_account").is_none());
    }

    #[test]
    fn test_invoice_items_have_no_type() {
        let items = items_json(
            &[ChargeItem {
                name: "Tune up".to_string(),
                price: Money::from_rupiah(200_000),
                quantity: 1,
                category: "car service".to_string(),
                reference_id: "svc-2".to_string(),
            }],
            None,
        );
        assert_eq!(items[0]["price"], 200_000);
        assert!(items[0].get("type").is_none());
    }
}
