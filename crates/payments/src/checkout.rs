//! Order checkout and cancellation against the payment gateway.

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{Money, OrderId, TransactionId, UserId};
use domain::{
    CancelOrder, Cancellation, CancellationPlan, CarService, NewOrder, Order, OrderQuote,
    OrderStatus, PaymentDetail, PaymentMethod, PaymentMethodType, PaymentStatus, Refund,
    Transaction, TransactionDetails, User, WorkStatus,
};
use store::{NewCheckout, OrderCancellation, Store, StoreError, StoreExt};

use crate::error::{PaymentError, Result};
use crate::gateway::{
    ChannelProperties, ChargeItem, CreateInvoice, CreatePaymentRequest, CreateRefund,
    INVOICE_DURATION_SECS, PaymentGateway, RefundTarget, VIRTUAL_ACCOUNT_EXPIRY_HOURS,
};

/// Reason sent to the gateway with every cancellation refund.
const REFUND_REASON: &str = "CANCELLATION";

/// Plans tried when the payment keeps changing under a cancellation.
const MAX_CANCEL_ATTEMPTS: u32 = 3;

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentFlow {
    /// The gateway hosts a checkout page listing the chosen channel.
    Invoice,
    /// We charge the chosen e-wallet or virtual-account channel directly.
    PaymentRequest,
}

impl PaymentFlow {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentFlow::Invoice => "invoice",
            PaymentFlow::PaymentRequest => "payment_request",
        }
    }
}

/// Where the hosted invoice page sends the customer afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectUrls {
    pub success: String,
    pub failure: String,
}

/// Gateway handles needed to expire or refund a charge.
enum ChargeReference {
    Invoice {
        invoice_id: String,
    },
    PaymentRequest {
        payment_request_id: String,
        payment_method_id: String,
    },
}

impl ChargeReference {
    fn from_detail(detail: &PaymentDetail, flow: PaymentFlow) -> Result<Self> {
        match flow {
            PaymentFlow::Invoice => detail
                .xendit_invoice_id
                .clone()
                .map(|invoice_id| ChargeReference::Invoice { invoice_id })
                .ok_or(PaymentError::MissingGatewayReference("Xendit invoice id")),
            PaymentFlow::PaymentRequest => {
                match (
                    &detail.xendit_payment_request_id,
                    &detail.xendit_payment_method_id,
                ) {
                    (Some(request_id), Some(method_id)) => Ok(ChargeReference::PaymentRequest {
                        payment_request_id: request_id.clone(),
                        payment_method_id: method_id.clone(),
                    }),
                    _ => Err(PaymentError::MissingGatewayReference(
                        "Xendit payment method or payment request id",
                    )),
                }
            }
        }
    }

    fn refund_target(&self) -> RefundTarget {
        match self {
            ChargeReference::Invoice { invoice_id } => RefundTarget::Invoice(invoice_id.clone()),
            ChargeReference::PaymentRequest {
                payment_request_id, ..
            } => RefundTarget::PaymentRequest(payment_request_id.clone()),
        }
    }
}

/// Creates and cancels orders, keeping the gateway and the store in step.
pub struct CheckoutService<S: Store> {
    store: S,
    gateway: Arc<dyn PaymentGateway>,
    redirects: RedirectUrls,
}

impl<S: Store> CheckoutService<S> {
    pub fn new(store: S, gateway: Arc<dyn PaymentGateway>, redirects: RedirectUrls) -> Self {
        Self {
            store,
            gateway,
            redirects,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<dyn PaymentGateway> {
        &self.gateway
    }

    /// Prices an order, charges it through the gateway, and persists the
    /// transaction, order and payment detail together.
    ///
    /// If persisting fails after the gateway accepted the charge, the charge
    /// is expired again.
    #[tracing::instrument(skip(self, order))]
    pub async fn create_order(
        &self,
        user_id: UserId,
        order: NewOrder,
        flow: PaymentFlow,
    ) -> Result<TransactionDetails> {
        let user = self.store.require_user(user_id).await?;
        let phone_number = user
            .phone_number
            .clone()
            .filter(|p| !p.trim().is_empty())
            .ok_or(PaymentError::PhoneNumberRequired)?;

        let services = self.load_services(&order).await?;
        let method = self
            .store
            .require_payment_method(order.payment_method_id)
            .await?;
        let quote = OrderQuote::new(services.iter().map(|s| s.price), method.fee);
        let transaction_id = TransactionId::new();

        let payment_detail = match flow {
            PaymentFlow::Invoice => {
                self.charge_invoice(transaction_id, &user, &order, &services, &method, &quote)
                    .await?
            }
            PaymentFlow::PaymentRequest => {
                let channel = channel_properties(&method, &user, phone_number)?;
                self.charge_payment_request(
                    transaction_id,
                    &order,
                    &services,
                    &method,
                    &quote,
                    channel,
                )
                .await?
            }
        };

        let now = Utc::now();
        let checkout = NewCheckout {
            transaction: Transaction {
                id: transaction_id,
                user_id: user.id,
                payment_method_id: method.id,
                admin_fee: quote.admin_fee,
                total_price: quote.total,
                payment_status: PaymentStatus::Pending,
                created_at: now,
                updated_at: now,
            },
            order: Order {
                id: OrderId::new(),
                user_id: user.id,
                user_car_id: order.user_car_id,
                workshop_id: order.workshop_id,
                transaction_id,
                note: order.note,
                subtotal_price: quote.subtotal,
                order_status: OrderStatus::Draft,
                work_status: WorkStatus::Queued,
                car_service_ids: services.iter().map(|s| s.id).collect(),
                created_at: now,
                updated_at: now,
            },
            payment_detail: payment_detail.clone(),
        };

        match self.store.create_checkout(checkout).await {
            Ok(details) => {
                metrics::counter!("orders_created_total", "flow" => flow.as_str()).increment(1);
                tracing::info!(
                    %transaction_id,
                    total = %quote.total,
                    "order created"
                );
                Ok(details)
            }
            Err(err) => {
                tracing::error!(%transaction_id, error = %err, "persisting checkout failed");
                self.expire_charge(&payment_detail, flow).await;
                Err(err.into())
            }
        }
    }

    /// Cancels an order and settles its payment with the gateway.
    ///
    /// Regular users only see their own orders; admins may cancel any order.
    /// If a callback changes the payment while the gateway is being called,
    /// the cancellation is planned again from the new payment status.
    #[tracing::instrument(skip(self, request))]
    pub async fn cancel_order(
        &self,
        actor_id: UserId,
        order_id: OrderId,
        request: CancelOrder,
        flow: PaymentFlow,
    ) -> Result<Order> {
        let actor = self.store.require_user(actor_id).await?;
        let mut attempt = 1;
        loop {
            match self.try_cancel(&actor, order_id, &request, flow).await {
                Err(PaymentError::Store(StoreError::Conflict(reason)))
                    if attempt < MAX_CANCEL_ATTEMPTS =>
                {
                    tracing::warn!(attempt, %reason, "payment changed during cancellation, planning again");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn try_cancel(
        &self,
        actor: &User,
        order_id: OrderId,
        request: &CancelOrder,
        flow: PaymentFlow,
    ) -> Result<Order> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .filter(|o| actor.role.is_admin() || o.user_id == actor.id)
            .ok_or(PaymentError::NotFound("Order"))?;
        let details = self.store.require_transaction(order.transaction_id).await?;
        let planned_against = details.transaction.payment_status;

        let plan = CancellationPlan::for_order(order.order_status, planned_against)?;
        let reference = ChargeReference::from_detail(
            &details.payment_detail.clone().unwrap_or_default(),
            flow,
        )?;

        let refund = match plan {
            CancellationPlan::ExpireCharge => {
                match &reference {
                    ChargeReference::Invoice { invoice_id } => {
                        self.gateway.expire_invoice(invoice_id).await?
                    }
                    ChargeReference::PaymentRequest {
                        payment_method_id, ..
                    } => self.gateway.expire_payment_method(payment_method_id).await?,
                }
                None
            }
            CancellationPlan::Refund => Some(
                self.refund(&reference, details.transaction.total_price, actor, request)
                    .await?,
            ),
            CancellationPlan::OrderOnly => None,
        };
        let refunded = refund.is_some();

        let cancellation = plan.records_cancellation().then(|| Cancellation {
            reason: request.reason_or_default(),
            notes: request.notes.clone(),
            cancelled_by_id: actor.id,
            cancelled_at: Utc::now(),
        });

        let cancelled = self
            .store
            .cancel_order(OrderCancellation {
                order_id: order.id,
                transaction_id: order.transaction_id,
                expected_payment_status: planned_against,
                payment_status: plan.payment_status_after(),
                cancellation,
                refund,
            })
            .await
            .inspect_err(|err| {
                if refunded {
                    tracing::error!(
                        transaction_id = %order.transaction_id,
                        error = %err,
                        "refund issued but the cancellation was not saved"
                    );
                }
            })?;

        metrics::counter!("orders_cancelled_total", "plan" => plan_label(plan)).increment(1);
        tracing::info!(plan = plan_label(plan), "order cancelled");
        Ok(cancelled)
    }

    /// Pays a payment-request charge in the gateway's test mode.
    #[tracing::instrument(skip(self))]
    pub async fn simulate_payment(&self, payment_method_id: &str, amount: Money) -> Result<()> {
        self.gateway
            .simulate_payment(payment_method_id, amount)
            .await?;
        Ok(())
    }

    /// Loads the requested services in request order, failing on unknown ids.
    async fn load_services(&self, order: &NewOrder) -> Result<Vec<CarService>> {
        let found = self.store.find_car_services(&order.car_services).await?;
        let mut services = Vec::with_capacity(order.car_services.len());
        let mut missing = Vec::new();
        for id in &order.car_services {
            match found.iter().find(|s| s.id == *id) {
                Some(service) => services.push(service.clone()),
                None => missing.push(*id),
            }
        }
        if !missing.is_empty() {
            return Err(PaymentError::MissingCarServices(missing));
        }
        Ok(services)
    }

    async fn charge_invoice(
        &self,
        transaction_id: TransactionId,
        user: &User,
        order: &NewOrder,
        services: &[CarService],
        method: &PaymentMethod,
        quote: &OrderQuote,
    ) -> Result<PaymentDetail> {
        let invoice = self
            .gateway
            .create_invoice(&CreateInvoice {
                external_id: transaction_id.to_string(),
                amount: quote.total,
                payer_email: user.email.clone(),
                description: order.note.clone(),
                invoice_duration_secs: INVOICE_DURATION_SECS,
                reminder_time: 1,
                payment_methods: vec![method.name.clone()],
                items: charge_items(services, "car service"),
                success_redirect_url: self.redirects.success.clone(),
                failure_redirect_url: self.redirects.failure.clone(),
                should_send_email: true,
            })
            .await?;

        Ok(PaymentDetail {
            xendit_invoice_id: Some(invoice.id),
            web_url: Some(invoice.invoice_url),
            ..Default::default()
        })
    }

    async fn charge_payment_request(
        &self,
        transaction_id: TransactionId,
        order: &NewOrder,
        services: &[CarService],
        method: &PaymentMethod,
        quote: &OrderQuote,
        channel: ChannelProperties,
    ) -> Result<PaymentDetail> {
        let charge = self
            .gateway
            .create_payment_request(&CreatePaymentRequest {
                reference_id: transaction_id.to_string(),
                amount: quote.total,
                description: order.note.clone(),
                items: charge_items(services, "CAR_SERVICE"),
                method_type: method.method_type,
                reusability: method.reusability,
                channel,
            })
            .await?;
        Ok(charge.payment_detail())
    }

    async fn refund(
        &self,
        reference: &ChargeReference,
        amount: Money,
        actor: &User,
        request: &CancelOrder,
    ) -> Result<Refund> {
        let result = self
            .gateway
            .create_refund(&CreateRefund {
                target: reference.refund_target(),
                amount,
                reason: REFUND_REASON.to_string(),
            })
            .await?;

        let (Some(amount), Some(refunded_at)) = (result.amount, result.updated) else {
            tracing::error!(refund_id = %result.id, status = %result.status, "refund was not accepted");
            return Err(PaymentError::RefundFailed);
        };
        Ok(Refund {
            amount,
            reason: request.notes.clone().unwrap_or_default(),
            refunded_by_id: actor.id,
            refunded_at,
        })
    }

    /// Best-effort rollback of a gateway charge whose checkout was not saved.
    async fn expire_charge(&self, detail: &PaymentDetail, flow: PaymentFlow) {
        let result = match ChargeReference::from_detail(detail, flow) {
            Ok(ChargeReference::Invoice { invoice_id }) => {
                self.gateway.expire_invoice(&invoice_id).await
            }
            Ok(ChargeReference::PaymentRequest {
                payment_method_id, ..
            }) => self.gateway.expire_payment_method(&payment_method_id).await,
            Err(_) => return,
        };
        if let Err(err) = result {
            tracing::warn!(error = %err, "could not expire orphaned charge");
        }
    }
}

fn charge_items(services: &[CarService], category: &str) -> Vec<ChargeItem> {
    services
        .iter()
        .map(|service| ChargeItem {
            name: service.name.clone(),
            price: service.price,
            quantity: 1,
            category: category.to_string(),
            reference_id: service.id.to_string(),
        })
        .collect()
}

/// Channel settings for a payment request, from the method's configuration.
fn channel_properties(
    method: &PaymentMethod,
    user: &User,
    phone_number: String,
) -> Result<ChannelProperties> {
    match method.method_type {
        PaymentMethodType::Ewallet => {
            let config = method
                .e_wallet_payment_config
                .as_ref()
                .ok_or(PaymentError::MissingChannelConfig("E-Wallet"))?;
            Ok(ChannelProperties::Ewallet {
                channel_code: config.channel_code.clone(),
                mobile_number: Some(phone_number),
                success_return_url: config.success_return_url.clone(),
                failure_return_url: config.failure_return_url.clone(),
            })
        }
        PaymentMethodType::VirtualAccount => {
            let config = method
                .virtual_account_config
                .as_ref()
                .ok_or(PaymentError::MissingChannelConfig("Virtual Account"))?;
            Ok(ChannelProperties::VirtualAccount {
                channel_code: config.bank_code.clone(),
                customer_name: user.username.clone(),
                expires_at: Utc::now() + Duration::hours(VIRTUAL_ACCOUNT_EXPIRY_HOURS),
            })
        }
        _ => Ok(ChannelProperties::None),
    }
}

fn plan_label(plan: CancellationPlan) -> &'static str {
    match plan {
        CancellationPlan::ExpireCharge => "expire_charge",
        CancellationPlan::Refund => "refund",
        CancellationPlan::OrderOnly => "order_only",
    }
}
