//! Client requests and their validation.
//!
//! Requests deserialize leniently (optional fields, camelCase keys) so that a
//! missing field becomes a field-level [`FieldError`] instead of an opaque
//! JSON rejection.

use common::{CarServiceId, Money, PaymentMethodId, UserCarId, WorkshopId};
use serde::Deserialize;

use crate::entities::{EWalletConfig, PaymentMethod, VirtualAccountConfig};
use crate::error::{DomainError, FieldError};
use crate::status::{
    CancellationReason, OrderStatus, PaymentMethodType, PaymentReusability, WorkStatus,
};

pub const MAX_ORDER_NOTE: usize = 1000;
pub const MAX_CANCELLATION_NOTES: usize = 500;
pub const MIN_PAYMENT_METHOD_NAME: usize = 2;

fn check_max_len(errors: &mut Vec<FieldError>, field: &str, value: Option<&str>, max: usize) {
    if let Some(value) = value
        && value.chars().count() > max
    {
        errors.push(FieldError::too_long(field, max));
    }
}

fn finish<T>(errors: Vec<FieldError>, value: impl FnOnce() -> T) -> Result<T, DomainError> {
    if errors.is_empty() {
        Ok(value())
    } else {
        Err(DomainError::Validation(errors))
    }
}

/// Request to place an order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder {
    pub user_car_id: Option<UserCarId>,
    pub workshop_id: Option<WorkshopId>,
    pub payment_method_id: Option<PaymentMethodId>,
    pub note: Option<String>,
    #[serde(default)]
    pub car_services: Vec<CarServiceId>,
}

/// A [`CreateOrder`] that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_car_id: UserCarId,
    pub workshop_id: WorkshopId,
    pub payment_method_id: PaymentMethodId,
    pub note: Option<String>,
    /// Requested services, duplicates removed, request order kept.
    pub car_services: Vec<CarServiceId>,
}

impl CreateOrder {
    pub fn validate(self) -> Result<NewOrder, DomainError> {
        let mut errors = Vec::new();

        if self.user_car_id.is_none() {
            errors.push(FieldError::required("userCarId"));
        }
        if self.workshop_id.is_none() {
            errors.push(FieldError::required("workshopId"));
        }
        if self.payment_method_id.is_none() {
            errors.push(FieldError::required("paymentMethodId"));
        }
        check_max_len(&mut errors, "note", self.note.as_deref(), MAX_ORDER_NOTE);
        if self.car_services.is_empty() {
            errors.push(FieldError::new(
                "carServices",
                "At least one car service is required",
                "too_small",
            ));
        }

        let mut car_services = Vec::with_capacity(self.car_services.len());
        for id in self.car_services {
            if !car_services.contains(&id) {
                car_services.push(id);
            }
        }

        match (self.user_car_id, self.workshop_id, self.payment_method_id) {
            (Some(user_car_id), Some(workshop_id), Some(payment_method_id)) => {
                finish(errors, || NewOrder {
                    user_car_id,
                    workshop_id,
                    payment_method_id,
                    note: self.note,
                    car_services,
                })
            }
            _ => Err(DomainError::Validation(errors)),
        }
    }
}

/// Back-office edit of an order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrder {
    pub note: Option<String>,
    pub order_status: Option<OrderStatus>,
    pub work_status: Option<WorkStatus>,
}

impl UpdateOrder {
    pub fn validate(self) -> Result<Self, DomainError> {
        let mut errors = Vec::new();
        check_max_len(&mut errors, "note", self.note.as_deref(), MAX_ORDER_NOTE);
        finish(errors, || self)
    }
}

/// Request to cancel an order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrder {
    pub reason: Option<CancellationReason>,
    pub notes: Option<String>,
}

impl CancelOrder {
    pub fn validate(self) -> Result<Self, DomainError> {
        let mut errors = Vec::new();
        check_max_len(
            &mut errors,
            "notes",
            self.notes.as_deref(),
            MAX_CANCELLATION_NOTES,
        );
        finish(errors, || self)
    }

    pub fn reason_or_default(&self) -> CancellationReason {
        self.reason.unwrap_or_default()
    }
}

/// Request to create a payment method, or a partial update of one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodInput {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub method_type: Option<PaymentMethodType>,
    pub reusability: Option<PaymentReusability>,
    pub fee: Option<Money>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub is_active: Option<bool>,
    pub e_wallet_payment_config: Option<EWalletConfig>,
    pub virtual_account_config: Option<VirtualAccountConfig>,
}

/// A validated payment method without persistence metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentMethodDraft {
    pub name: String,
    pub method_type: PaymentMethodType,
    pub reusability: PaymentReusability,
    pub fee: Money,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub is_active: bool,
    pub e_wallet_payment_config: Option<EWalletConfig>,
    pub virtual_account_config: Option<VirtualAccountConfig>,
}

impl PaymentMethodInput {
    /// Validates a creation request.
    pub fn into_draft(self) -> Result<PaymentMethodDraft, DomainError> {
        let mut errors = Vec::new();
        if self.name.is_none() {
            errors.push(FieldError::required("name"));
        }
        if self.method_type.is_none() {
            errors.push(FieldError::required("type"));
        }
        if self.fee.is_none() {
            errors.push(FieldError::required("fee"));
        }

        match (self.name, self.method_type, self.fee) {
            (Some(name), Some(method_type), Some(fee)) if errors.is_empty() => {
                PaymentMethodDraft {
                    name,
                    method_type,
                    reusability: self.reusability.unwrap_or_default(),
                    fee,
                    description: self.description,
                    logo_url: self.logo_url,
                    is_active: self.is_active.unwrap_or(true),
                    e_wallet_payment_config: self.e_wallet_payment_config,
                    virtual_account_config: self.virtual_account_config,
                }
                .validate()
            }
            _ => Err(DomainError::Validation(errors)),
        }
    }

    /// Applies a partial update on top of an existing method and validates the result.
    pub fn apply_to(self, existing: &PaymentMethod) -> Result<PaymentMethodDraft, DomainError> {
        PaymentMethodDraft {
            name: self.name.unwrap_or_else(|| existing.name.clone()),
            method_type: self.method_type.unwrap_or(existing.method_type),
            reusability: self.reusability.unwrap_or(existing.reusability),
            fee: self.fee.unwrap_or(existing.fee),
            description: self.description.or_else(|| existing.description.clone()),
            logo_url: self.logo_url.or_else(|| existing.logo_url.clone()),
            is_active: self.is_active.unwrap_or(existing.is_active),
            e_wallet_payment_config: self
                .e_wallet_payment_config
                .or_else(|| existing.e_wallet_payment_config.clone()),
            virtual_account_config: self
                .virtual_account_config
                .or_else(|| existing.virtual_account_config.clone()),
        }
        .validate()
    }
}

impl PaymentMethodDraft {
    /// E-wallet and virtual-account methods need their channel config for
    /// payment-request checkouts.
    pub fn validate(self) -> Result<Self, DomainError> {
        let mut errors = Vec::new();
        if self.name.trim().chars().count() < MIN_PAYMENT_METHOD_NAME {
            errors.push(FieldError::new(
                "name",
                format!("Min {MIN_PAYMENT_METHOD_NAME} characters"),
                "too_small",
            ));
        }
        if self.fee.is_negative() {
            errors.push(FieldError::new(
                "fee",
                "Fee must not be negative",
                "too_small",
            ));
        }
        if self.method_type == PaymentMethodType::Ewallet && self.e_wallet_payment_config.is_none()
        {
            errors.push(FieldError::new(
                "eWalletPaymentConfig",
                "E-Wallet payment config is required for EWALLET payment methods",
                "invalid_type",
            ));
        }
        if self.method_type == PaymentMethodType::VirtualAccount
            && self.virtual_account_config.is_none()
        {
            errors.push(FieldError::new(
                "virtualAccountConfig",
                "Virtual account config is required for VIRTUAL_ACCOUNT payment methods",
                "invalid_type",
            ));
        }
        finish(errors, || self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(err: DomainError) -> Vec<String> {
        err.field_errors().iter().map(|e| e.field.clone()).collect()
    }

    #[test]
    fn test_create_order_requires_ids_and_services() {
        let err = CreateOrder::default().validate().unwrap_err();
        assert_eq!(
            fields(err),
            vec!["userCarId", "workshopId", "paymentMethodId", "carServices"]
        );
    }

    #[test]
    fn test_create_order_deduplicates_services() {
        let service = CarServiceId::new();
        let other = CarServiceId::new();
        let order = CreateOrder {
            user_car_id: Some(UserCarId::new()),
            workshop_id: Some(WorkshopId::new()),
            payment_method_id: Some(PaymentMethodId::new()),
            note: Some("please wash too".to_string()),
            car_services: vec![service, other, service],
        }
        .validate()
        .unwrap();
        assert_eq!(order.car_services, vec![service, other]);
    }

    #[test]
    fn test_create_order_note_limit() {
        let request = CreateOrder {
            user_car_id: Some(UserCarId::new()),
            workshop_id: Some(WorkshopId::new()),
            payment_method_id: Some(PaymentMethodId::new()),
            note: Some("x".repeat(MAX_ORDER_NOTE + 1)),
            car_services: vec![CarServiceId::new()],
        };
        let err = request.validate().unwrap_err();
        assert_eq!(err.field_errors()[0].message, "Max 1000 characters");
    }

    #[test]
    fn test_create_order_deserializes_camel_case() {
        let json = serde_json::json!({
            "userCarId": UserCarId::new(),
            "workshopId": WorkshopId::new(),
            "paymentMethodId": PaymentMethodId::new(),
            "carServices": [CarServiceId::new()],
        });
        let request: CreateOrder = serde_json::from_value(json).unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_cancel_order_notes_limit() {
        let ok = CancelOrder {
            reason: None,
            notes: Some("x".repeat(MAX_CANCELLATION_NOTES)),
        };
        assert_eq!(ok.validate().unwrap().reason_or_default(), CancellationReason::Other);

        let too_long = CancelOrder {
            reason: Some(CancellationReason::CustomerRequest),
            notes: Some("x".repeat(MAX_CANCELLATION_NOTES + 1)),
        };
        assert_eq!(fields(too_long.validate().unwrap_err()), vec!["notes"]);
    }

    #[test]
    fn test_payment_method_requires_channel_config() {
        let input = PaymentMethodInput {
            name: Some("OVO".to_string()),
            method_type: Some(PaymentMethodType::Ewallet),
            fee: Some(Money::from_rupiah(1_500)),
            ..Default::default()
        };
        assert_eq!(
            fields(input.into_draft().unwrap_err()),
            vec!["eWalletPaymentConfig"]
        );

        let input = PaymentMethodInput {
            name: Some("BCA Virtual Account".to_string()),
            method_type: Some(PaymentMethodType::VirtualAccount),
            fee: Some(Money::from_rupiah(4_000)),
            virtual_account_config: Some(VirtualAccountConfig {
                bank_code: "BCA".to_string(),
                bank_name: "Bank Central Asia".to_string(),
                account_pattern: None,
            }),
            ..Default::default()
        };
        let draft = input.into_draft().unwrap();
        assert!(draft.is_active);
        assert_eq!(draft.reusability, PaymentReusability::OneTimeUse);
    }

    #[test]
    fn test_payment_method_name_and_fee_rules() {
        let input = PaymentMethodInput {
            name: Some("Q".to_string()),
            method_type: Some(PaymentMethodType::QrCode),
            fee: Some(Money::from_rupiah(-1)),
            ..Default::default()
        };
        assert_eq!(fields(input.into_draft().unwrap_err()), vec!["name", "fee"]);
    }
}
