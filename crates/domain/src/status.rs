//! Status and classification enums shared by orders, transactions and users.
//!
//! All of them travel over the wire in `SCREAMING_SNAKE_CASE`, which is also
//! how they are stored in the database.

use serde::{Deserialize, Serialize};

/// Implements `as_str`, `Display` and `FromStr` from a variant/name table.
macro_rules! wire_names {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// All variants, in declaration order.
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Returns the wire name of this variant.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = UnknownVariant;

            /// Case-insensitive, so query strings like `?orderStatus=draft` work.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $(
                    if s.eq_ignore_ascii_case($name) {
                        return Ok($ty::$variant);
                    }
                )+
                Err(UnknownVariant {
                    kind: stringify!($ty),
                    value: s.to_string(),
                })
            }
        }
    };
}

/// Returned when a string does not name any variant of a status enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Payment state of a transaction.
///
/// ```text
/// Pending ──┬──► Success ──► Refunded
///           ├──► Failed
///           ├──► Expired
///           └──► Refunded
/// ```
///
/// Transitions are driven by gateway webhooks and by order cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Charge created at the gateway, awaiting the customer.
    #[default]
    Pending,
    /// The gateway reported the charge as paid.
    Success,
    Failed,
    Expired,
    /// The charge was paid and then refunded after a cancellation.
    Refunded,
}

wire_names!(PaymentStatus {
    Pending => "PENDING",
    Success => "SUCCESS",
    Failed => "FAILED",
    Expired => "EXPIRED",
    Refunded => "REFUNDED",
});

impl PaymentStatus {
    /// Returns true if the customer still owes the gateway a payment.
    pub fn is_awaiting_payment(&self) -> bool {
        matches!(self, PaymentStatus::Pending)
    }

    /// Returns true if money has been captured and must be refunded on cancellation.
    pub fn can_refund(&self) -> bool {
        matches!(self, PaymentStatus::Success)
    }

    /// Returns true if no further gateway activity is expected.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Failed | PaymentStatus::Expired | PaymentStatus::Refunded
        )
    }
}

/// Lifecycle state of a service order.
///
/// ```text
/// Draft ──► Confirmed ──► Processing ──► Completed
///   │           │             │
///   └───────────┴─────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order placed; stays here after payment until the workshop confirms it.
    #[default]
    Draft,
    Confirmed,
    Processing,
    /// Service delivered (terminal state).
    Completed,
    /// Order cancelled by the customer, an admin, or payment expiry (terminal state).
    Cancelled,
}

wire_names!(OrderStatus {
    Draft => "DRAFT",
    Confirmed => "CONFIRMED",
    Processing => "PROCESSING",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

impl OrderStatus {
    /// Returns true if the order can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

/// Progress of the physical work on the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkStatus {
    #[default]
    Queued,
    Inspection,
    Putty,
    Surfacer,
    ApplicationColorBase,
    ApplicationClearCoat,
    Polishing,
    FinalQc,
    Completed,
    Cancelled,
}

wire_names!(WorkStatus {
    Queued => "QUEUED",
    Inspection => "INSPECTION",
    Putty => "PUTTY",
    Surfacer => "SURFACER",
    ApplicationColorBase => "APPLICATION_COLOR_BASE",
    ApplicationClearCoat => "APPLICATION_CLEAR_COAT",
    Polishing => "POLISHING",
    FinalQc => "FINAL_QC",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

/// Access level of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    User,
    Admin,
    SuperAdmin,
}

wire_names!(Role {
    User => "USER",
    Admin => "ADMIN",
    SuperAdmin => "SUPER_ADMIN",
});

impl Role {
    /// Returns true for roles allowed on back-office endpoints.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

/// Why an order was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancellationReason {
    CustomerRequest,
    WorkshopUnavailable,
    ServiceUnavailable,
    SchedulingConflict,
    PaymentIssue,
    VehicleIssue,
    PriceDisagreement,
    WorkshopOverbooked,
    DuplicateOrder,
    PartsUnavailable,
    CustomerNoShow,
    ForceMajeure,
    ServiceIncompatibility,
    #[default]
    Other,
}

wire_names!(CancellationReason {
    CustomerRequest => "CUSTOMER_REQUEST",
    WorkshopUnavailable => "WORKSHOP_UNAVAILABLE",
    ServiceUnavailable => "SERVICE_UNAVAILABLE",
    SchedulingConflict => "SCHEDULING_CONFLICT",
    PaymentIssue => "PAYMENT_ISSUE",
    VehicleIssue => "VEHICLE_ISSUE",
    PriceDisagreement => "PRICE_DISAGREEMENT",
    WorkshopOverbooked => "WORKSHOP_OVERBOOKED",
    DuplicateOrder => "DUPLICATE_ORDER",
    PartsUnavailable => "PARTS_UNAVAILABLE",
    CustomerNoShow => "CUSTOMER_NO_SHOW",
    ForceMajeure => "FORCE_MAJEURE",
    ServiceIncompatibility => "SERVICE_INCOMPATIBILITY",
    Other => "OTHER",
});

/// Gateway channel family of a payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethodType {
    Ewallet,
    VirtualAccount,
    OverTheCounter,
    QrCode,
    DirectDebit,
    Card,
}

wire_names!(PaymentMethodType {
    Ewallet => "EWALLET",
    VirtualAccount => "VIRTUAL_ACCOUNT",
    OverTheCounter => "OVER_THE_COUNTER",
    QrCode => "QR_CODE",
    DirectDebit => "DIRECT_DEBIT",
    Card => "CARD",
});

/// Whether a gateway payment method may be charged more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentReusability {
    #[default]
    OneTimeUse,
    MultipleUse,
}

wire_names!(PaymentReusability {
    OneTimeUse => "ONE_TIME_USE",
    MultipleUse => "MULTIPLE_USE",
});
