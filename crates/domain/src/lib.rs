//! Domain layer of the marketplace backend.
//!
//! This crate is free of I/O. It provides:
//! - Status enums for payments, orders, work progress and roles
//! - The entities persisted by the store
//! - The webhook-driven payment state machine and ticket numbering
//! - Cancellation planning, order pricing and request validation

pub mod cancellation;
pub mod commands;
pub mod entities;
pub mod error;
pub mod payment;
pub mod pricing;
pub mod status;

pub use cancellation::CancellationPlan;
pub use commands::{
    CancelOrder, CreateOrder, NewOrder, PaymentMethodDraft, PaymentMethodInput, UpdateOrder,
};
pub use entities::{
    Cancellation, CarService, ETicket, EWalletConfig, Order, PaymentDetail, PaymentMethod, Refund,
    Transaction, TransactionDetails, User, UserCar, VirtualAccountConfig, Workshop,
};
pub use error::{DomainError, FieldError};
pub use payment::{
    GatewayEvent, GatewayStatus, PaymentSnapshot, PaymentTransition, next_ticket_number,
    resolve_transition,
};
pub use pricing::OrderQuote;
pub use status::{
    CancellationReason, OrderStatus, PaymentMethodType, PaymentReusability, PaymentStatus, Role,
    UnknownVariant, WorkStatus,
};
