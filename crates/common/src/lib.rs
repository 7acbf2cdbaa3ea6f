//! Shared types for the marketplace backend.

pub mod ids;
pub mod money;
pub mod pagination;

pub use ids::{
    CarServiceId, ETicketId, OrderId, PaymentMethodId, TransactionId, UserCarId, UserId,
    WorkshopId,
};
pub use money::Money;
pub use pagination::{Page, PageRequest, Pagination, Sort, SortDirection};
