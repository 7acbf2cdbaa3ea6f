//! Relational persistence for the marketplace.
//!
//! [`Store`] is implemented twice: [`PostgresStore`] for production and
//! [`InMemoryStore`] for tests and local runs without a database.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{
    ORDER_SORT_FIELDS, OrderFilter, PAYMENT_METHOD_SORT_FIELDS, TICKET_SORT_FIELDS,
    TRANSACTION_SORT_FIELDS, TicketFilter, TransactionFilter,
};
pub use store::{NewCheckout, OrderCancellation, PaymentUpdateOutcome, Store, StoreExt};
