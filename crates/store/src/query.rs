use common::{UserId, WorkshopId};
use domain::{OrderStatus, PaymentStatus, WorkStatus};

/// Sortable fields of order lists.
pub const ORDER_SORT_FIELDS: &[&str] = &["createdAt", "updatedAt"];

/// Sortable fields of transaction and history lists.
pub const TRANSACTION_SORT_FIELDS: &[&str] = &["createdAt", "updatedAt", "totalPrice"];

/// Sortable fields of payment method lists.
pub const PAYMENT_METHOD_SORT_FIELDS: &[&str] = &["createdAt", "updatedAt", "name", "fee"];

/// Sortable fields of e-ticket lists.
pub const TICKET_SORT_FIELDS: &[&str] = &["createdAt", "updatedAt", "ticketNumber"];

/// Filters for order lists. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub user_id: Option<UserId>,
    pub workshop_id: Option<WorkshopId>,
    pub order_status: Option<OrderStatus>,
    pub work_status: Option<WorkStatus>,
}

impl OrderFilter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders placed by one user.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    /// Orders booked at one workshop.
    pub fn for_workshop(workshop_id: WorkshopId) -> Self {
        Self {
            workshop_id: Some(workshop_id),
            ..Default::default()
        }
    }

    pub fn order_status(mut self, status: Option<OrderStatus>) -> Self {
        self.order_status = status;
        self
    }

    pub fn work_status(mut self, status: Option<WorkStatus>) -> Self {
        self.work_status = status;
        self
    }
}

/// Filters for transaction and history lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub user_id: Option<UserId>,
    pub payment_status: Option<PaymentStatus>,
    /// Case-insensitive exact match on the payment method name.
    pub payment_method_name: Option<String>,
}

impl TransactionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn payment_status(mut self, status: Option<PaymentStatus>) -> Self {
        self.payment_status = status;
        self
    }

    pub fn payment_method_name(mut self, name: Option<String>) -> Self {
        self.payment_method_name = name.filter(|n| !n.trim().is_empty());
        self
    }
}

/// Filters for e-ticket lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketFilter {
    pub user_id: Option<UserId>,
}

impl TicketFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_filter_builder() {
        let user = UserId::new();
        let filter = OrderFilter::for_user(user)
            .order_status(Some(OrderStatus::Draft))
            .work_status(None);
        assert_eq!(filter.user_id, Some(user));
        assert_eq!(filter.order_status, Some(OrderStatus::Draft));
        assert!(filter.workshop_id.is_none());
    }

    #[test]
    fn test_blank_payment_method_name_is_ignored() {
        let filter = TransactionFilter::new().payment_method_name(Some("  ".to_string()));
        assert!(filter.payment_method_name.is_none());
    }
}
