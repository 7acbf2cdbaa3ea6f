use std::sync::Arc;

use payments::{CheckoutService, PaymentGateway, RedirectUrls, RetryPolicy, WebhookProcessor};
use store::Store;

use crate::auth::AuthKeys;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub store: S,
    pub checkout: CheckoutService<S>,
    pub webhooks: WebhookProcessor<S>,
    pub auth: AuthKeys,
    /// Expected `x-callback-token` header of gateway webhooks.
    pub callback_token: String,
}

impl<S: Store + Clone> AppState<S> {
    pub fn new(
        store: S,
        gateway: Arc<dyn PaymentGateway>,
        redirects: RedirectUrls,
        auth: AuthKeys,
        callback_token: impl Into<String>,
    ) -> Self {
        Self {
            checkout: CheckoutService::new(store.clone(), gateway, redirects),
            webhooks: WebhookProcessor::new(store.clone()),
            store,
            auth,
            callback_token: callback_token.into(),
        }
    }

    /// Replaces the retry policy of webhook processing.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.webhooks = WebhookProcessor::with_policy(self.store.clone(), policy);
        self
    }
}
