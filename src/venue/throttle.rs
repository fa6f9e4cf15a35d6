//! Request throttling around a venue.
//!
//! Every candidate polls for quotes on its own schedule; with several launches in
//! flight the combined request rate can trip gateway limits. All calls go through
//! one shared governor limiter.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rust_decimal::Decimal;
use std::num::NonZeroU32;

use crate::types::Quote;
use crate::venue::{PendingSwap, Receipt, SwapOrder, SwapVenue, VenueError};

/// Venue decorator that waits for a rate-limit permit before every call.
pub struct ThrottledVenue<V> {
    inner: V,
    limiter: DefaultDirectRateLimiter,
    requests_per_second: u32,
}

impl<V: SwapVenue> ThrottledVenue<V> {
    pub fn new(inner: V, requests_per_second: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
            requests_per_second: rate.get(),
        }
    }

    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }

    pub fn inner(&self) -> &V {
        &self.inner
    }
}

#[async_trait]
impl<V: SwapVenue> SwapVenue for ThrottledVenue<V> {
    async fn quote(&self, base: &str, target: &str, amount: Decimal) -> Result<Quote, VenueError> {
        self.limiter.until_ready().await;
        self.inner.quote(base, target, amount).await
    }

    async fn submit(&self, order: &SwapOrder) -> Result<PendingSwap, VenueError> {
        self.limiter.until_ready().await;
        self.inner.submit(order).await
    }

    async fn wait_for_receipt(&self, pending: &PendingSwap) -> Result<Receipt, VenueError> {
        // settlement waits are long-lived; only the request itself is metered
        self.limiter.until_ready().await;
        self.inner.wait_for_receipt(pending).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingVenue {
        quotes: AtomicUsize,
    }

    #[async_trait]
    impl SwapVenue for CountingVenue {
        async fn quote(&self, _base: &str, _target: &str, amount: Decimal) -> Result<Quote, VenueError> {
            self.quotes.fetch_add(1, Ordering::SeqCst);
            Ok(Quote { output_amount: amount, fee_tier: 500 })
        }

        async fn submit(&self, _order: &SwapOrder) -> Result<PendingSwap, VenueError> {
            Err(VenueError::Rejected("not used".into()))
        }

        async fn wait_for_receipt(&self, _pending: &PendingSwap) -> Result<Receipt, VenueError> {
            Err(VenueError::Rejected("not used".into()))
        }
    }

    #[test]
    fn test_zero_rate_falls_back_to_one() {
        let venue = ThrottledVenue::new(CountingVenue { quotes: AtomicUsize::new(0) }, 0);
        assert_eq!(venue.requests_per_second(), 1);
    }

    #[tokio::test]
    async fn test_forwards_calls_to_inner_venue() {
        let venue = ThrottledVenue::new(CountingVenue { quotes: AtomicUsize::new(0) }, 50);

        let quote = venue.quote("GALA", "FOO", Decimal::new(5, 0)).await.unwrap();
        assert_eq!(quote.output_amount, Decimal::new(5, 0));
        assert_eq!(venue.inner().quotes.load(Ordering::SeqCst), 1);
    }
}
