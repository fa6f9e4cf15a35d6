//! Quote acquisition for freshly announced tokens.
//!
//! A new sale's pool usually appears a little after the announcement. Quoting is
//! retried with exponential backoff until the venue prices the pair; there is no
//! attempt ceiling here, callers bound it by dropping the future.

use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_retry::Retry;
use tracing::{debug, info, instrument};

use crate::pipeline::backoff::BackoffSchedule;
use crate::types::Quote;
use crate::venue::{SwapVenue, VenueError};

/// Polls a venue until a quote is available.
#[derive(Clone)]
pub struct QuoteAcquirer {
    venue: Arc<dyn SwapVenue>,
    schedule: BackoffSchedule,
}

impl QuoteAcquirer {
    pub fn new(venue: Arc<dyn SwapVenue>, schedule: BackoffSchedule) -> Self {
        Self { venue, schedule }
    }

    pub fn schedule(&self) -> &BackoffSchedule {
        &self.schedule
    }

    /// Quote `amount` of `base` into `target`, retrying every failure.
    ///
    /// The schedule is infinite, so an `Err` is only possible with a bounded
    /// schedule supplied by the caller.
    #[instrument(skip_all, fields(token = %label))]
    pub async fn acquire(
        &self,
        base: &str,
        target: &str,
        amount: Decimal,
        label: &str,
    ) -> Result<Quote, VenueError> {
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let venue = self.venue.as_ref();
        let schedule = &self.schedule;

        let quote = Retry::spawn(self.schedule.clone(), move || async move {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            match venue.quote(base, target, amount).await {
                Ok(quote) => Ok(quote),
                Err(e) => {
                    let delay = schedule.delay_for(attempt);
                    debug!("Quote attempt {} for {} failed: {}", attempt, label, e);
                    info!("Pool not ready for {}; retry {} in {}ms", label, attempt, delay.as_millis());
                    Err(e)
                }
            }
        })
        .await?;

        info!(
            "Quote ready for {} after {} attempt(s): out={} fee={}",
            label,
            attempts.load(Ordering::Relaxed),
            quote.output_amount,
            quote.fee_tier
        );
        Ok(quote)
    }
}
