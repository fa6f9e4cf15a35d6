//! HTTP trade gateway client.
//!
//! Talks JSON to a signing gateway that fronts the DEX. The gateway owns the
//! wallet keys; this client only prices, submits and waits.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::types::Quote;
use crate::venue::{PendingSwap, Receipt, SwapOrder, SwapVenue, VenueError};

/// Connection settings for the gateway.
#[derive(Debug, Clone)]
pub struct HttpVenueConfig {
    /// Gateway base URL, e.g. `http://127.0.0.1:8787`
    pub base_url: String,
    /// Optional bearer token
    pub api_key: Option<String>,
    /// Per-request timeout for quote and submit calls
    pub request_timeout: Duration,
    /// Timeout for the receipt wait, which blocks until the swap settles
    pub receipt_timeout: Duration,
}

impl Default for HttpVenueConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8787".to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(10),
            receipt_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRequest<'a> {
    token_in: &'a str,
    token_out: &'a str,
    amount_in: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    out_token_amount: Decimal,
    fee_tier: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "error")]
    message: String,
}

/// [`SwapVenue`] backed by the HTTP gateway.
pub struct HttpSwapVenue {
    client: Client,
    config: HttpVenueConfig,
}

impl HttpSwapVenue {
    pub fn new(config: HttpVenueConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, VenueError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| VenueError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| VenueError::Upstream(format!("invalid response body: {}", e)));
        }

        Err(classify_failure(status, error_message(response).await))
    }
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body.message,
        Err(_) if !text.trim().is_empty() => text.trim().to_string(),
        Err(_) => status.to_string(),
    }
}

/// Map a failed gateway response onto the venue error taxonomy.
pub(crate) fn classify_failure(status: StatusCode, message: String) -> VenueError {
    let lowered = message.to_lowercase();
    match status {
        StatusCode::NOT_FOUND => VenueError::NoMarket(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => VenueError::Unauthorized(message),
        s if s.is_client_error() && (lowered.contains("pool") || lowered.contains("no market")) => {
            VenueError::NoMarket(message)
        }
        s if s.is_client_error() => VenueError::Rejected(message),
        _ => VenueError::Upstream(format!("{}: {}", status, message)),
    }
}

#[async_trait]
impl SwapVenue for HttpSwapVenue {
    #[instrument(skip_all, fields(token = %target))]
    async fn quote(&self, base: &str, target: &str, amount: Decimal) -> Result<Quote, VenueError> {
        let request = self
            .client
            .post(self.url("v1/quote/exact-input"))
            .timeout(self.config.request_timeout)
            .json(&QuoteRequest {
                token_in: base,
                token_out: target,
                amount_in: amount,
            });

        let response: QuoteResponse = self.send(request).await?;
        debug!("Quoted {} {} -> {} {}", amount, base, response.out_token_amount, target);
        Ok(Quote {
            output_amount: response.out_token_amount,
            fee_tier: response.fee_tier,
        })
    }

    #[instrument(skip_all, fields(token = %order.token_out))]
    async fn submit(&self, order: &SwapOrder) -> Result<PendingSwap, VenueError> {
        let request = self
            .client
            .post(self.url("v1/swap"))
            .timeout(self.config.request_timeout)
            .json(order);
        self.send(request).await
    }

    #[instrument(skip_all, fields(tx = %pending.transaction_id))]
    async fn wait_for_receipt(&self, pending: &PendingSwap) -> Result<Receipt, VenueError> {
        let request = self
            .client
            .get(self.url(&format!("v1/transactions/{}/receipt", pending.transaction_id)))
            .timeout(self.config.receipt_timeout);
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_failure() {
        assert_eq!(
            classify_failure(StatusCode::NOT_FOUND, "missing".into()),
            VenueError::NoMarket("missing".into())
        );
        assert_eq!(
            classify_failure(StatusCode::BAD_REQUEST, "Pool not found for pair".into()),
            VenueError::NoMarket("Pool not found for pair".into())
        );
        assert_eq!(
            classify_failure(StatusCode::UNPROCESSABLE_ENTITY, "slippage exceeded".into()),
            VenueError::Rejected("slippage exceeded".into())
        );
        assert!(matches!(
            classify_failure(StatusCode::FORBIDDEN, "bad key".into()),
            VenueError::Unauthorized(_)
        ));
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, "down".into()),
            VenueError::Upstream(_)
        ));
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let venue = HttpSwapVenue::new(HttpVenueConfig {
            base_url: "http://gateway:8787/".to_string(),
            ..HttpVenueConfig::default()
        });
        assert_eq!(venue.url("v1/swap"), "http://gateway:8787/v1/swap");
    }

    #[test]
    fn test_quote_response_accepts_string_amounts() {
        let parsed: QuoteResponse =
            serde_json::from_str(r#"{"outTokenAmount":"1234.5","feeTier":10000}"#).unwrap();
        assert_eq!(parsed.out_token_amount, Decimal::new(12345, 1));
        assert_eq!(parsed.fee_tier, 10000);
    }
}
