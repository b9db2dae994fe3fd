use super::{AccountKind, Broker, ConnectStatus, OrderPlacement, SettlementStatus};
use crate::models::Direction;
use crate::{EngineError, Result};
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

const MAX_RETRIES: u32 = 3;

// Type alias for the rate limiter to simplify signatures
type BridgeRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for the broker bridge REST API
///
/// The bridge owns the actual broker session; this client only forwards the
/// calls the trading cycle makes. Cloneable; clones share the rate limiter.
#[derive(Clone)]
pub struct HttpBroker {
    client: Client,
    base_url: String,
    email: String,
    password: String,
    rate_limiter: Arc<BridgeRateLimiter>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    connected: bool,
}

#[derive(Debug, Serialize)]
struct BalanceRequest {
    kind: AccountKind,
}

#[derive(Debug, Deserialize)]
struct InstrumentsResponse {
    instruments: Vec<String>,
}

#[derive(Debug, Serialize)]
struct StreamRequest<'a> {
    asset: &'a str,
    size: u64,
    buffer: usize,
}

#[derive(Debug, Deserialize)]
struct CandleQuote {
    close: Decimal,
}

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    /// Keyed by candle open timestamp
    candles: BTreeMap<i64, CandleQuote>,
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    amount: Decimal,
    asset: &'a str,
    direction: Direction,
    expiration: u32,
}

#[derive(Debug, Deserialize)]
struct Ack {}

impl HttpBroker {
    /// Create a new bridge client
    ///
    /// # Arguments
    /// * `base_url` - Bridge root, e.g. `http://127.0.0.1:8080/api`
    /// * `requests_per_minute` - Client-side rate limit
    pub fn new(
        base_url: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        requests_per_minute: u32,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            email: email.into(),
            password: password.into(),
            rate_limiter,
        })
    }

    /// Make a rate-limited request with retry logic
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 1..=MAX_RETRIES {
            // Wait for rate limiter
            self.rate_limiter.until_ready().await;

            let mut builder = self.client.request(method.clone(), &url);
            if let Some(ref json) = body {
                builder = builder.json(json);
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json::<T>().await?);
                    }

                    // Rate limited or server error - back off and retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let backoff_secs = 2u64.pow(attempt);
                        tracing::warn!(
                            "Bridge returned {} for {}, retrying in {}s (attempt {}/{})",
                            status,
                            path,
                            backoff_secs,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        continue;
                    }

                    // Other errors (4xx) - don't retry
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(EngineError::Broker(format!(
                        "Bridge error ({}) on {}: {}",
                        status, path, error_text
                    )));
                }
                Err(e) if attempt < MAX_RETRIES => {
                    let backoff_secs = 2u64.pow(attempt);
                    tracing::warn!(
                        "Network error: {}, retrying in {}s (attempt {}/{})",
                        e,
                        backoff_secs,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                }
                Err(e) => {
                    return Err(EngineError::Broker(format!(
                        "Network error after {} retries: {}",
                        MAX_RETRIES, e
                    )))
                }
            }
        }

        Err(EngineError::Broker(format!(
            "Failed after {} retries: {}",
            MAX_RETRIES, path
        )))
    }

    /// Send a single rate-limited request without retrying
    ///
    /// Used for calls that are not safe to repeat, where a lost response
    /// may hide a request the bridge already acted on.
    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        self.rate_limiter.until_ready().await;

        let mut builder = self.client.request(method, &url);
        if let Some(ref json) = body {
            builder = builder.json(json);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| EngineError::Broker(format!("Network error on {}: {}", path, e)))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(EngineError::Broker(format!(
            "Bridge error ({}) on {}: {}",
            status, path, error_text
        )))
    }

    fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value> {
        serde_json::to_value(value).map_err(|e| EngineError::Broker(e.to_string()))
    }
}

#[async_trait]
impl Broker for HttpBroker {
    async fn connect(&self) -> Result<ConnectStatus> {
        let body = Self::to_json(&LoginRequest {
            email: &self.email,
            password: &self.password,
        })?;
        self.request(Method::POST, "/session", Some(body)).await
    }

    async fn is_connected(&self) -> Result<bool> {
        let session: SessionResponse = self.request(Method::GET, "/session", None).await?;
        Ok(session.connected)
    }

    async fn select_account(&self, kind: AccountKind) -> Result<()> {
        let body = Self::to_json(&BalanceRequest { kind })?;
        let _: Ack = self.request(Method::PUT, "/balance", Some(body)).await?;
        Ok(())
    }

    async fn instruments(&self) -> Result<Vec<String>> {
        let response: InstrumentsResponse = self
            .request(Method::GET, "/instruments?type=binary-option", None)
            .await?;
        Ok(response.instruments)
    }

    async fn start_stream(&self, asset: &str, candle_duration: u64, buffer: usize) -> Result<()> {
        let body = Self::to_json(&StreamRequest {
            asset,
            size: candle_duration,
            buffer,
        })?;
        let _: Ack = self.request(Method::POST, "/streams", Some(body)).await?;
        Ok(())
    }

    async fn stop_stream(&self, asset: &str, candle_duration: u64) -> Result<()> {
        let path = format!("/streams/{}/{}", asset, candle_duration);
        let _: Ack = self.request(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn latest_price(&self, asset: &str, candle_duration: u64) -> Result<Decimal> {
        let path = format!("/candles/{}/{}", asset, candle_duration);
        let response: CandlesResponse = self.request(Method::GET, &path, None).await?;

        response
            .candles
            .last_key_value()
            .map(|(_, quote)| quote.close)
            .ok_or_else(|| EngineError::Broker(format!("No candles streamed for {}", asset)))
    }

    async fn place_order(
        &self,
        amount: Decimal,
        asset: &str,
        direction: Direction,
        expiration_mode: u32,
    ) -> Result<OrderPlacement> {
        let body = Self::to_json(&OrderRequest {
            amount,
            asset,
            direction,
            expiration: expiration_mode,
        })?;
        // Never retried: a repeat could open a second position
        self.send_once(Method::POST, "/orders", Some(body)).await
    }

    async fn poll_settlement(&self, order_id: &str) -> Result<SettlementStatus> {
        let path = format!("/orders/{}", order_id);
        self.request(Method::GET, &path, None).await
    }
}
