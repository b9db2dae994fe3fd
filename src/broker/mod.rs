//! Broker capability used by the trading cycle.
//!
//! The scheduler only talks to a `Broker`; adapters decide how the calls
//! reach a venue:
//! - `HttpBroker`: JSON bridge in front of the real broker session
//! - `PaperBroker`: seeded random-walk prices with simulated settlement
//! - `ScriptedBroker`: deterministic fake driven by canned prices and orders

pub mod fake;
pub mod http;
pub mod paper;
pub mod session;

pub use fake::{ScriptedBroker, ScriptedOrder};
pub use http::HttpBroker;
pub use paper::PaperBroker;
pub use session::BrokerSession;

use crate::models::Direction;
use crate::{EngineError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Balance the orders are charged against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountKind {
    Practice,
    Real,
    Tournament,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Practice => "PRACTICE",
            AccountKind::Real => "REAL",
            AccountKind::Tournament => "TOURNAMENT",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountKind {
    type Err = EngineError;

    /// Accepts the menu names (`demo`, `real`, `torneo`/`tournament`) as well
    /// as the broker names
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "demo" | "practice" => Ok(AccountKind::Practice),
            "real" => Ok(AccountKind::Real),
            "torneo" | "tournament" => Ok(AccountKind::Tournament),
            other => Err(EngineError::Configuration(format!(
                "Unknown account type '{}'. Use demo, real or tournament",
                other
            ))),
        }
    }
}

/// Result of a connect attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectStatus {
    pub ok: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Result of an order submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlacement {
    pub ok: bool,
    #[serde(default)]
    pub order_id: Option<String>,
}

/// One settlement poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementStatus {
    pub ready: bool,
    #[serde(default)]
    pub profit: Decimal,
}

/// Everything the trading cycle needs from a broker
#[async_trait]
pub trait Broker: Send + Sync {
    async fn connect(&self) -> Result<ConnectStatus>;

    async fn is_connected(&self) -> Result<bool>;

    async fn select_account(&self, kind: AccountKind) -> Result<()>;

    /// Tradeable instrument identifiers
    async fn instruments(&self) -> Result<Vec<String>>;

    /// Start the realtime candle stream for an asset
    async fn start_stream(&self, asset: &str, candle_duration: u64, buffer: usize) -> Result<()>;

    async fn stop_stream(&self, asset: &str, candle_duration: u64) -> Result<()>;

    /// Close of the most recent candle in the stream
    async fn latest_price(&self, asset: &str, candle_duration: u64) -> Result<Decimal>;

    async fn place_order(
        &self,
        amount: Decimal,
        asset: &str,
        direction: Direction,
        expiration_mode: u32,
    ) -> Result<OrderPlacement>;

    /// Profit > 0 is a win, < 0 a loss, 0 a tie; only meaningful once `ready`
    async fn poll_settlement(&self, order_id: &str) -> Result<SettlementStatus>;
}
