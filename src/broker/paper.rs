use super::{AccountKind, Broker, ConnectStatus, OrderPlacement, SettlementStatus};
use crate::models::Direction;
use crate::{EngineError, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::time::{Duration, Instant};

/// Payout ratio credited on a winning paper trade, in hundredths
const PAYOUT_PCT: i64 = 85;
/// Decimal places of simulated quotes (forex-style)
const PRICE_SCALE: u32 = 5;

#[derive(Debug)]
struct PaperOrder {
    entry_price: Decimal,
    direction: Direction,
    amount: Decimal,
    expires_at: Instant,
}

#[derive(Debug)]
struct PaperState {
    rng: StdRng,
    price: f64,
    orders: HashMap<String, PaperOrder>,
    next_id: u64,
    balance: Decimal,
    account: AccountKind,
}

/// Simulated broker: seeded random-walk quotes, orders settled against the
/// quote at expiry
///
/// Useful for running the full cycle without touching a real account.
#[derive(Debug)]
pub struct PaperBroker {
    state: Mutex<PaperState>,
    instruments: Vec<String>,
    volatility: f64,
}

impl PaperBroker {
    /// Create a new paper broker with a seed for reproducibility
    pub fn new(seed: u64, instruments: Vec<String>) -> Self {
        Self {
            state: Mutex::new(PaperState {
                rng: StdRng::seed_from_u64(seed),
                price: 1.08450,
                orders: HashMap::new(),
                next_id: 1,
                balance: Decimal::from(10_000),
                account: AccountKind::Practice,
            }),
            instruments,
            volatility: 0.00012,
        }
    }

    pub fn balance(&self) -> Decimal {
        self.state().balance
    }

    pub fn account(&self) -> AccountKind {
        self.state().account
    }

    fn state(&self) -> MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn quote(price: f64) -> Result<Decimal> {
        Decimal::from_f64(price)
            .map(|d| d.round_dp(PRICE_SCALE))
            .ok_or_else(|| EngineError::Broker(format!("Unrepresentable price {}", price)))
    }

    /// Advance the random walk by one step
    fn step(&self, state: &mut PaperState) -> Result<Decimal> {
        let shock: f64 = state.rng.gen_range(-1.0..1.0);
        state.price = (state.price * (1.0 + shock * self.volatility)).max(0.00001);
        Self::quote(state.price)
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn connect(&self) -> Result<ConnectStatus> {
        Ok(ConnectStatus {
            ok: true,
            reason: None,
        })
    }

    async fn is_connected(&self) -> Result<bool> {
        Ok(true)
    }

    async fn select_account(&self, kind: AccountKind) -> Result<()> {
        self.state().account = kind;
        Ok(())
    }

    async fn instruments(&self) -> Result<Vec<String>> {
        Ok(self.instruments.clone())
    }

    async fn start_stream(&self, asset: &str, candle_duration: u64, _buffer: usize) -> Result<()> {
        tracing::debug!("Paper stream started for {} ({}s candles)", asset, candle_duration);
        Ok(())
    }

    async fn stop_stream(&self, asset: &str, _candle_duration: u64) -> Result<()> {
        tracing::debug!("Paper stream stopped for {}", asset);
        Ok(())
    }

    async fn latest_price(&self, _asset: &str, _candle_duration: u64) -> Result<Decimal> {
        let mut state = self.state();
        self.step(&mut state)
    }

    async fn place_order(
        &self,
        amount: Decimal,
        _asset: &str,
        direction: Direction,
        expiration_mode: u32,
    ) -> Result<OrderPlacement> {
        let mut state = self.state();
        if amount <= Decimal::ZERO || amount > state.balance {
            return Ok(OrderPlacement {
                ok: false,
                order_id: None,
            });
        }

        let entry_price = Self::quote(state.price)?;
        let order_id = format!("paper-{}", state.next_id);
        state.next_id += 1;
        state.balance -= amount;
        state.orders.insert(
            order_id.clone(),
            PaperOrder {
                entry_price,
                direction,
                amount,
                expires_at: Instant::now() + Duration::from_secs(expiration_mode as u64 * 60),
            },
        );

        Ok(OrderPlacement {
            ok: true,
            order_id: Some(order_id),
        })
    }

    async fn poll_settlement(&self, order_id: &str) -> Result<SettlementStatus> {
        let mut state = self.state();

        let expires_at = state
            .orders
            .get(order_id)
            .map(|o| o.expires_at)
            .ok_or_else(|| EngineError::Broker(format!("Unknown order {}", order_id)))?;

        if Instant::now() < expires_at {
            return Ok(SettlementStatus {
                ready: false,
                profit: Decimal::ZERO,
            });
        }

        let close = self.step(&mut state)?;
        let Some(order) = state.orders.remove(order_id) else {
            return Err(EngineError::Broker(format!("Unknown order {}", order_id)));
        };

        let moved_our_way = match order.direction {
            Direction::Call => close.cmp(&order.entry_price),
            Direction::Put => order.entry_price.cmp(&close),
        };

        let payout = Decimal::new(PAYOUT_PCT, 2);
        let profit = match moved_our_way {
            std::cmp::Ordering::Greater => (order.amount * payout).round_dp(2),
            std::cmp::Ordering::Less => -order.amount,
            std::cmp::Ordering::Equal => Decimal::ZERO,
        };

        state.balance += order.amount + profit;

        Ok(SettlementStatus {
            ready: true,
            profit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker() -> PaperBroker {
        PaperBroker::new(42, vec!["EURUSD-OTC".to_string()])
    }

    #[tokio::test]
    async fn test_prices_are_reproducible() {
        let a = broker();
        let b = broker();

        for _ in 0..20 {
            assert_eq!(
                a.latest_price("EURUSD-OTC", 60).await.unwrap(),
                b.latest_price("EURUSD-OTC", 60).await.unwrap()
            );
        }
    }

    #[tokio::test]
    async fn test_prices_have_five_decimals() {
        let broker = broker();
        let price = broker.latest_price("EURUSD-OTC", 60).await.unwrap();
        assert!(price.scale() <= PRICE_SCALE);
        assert!(price > Decimal::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_settles_after_expiry() {
        let broker = broker();
        let placement = broker
            .place_order(Decimal::from(10), "EURUSD-OTC", Direction::Call, 1)
            .await
            .unwrap();
        let id = placement.order_id.unwrap();
        assert_eq!(broker.balance(), Decimal::from(9_990));

        assert!(!broker.poll_settlement(&id).await.unwrap().ready);

        tokio::time::advance(Duration::from_secs(61)).await;
        let status = broker.poll_settlement(&id).await.unwrap();
        assert!(status.ready);
        assert!(
            status.profit == Decimal::new(850, 2)
                || status.profit == Decimal::from(-10)
                || status.profit == Decimal::ZERO
        );

        // Settled orders are forgotten
        assert!(broker.poll_settlement(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_order_larger_than_balance_is_rejected() {
        let broker = broker();
        let placement = broker
            .place_order(Decimal::from(20_000), "EURUSD-OTC", Direction::Put, 1)
            .await
            .unwrap();
        assert!(!placement.ok);
    }
}
