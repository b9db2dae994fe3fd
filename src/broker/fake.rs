use super::{AccountKind, Broker, ConnectStatus, OrderPlacement, SettlementStatus};
use crate::models::Direction;
use crate::{EngineError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// How the next submitted order behaves
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedOrder {
    /// Accepted; reports `pending_polls` unready polls, then settles
    Settles { profit: Decimal, pending_polls: u32 },
    /// Broker refuses the order
    Rejected,
    /// Accepted but never settles
    NeverSettles,
}

/// An order the fake received
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub order_id: String,
    pub amount: Decimal,
    pub asset: String,
    pub direction: Direction,
    pub expiration_mode: u32,
}

#[derive(Debug, Default)]
struct ScriptState {
    prices: VecDeque<Decimal>,
    last_price: Option<Decimal>,
    orders: VecDeque<ScriptedOrder>,
    placed: Vec<PlacedOrder>,
    open_orders: HashMap<String, (ScriptedOrder, u32)>,
    instruments: Vec<String>,
    login_rejection: Option<String>,
    connected: bool,
    connect_calls: u32,
    account: Option<AccountKind>,
    streaming: bool,
    stream_stops: u32,
    settlement_polls: u32,
}

/// Deterministic broker for tests and dry runs
///
/// Prices are served in order; once exhausted the last price repeats.
/// Orders follow the scripted behaviors in order; with no script left an
/// order settles immediately as a tie.
#[derive(Debug, Default)]
pub struct ScriptedBroker {
    state: Mutex<ScriptState>,
}

impl ScriptedBroker {
    pub fn new(prices: Vec<Decimal>) -> Self {
        let state = ScriptState {
            prices: prices.into(),
            instruments: vec![
                "EURUSD-OTC".to_string(),
                "EURJPY-OTC".to_string(),
                "USDZAR-OTC".to_string(),
            ],
            ..Default::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn with_orders(self, orders: Vec<ScriptedOrder>) -> Self {
        self.state().orders = orders.into();
        self
    }

    pub fn with_instruments(self, instruments: &[&str]) -> Self {
        self.state().instruments = instruments.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn rejecting_logins(self, reason: &str) -> Self {
        self.state().login_rejection = Some(reason.to_string());
        self
    }

    /// Queue more prices behind the remaining ones
    pub fn push_prices(&self, prices: impl IntoIterator<Item = Decimal>) {
        self.state().prices.extend(prices);
    }

    /// Simulate the broker dropping the session
    pub fn drop_connection(&self) {
        self.state().connected = false;
    }

    pub fn connect_calls(&self) -> u32 {
        self.state().connect_calls
    }

    pub fn selected_account(&self) -> Option<AccountKind> {
        self.state().account
    }

    pub fn placed_orders(&self) -> Vec<PlacedOrder> {
        self.state().placed.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.state().streaming
    }

    pub fn stream_stops(&self) -> u32 {
        self.state().stream_stops
    }

    pub fn settlement_polls(&self) -> u32 {
        self.state().settlement_polls
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Broker for ScriptedBroker {
    async fn connect(&self) -> Result<ConnectStatus> {
        let mut state = self.state();
        state.connect_calls += 1;

        if let Some(reason) = state.login_rejection.clone() {
            return Ok(ConnectStatus {
                ok: false,
                reason: Some(reason),
            });
        }

        state.connected = true;
        Ok(ConnectStatus {
            ok: true,
            reason: None,
        })
    }

    async fn is_connected(&self) -> Result<bool> {
        Ok(self.state().connected)
    }

    async fn select_account(&self, kind: AccountKind) -> Result<()> {
        self.state().account = Some(kind);
        Ok(())
    }

    async fn instruments(&self) -> Result<Vec<String>> {
        Ok(self.state().instruments.clone())
    }

    async fn start_stream(&self, _asset: &str, _candle_duration: u64, _buffer: usize) -> Result<()> {
        self.state().streaming = true;
        Ok(())
    }

    async fn stop_stream(&self, _asset: &str, _candle_duration: u64) -> Result<()> {
        let mut state = self.state();
        state.streaming = false;
        state.stream_stops += 1;
        Ok(())
    }

    async fn latest_price(&self, asset: &str, _candle_duration: u64) -> Result<Decimal> {
        let mut state = self.state();
        if let Some(price) = state.prices.pop_front() {
            state.last_price = Some(price);
        }
        state
            .last_price
            .ok_or_else(|| EngineError::Broker(format!("No price scripted for {}", asset)))
    }

    async fn place_order(
        &self,
        amount: Decimal,
        asset: &str,
        direction: Direction,
        expiration_mode: u32,
    ) -> Result<OrderPlacement> {
        let mut state = self.state();
        let behavior = state.orders.pop_front().unwrap_or(ScriptedOrder::Settles {
            profit: Decimal::ZERO,
            pending_polls: 0,
        });

        if behavior == ScriptedOrder::Rejected {
            return Ok(OrderPlacement {
                ok: false,
                order_id: None,
            });
        }

        let order_id = format!("order-{}", state.placed.len() + 1);
        state.placed.push(PlacedOrder {
            order_id: order_id.clone(),
            amount,
            asset: asset.to_string(),
            direction,
            expiration_mode,
        });
        state.open_orders.insert(order_id.clone(), (behavior, 0));

        Ok(OrderPlacement {
            ok: true,
            order_id: Some(order_id),
        })
    }

    async fn poll_settlement(&self, order_id: &str) -> Result<SettlementStatus> {
        let mut state = self.state();
        state.settlement_polls += 1;

        let (behavior, polls) = state
            .open_orders
            .get_mut(order_id)
            .ok_or_else(|| EngineError::Broker(format!("Unknown order {}", order_id)))?;

        match behavior {
            ScriptedOrder::Settles {
                profit,
                pending_polls,
            } => {
                if *polls < *pending_polls {
                    *polls += 1;
                    return Ok(SettlementStatus {
                        ready: false,
                        profit: Decimal::ZERO,
                    });
                }
                Ok(SettlementStatus {
                    ready: true,
                    profit: *profit,
                })
            }
            _ => Ok(SettlementStatus {
                ready: false,
                profit: Decimal::ZERO,
            }),
        }
    }
}
