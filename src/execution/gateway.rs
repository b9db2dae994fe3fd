use crate::broker::BrokerSession;
use crate::models::{Direction, Outcome};
use crate::{EngineError, Result};
use rust_decimal::Decimal;
use std::time::Duration;

/// Result of one order round-trip
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub outcome: Outcome,
    pub profit: Decimal,
    pub order_id: Option<String>,
}

impl Execution {
    fn failed() -> Self {
        Self {
            outcome: Outcome::Error,
            profit: Decimal::ZERO,
            order_id: None,
        }
    }
}

/// Places binary-option orders and waits for their settlement
pub struct ExecutionGateway {
    session: BrokerSession,
    trade_amount: Decimal,
    expiration_mode: u32,
    poll_interval: Duration,
    settlement_timeout: Duration,
}

impl ExecutionGateway {
    pub fn new(
        session: BrokerSession,
        trade_amount: Decimal,
        expiration_mode: u32,
        poll_interval: Duration,
        settlement_timeout: Duration,
    ) -> Self {
        Self {
            session,
            trade_amount,
            expiration_mode,
            poll_interval,
            settlement_timeout,
        }
    }

    pub fn session(&self) -> &BrokerSession {
        &self.session
    }

    pub fn trade_amount(&self) -> Decimal {
        self.trade_amount
    }

    /// Place an order and block until it settles or the wait times out.
    ///
    /// Never fails: connectivity and placement problems come back as an
    /// `Outcome::Error` execution with zero profit so the run can continue.
    pub async fn place_and_await(&self, asset: &str, direction: Direction) -> Execution {
        if let Err(e) = self.session.ensure_connected().await {
            tracing::error!(asset = %asset, "Cannot place order, reconnect failed: {}", e);
            return Execution::failed();
        }

        let order_id = match self.place(asset, direction).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(asset = %asset, direction = %direction, "Order placement failed: {}", e);
                return Execution::failed();
            }
        };

        tracing::info!(
            asset = %asset,
            order_id = %order_id,
            amount = %self.trade_amount,
            "Order placed: {}",
            direction
        );

        match tokio::time::timeout(self.settlement_timeout, self.await_settlement(&order_id)).await
        {
            Ok(profit) => {
                let outcome = Outcome::from_profit(profit);
                tracing::info!(order_id = %order_id, profit = %profit, "Order settled: {}", outcome);
                Execution {
                    outcome,
                    profit,
                    order_id: Some(order_id),
                }
            }
            Err(_) => {
                tracing::warn!(
                    order_id = %order_id,
                    "No settlement after {:?}, giving up",
                    self.settlement_timeout
                );
                Execution {
                    outcome: Outcome::Timeout,
                    profit: Decimal::ZERO,
                    order_id: Some(order_id),
                }
            }
        }
    }

    async fn place(&self, asset: &str, direction: Direction) -> Result<String> {
        let placement = self
            .session
            .broker()
            .place_order(self.trade_amount, asset, direction, self.expiration_mode)
            .await?;

        match (placement.ok, placement.order_id) {
            (true, Some(id)) => Ok(id),
            (true, None) => Err(EngineError::Execution(
                "broker accepted the order without an id".to_string(),
            )),
            (false, _) => Err(EngineError::Execution("order rejected by broker".to_string())),
        }
    }

    /// Poll until the broker reports a result. Transient poll errors are retried.
    async fn await_settlement(&self, order_id: &str) -> Decimal {
        loop {
            match self.session.broker().poll_settlement(order_id).await {
                Ok(status) if status.ready => return status.profit.round_dp(2),
                Ok(_) => {}
                Err(e) => tracing::warn!(order_id = %order_id, "Settlement poll failed: {}", e),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{AccountKind, ScriptedBroker, ScriptedOrder};
    use std::sync::Arc;

    async fn gateway(broker: Arc<ScriptedBroker>) -> ExecutionGateway {
        let session = BrokerSession::new(broker, AccountKind::Practice);
        session.open().await.unwrap();
        ExecutionGateway::new(
            session,
            Decimal::ONE,
            1,
            Duration::from_millis(100),
            Duration::from_secs(120),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_win_after_pending_polls() {
        let broker = Arc::new(ScriptedBroker::new(vec![]).with_orders(vec![
            ScriptedOrder::Settles {
                profit: Decimal::new(85, 2),
                pending_polls: 3,
            },
        ]));
        let gateway = gateway(broker.clone()).await;

        let execution = gateway.place_and_await("EURUSD-OTC", Direction::Call).await;

        assert_eq!(execution.outcome, Outcome::Win);
        assert_eq!(execution.profit, Decimal::new(85, 2));
        assert_eq!(execution.order_id.as_deref(), Some("order-1"));
        assert_eq!(broker.settlement_polls(), 4);

        let placed = broker.placed_orders();
        assert_eq!(placed[0].amount, Decimal::ONE);
        assert_eq!(placed[0].direction, Direction::Call);
        assert_eq!(placed[0].expiration_mode, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loss_and_tie() {
        let broker = Arc::new(ScriptedBroker::new(vec![]).with_orders(vec![
            ScriptedOrder::Settles {
                profit: Decimal::from(-1),
                pending_polls: 0,
            },
            ScriptedOrder::Settles {
                profit: Decimal::ZERO,
                pending_polls: 0,
            },
        ]));
        let gateway = gateway(broker).await;

        let loss = gateway.place_and_await("EURUSD-OTC", Direction::Put).await;
        let tie = gateway.place_and_await("EURUSD-OTC", Direction::Put).await;

        assert_eq!(loss.outcome, Outcome::Loss);
        assert_eq!(loss.profit, Decimal::from(-1));
        assert_eq!(tie.outcome, Outcome::Tie);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_order_is_error() {
        let broker = Arc::new(ScriptedBroker::new(vec![]).with_orders(vec![ScriptedOrder::Rejected]));
        let gateway = gateway(broker.clone()).await;

        let execution = gateway.place_and_await("EURUSD-OTC", Direction::Call).await;

        assert_eq!(execution.outcome, Outcome::Error);
        assert_eq!(execution.profit, Decimal::ZERO);
        assert!(execution.order_id.is_none());
        assert_eq!(broker.settlement_polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsettled_order_times_out() {
        let broker = Arc::new(ScriptedBroker::new(vec![]).with_orders(vec![ScriptedOrder::NeverSettles]));
        let gateway = gateway(broker.clone()).await;

        let execution = gateway.place_and_await("EURUSD-OTC", Direction::Call).await;

        assert_eq!(execution.outcome, Outcome::Timeout);
        assert_eq!(execution.profit, Decimal::ZERO);
        assert_eq!(execution.order_id.as_deref(), Some("order-1"));
        assert!(broker.settlement_polls() > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_before_order() {
        let broker = Arc::new(ScriptedBroker::new(vec![]));
        let gateway = gateway(broker.clone()).await;
        broker.drop_connection();

        let execution = gateway.place_and_await("EURUSD-OTC", Direction::Put).await;

        assert_eq!(broker.connect_calls(), 2);
        assert_eq!(execution.outcome, Outcome::Tie);
    }
}
