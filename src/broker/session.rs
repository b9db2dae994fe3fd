use super::{AccountKind, Broker};
use crate::{EngineError, Result};
use std::sync::Arc;

/// Connected broker plus the account orders are charged to
///
/// Handles the initial login and transparent reconnects before orders.
#[derive(Clone)]
pub struct BrokerSession {
    broker: Arc<dyn Broker>,
    account: AccountKind,
}

impl BrokerSession {
    pub fn new(broker: Arc<dyn Broker>, account: AccountKind) -> Self {
        Self { broker, account }
    }

    /// Connect and select the account. Failure is fatal for the run.
    pub async fn open(&self) -> Result<()> {
        let status = self.broker.connect().await?;
        if !status.ok {
            let reason = status.reason.unwrap_or_else(|| "unknown reason".to_string());
            tracing::error!("Connection failed: {}", reason);
            return Err(EngineError::Connectivity(reason));
        }

        tracing::info!("Connected to broker");
        self.broker.select_account(self.account).await?;
        tracing::info!("Account selected: {}", self.account);
        Ok(())
    }

    /// Reconnect if the session dropped
    pub async fn ensure_connected(&self) -> Result<()> {
        // A failed status probe is treated like a dropped session
        let connected = match self.broker.is_connected().await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::warn!("Connection check failed: {}", e);
                false
            }
        };
        if connected {
            return Ok(());
        }

        tracing::info!("Trying to reconnect...");
        let status = self
            .broker
            .connect()
            .await
            .map_err(|e| EngineError::Connectivity(e.to_string()))?;

        if !status.ok {
            let reason = status.reason.unwrap_or_else(|| "unknown reason".to_string());
            tracing::error!("Reconnect failed: {}", reason);
            return Err(EngineError::Connectivity(reason));
        }

        self.broker.select_account(self.account).await?;
        tracing::info!("Reconnected, account re-selected: {}", self.account);
        Ok(())
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn account(&self) -> AccountKind {
        self.account
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::ScriptedBroker;

    #[tokio::test]
    async fn test_open_selects_account() {
        let broker = Arc::new(ScriptedBroker::new(vec![]));
        let session = BrokerSession::new(broker.clone(), AccountKind::Tournament);

        session.open().await.unwrap();

        assert_eq!(broker.selected_account(), Some(AccountKind::Tournament));
        assert_eq!(broker.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_open_fails_when_login_rejected() {
        let broker = Arc::new(ScriptedBroker::new(vec![]).rejecting_logins("invalid credentials"));
        let session = BrokerSession::new(broker.clone(), AccountKind::Practice);

        let err = session.open().await.unwrap_err();

        assert!(matches!(err, EngineError::Connectivity(ref r) if r == "invalid credentials"));
        assert_eq!(broker.selected_account(), None);
    }

    #[tokio::test]
    async fn test_ensure_connected_is_noop_when_connected() {
        let broker = Arc::new(ScriptedBroker::new(vec![]));
        let session = BrokerSession::new(broker.clone(), AccountKind::Practice);
        session.open().await.unwrap();

        session.ensure_connected().await.unwrap();

        assert_eq!(broker.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_ensure_connected_reconnects_dropped_session() {
        let broker = Arc::new(ScriptedBroker::new(vec![]));
        let session = BrokerSession::new(broker.clone(), AccountKind::Real);
        session.open().await.unwrap();
        broker.drop_connection();

        session.ensure_connected().await.unwrap();

        assert_eq!(broker.connect_calls(), 2);
        assert_eq!(broker.selected_account(), Some(AccountKind::Real));
    }
}
