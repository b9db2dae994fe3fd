//! Clock-driven trade cycle.
//!
//! Each candle: wait for `tick_start_time`, sample prices until
//! `check_time`, analyze, optionally trade, write the ledger, cool down.

pub mod clock;

pub use clock::{Clock, MonotonicClock, SystemClock};

use crate::config::TimingConfig;
use crate::execution::{ExecutionGateway, TickBuffer};
use crate::ledger::Ledger;
use crate::models::{Decision, Outcome, PredictionVerdict, SessionTally, TradeRecord};
use crate::predictor::{ApprovalPolicy, NullPredictor, Predictor};
use crate::strategy::{AnalysisConfig, PressureAnalyzer, Strategy};
use crate::Result;
use rust_decimal::Decimal;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Collecting,
    Deciding,
    Executing,
    Skipping,
    Cooldown,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::Idle => "IDLE",
            CyclePhase::Collecting => "COLLECTING",
            CyclePhase::Deciding => "DECIDING",
            CyclePhase::Executing => "EXECUTING",
            CyclePhase::Skipping => "SKIPPING",
            CyclePhase::Cooldown => "COOLDOWN",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// The cycle reached the ledger
    Completed(Box<TradeRecord>),
    /// Shutdown requested before any order was sent
    Cancelled,
}

pub struct TradeCycleScheduler {
    asset: String,
    timing: TimingConfig,
    buffer: TickBuffer,
    strategy: Box<dyn Strategy>,
    predictor: Box<dyn Predictor>,
    policy: ApprovalPolicy,
    gateway: ExecutionGateway,
    ledger: Ledger,
    clock: Box<dyn Clock>,
    tally: SessionTally,
    phase: CyclePhase,
}

impl TradeCycleScheduler {
    pub fn new(
        asset: impl Into<String>,
        timing: TimingConfig,
        analysis: AnalysisConfig,
        gateway: ExecutionGateway,
        ledger: Ledger,
    ) -> Self {
        Self {
            asset: asset.into(),
            timing,
            buffer: TickBuffer::new(analysis.max_ticks),
            strategy: Box::new(PressureAnalyzer::new(analysis)),
            predictor: Box::new(NullPredictor),
            policy: ApprovalPolicy::default(),
            gateway,
            ledger,
            clock: Box::new(SystemClock),
            tally: SessionTally::new(),
            phase: CyclePhase::Idle,
        }
    }

    pub fn with_predictor(mut self, predictor: Box<dyn Predictor>, policy: ApprovalPolicy) -> Self {
        self.predictor = predictor;
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn tally(&self) -> &SessionTally {
        &self.tally
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    fn enter(&mut self, phase: CyclePhase) {
        tracing::debug!(asset = %self.asset, "{} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Start the stream, run cycles until shutdown, always stop the stream
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<SessionTally> {
        let broker = self.gateway.session().broker().clone();
        broker
            .start_stream(&self.asset, self.timing.candle_duration, self.buffer.capacity())
            .await?;
        tracing::info!("📡 Stream started for {}", self.asset);

        let result = loop {
            if is_cancelled(&shutdown) {
                break Ok(());
            }
            match self.run_cycle(&mut shutdown).await {
                Ok(CycleOutcome::Completed(_)) => {}
                Ok(CycleOutcome::Cancelled) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = broker
            .stop_stream(&self.asset, self.timing.candle_duration)
            .await
        {
            tracing::warn!("Failed to stop stream for {}: {}", self.asset, e);
        } else {
            tracing::info!("Stream stopped for {}", self.asset);
        }

        tracing::info!(
            "Session finished: profit {} | wins {} | losses {} | ties {}",
            self.tally.total_profit,
            self.tally.win_count,
            self.tally.loss_count,
            self.tally.tie_count
        );

        result.map(|_| self.tally.clone())
    }

    /// One full IDLE → ... → COOLDOWN pass.
    ///
    /// Cancellation is honored while idle, between samples and during
    /// cooldown. Once an order is sent the cycle runs to its ledger record.
    pub async fn run_cycle(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<CycleOutcome> {
        self.enter(CyclePhase::Idle);
        while self.clock.candle_offset(self.timing.candle_duration) != self.timing.tick_start_time {
            if pause(self.timing.idle_poll(), shutdown).await {
                return Ok(CycleOutcome::Cancelled);
            }
        }

        self.enter(CyclePhase::Collecting);
        if self.collect(shutdown).await {
            tracing::info!("Cycle abandoned during collection");
            return Ok(CycleOutcome::Cancelled);
        }

        self.enter(CyclePhase::Deciding);
        let (decision, signal) = self.strategy.analyze(self.buffer.ticks());
        let verdict = if decision.is_trade() {
            self.predictor.approve(&signal, decision)
        } else {
            PredictionVerdict::unknown()
        };
        let approval = self.policy.evaluate(&verdict);

        let mut record = TradeRecord {
            timestamp: self.clock.now(),
            asset: self.asset.clone(),
            decision,
            outcome: Outcome::NoTrade,
            profit: Decimal::ZERO,
            signal,
            verdict,
            order_id: None,
        };

        match decision.direction() {
            Some(direction) if approval.allows_trade() => {
                self.enter(CyclePhase::Executing);
                tracing::info!(asset = %self.asset, ?approval, "🎯 Trading {}", decision.label());

                let execution = self.gateway.place_and_await(&self.asset, direction).await;
                self.tally.record(execution.outcome, execution.profit);

                record.outcome = execution.outcome;
                record.profit = execution.profit;
                record.order_id = execution.order_id;
                record.timestamp = self.clock.now();

                tracing::info!(
                    asset = %self.asset,
                    "Result: {} | profit {} | total {} ({}W/{}L/{}T)",
                    record.outcome,
                    record.profit,
                    self.tally.total_profit,
                    self.tally.win_count,
                    self.tally.loss_count,
                    self.tally.tie_count
                );
            }
            Some(_) => {
                self.enter(CyclePhase::Skipping);
                tracing::info!(
                    asset = %self.asset,
                    "Vetoed {}: predicted {} (P(WIN) {:?})",
                    decision.label(),
                    record.verdict.label.as_str(),
                    record.verdict.win_probability
                );
            }
            None => {
                self.enter(CyclePhase::Skipping);
                tracing::info!(asset = %self.asset, "{}", Decision::NoTrade.label());
            }
        }

        self.ledger.append(&record).await?;

        self.enter(CyclePhase::Cooldown);
        // A shutdown here is picked up by `run` before the next cycle
        pause(self.timing.cooldown(), shutdown).await;

        Ok(CycleOutcome::Completed(Box::new(record)))
    }

    /// Sample one price per interval for the collection window.
    /// Returns true when cancelled.
    async fn collect(&mut self, shutdown: &mut watch::Receiver<bool>) -> bool {
        self.buffer.clear();

        let window_ms = self.timing.collection_secs() * 1_000;
        let samples = window_ms.div_ceil(self.timing.sample_interval_ms).max(1);
        let broker = self.gateway.session().broker().clone();

        for _ in 0..samples {
            match broker
                .latest_price(&self.asset, self.timing.candle_duration)
                .await
            {
                Ok(price) => {
                    let tick = self.buffer.append(price);
                    tracing::debug!("Tick {} ({})", tick.price, tick.color);
                }
                Err(e) => tracing::warn!("Price sample failed for {}: {}", self.asset, e),
            }

            if pause(self.timing.sample_interval(), shutdown).await {
                return true;
            }
        }

        tracing::debug!("Collected {} ticks", self.buffer.len());
        false
    }
}

fn is_cancelled(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// Sleep unless shutdown is requested first. Returns true when cancelled.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if is_cancelled(shutdown) {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => is_cancelled(shutdown),
        changed = shutdown.changed() => changed.is_err() || is_cancelled(shutdown),
    }
}
