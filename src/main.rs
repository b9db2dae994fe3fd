use anyhow::{bail, Context};
use clap::Parser;
use pressure_bot::broker::{Broker, BrokerSession, HttpBroker, PaperBroker};
use pressure_bot::config::{validate_asset, EngineConfig};
use pressure_bot::execution::ExecutionGateway;
use pressure_bot::ledger::Ledger;
use pressure_bot::predictor::{load_predictor, ApprovalPolicy};
use pressure_bot::scheduler::TradeCycleScheduler;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Instruments the paper broker offers
const PAPER_INSTRUMENTS: &[&str] = &["EURUSD-OTC", "EURJPY-OTC", "USDZAR-OTC", "GBPUSD-OTC"];

#[derive(Parser, Debug)]
#[command(name = "pressure-bot", about = "Tick-pressure binary options bot")]
struct Cli {
    /// Configuration file (defaults to ./pressure_bot.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Asset to trade, e.g. EURUSD-OTC
    #[arg(long)]
    asset: Option<String>,

    /// demo, real or tournament
    #[arg(long)]
    account: Option<String>,

    /// Trade amount per order
    #[arg(long)]
    amount: Option<Decimal>,

    /// Use the simulated broker instead of the HTTP bridge
    #[arg(long)]
    paper: bool,

    /// Seed for the paper broker price walk
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();
    let cli = Cli::parse();

    let mut config = EngineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(asset) = cli.asset {
        config.trading.asset = asset;
    }
    if let Some(account) = cli.account {
        config.trading.account = account;
    }
    if let Some(amount) = cli.amount {
        config.trading.trade_amount = amount;
    }
    config.validate()?;

    let account = config.trading.account_kind()?;

    tracing::info!("🚀 Pressure bot starting");
    tracing::info!("  Account: {}", account);
    tracing::info!("  Amount: {}", config.trading.trade_amount);
    tracing::info!("  Expiration: {} min", config.trading.expiration_mode);
    tracing::info!(
        "  Window: {}s..{}s of each {}s candle",
        config.timing.tick_start_time,
        config.timing.check_time(),
        config.timing.candle_duration
    );

    let broker = create_broker(&config, cli.paper, cli.seed)?;
    let session = BrokerSession::new(broker.clone(), account);
    session.open().await.context("connecting to broker")?;

    let instruments = broker.instruments().await.context("fetching instruments")?;
    let asset = validate_asset(&config.trading.asset, &instruments)?;
    tracing::info!("✅ Trading {}", asset);

    let predictor = load_predictor(&config.predictor.model_dir);
    let policy = ApprovalPolicy::new(config.predictor.win_threshold);

    let gateway = ExecutionGateway::new(
        session,
        config.trading.trade_amount,
        config.trading.expiration_mode,
        config.timing.settlement_poll(),
        config.timing.settlement_timeout(),
    );

    let mut scheduler = TradeCycleScheduler::new(
        asset,
        config.timing.clone(),
        config.analysis.clone(),
        gateway,
        Ledger::new(&config.ledger.path),
    )
    .with_predictor(predictor, policy);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("⚠️  Received Ctrl+C, finishing current step...");
            let _ = shutdown_tx.send(true);
        }
    });

    tracing::info!("Press Ctrl+C to stop...");
    let tally = scheduler.run(shutdown_rx).await?;

    tracing::info!(
        "👋 Stopped. Total profit {} over {} trades (win rate {:.1}%)",
        tally.total_profit,
        tally.trades(),
        tally.win_rate()
    );
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pressure_bot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn create_broker(config: &EngineConfig, paper: bool, seed: Option<u64>) -> anyhow::Result<Arc<dyn Broker>> {
    if paper {
        let seed = seed.unwrap_or_else(rand::random);
        tracing::info!("📝 Paper trading (seed {})", seed);
        let instruments = PAPER_INSTRUMENTS.iter().map(|s| s.to_string()).collect();
        return Ok(Arc::new(PaperBroker::new(seed, instruments)));
    }

    let b = &config.broker;
    if b.email.is_empty() || b.password.is_empty() {
        bail!("broker.email and broker.password are required (or run with --paper)");
    }

    let broker = HttpBroker::new(&b.base_url, &b.email, &b.password, b.requests_per_minute)
        .context("creating broker client")?;
    Ok(Arc::new(broker))
}
