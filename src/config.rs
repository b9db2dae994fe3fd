//! Layered runtime configuration: defaults, optional TOML file, then
//! `PRESSURE_BOT__SECTION__KEY` environment variables.

use crate::broker::AccountKind;
use crate::strategy::AnalysisConfig;
use crate::{EngineError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "pressure_bot.toml";
pub const ENV_PREFIX: &str = "PRESSURE_BOT";

/// Asset names the broker commonly lists, quoted in validation errors
const EXAMPLE_ASSETS: &str = "USDZAR-OTC, EURJPY-OTC, EURUSD-OTC";

/// Typos seen often enough to suggest the intended asset directly
const KNOWN_MISSPELLINGS: &[(&str, &str)] = &[("USZAR-OTC", "USDZAR-OTC")];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub base_url: String,
    pub email: String,
    pub password: String,
    pub requests_per_minute: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8085".to_string(),
            email: String::new(),
            password: String::new(),
            requests_per_minute: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub asset: String,
    /// `demo`, `real` or `tournament`
    pub account: String,
    pub trade_amount: Decimal,
    /// Option expiry in minutes
    pub expiration_mode: u32,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            asset: "EURUSD-OTC".to_string(),
            account: "demo".to_string(),
            trade_amount: Decimal::ONE,
            expiration_mode: 1,
        }
    }
}

impl TradingConfig {
    pub fn account_kind(&self) -> Result<AccountKind> {
        self.account.parse()
    }
}

/// Cycle timing, in seconds of the wall-clock minute unless noted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub candle_duration: u64,
    pub tick_start_time: u64,
    /// Defaults to `candle_duration - 1`
    pub check_time: Option<u64>,
    pub sample_interval_ms: u64,
    pub idle_poll_ms: u64,
    pub settlement_poll_ms: u64,
    pub settlement_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            candle_duration: 60,
            tick_start_time: 40,
            check_time: None,
            sample_interval_ms: 1_000,
            idle_poll_ms: 100,
            settlement_poll_ms: 100,
            settlement_timeout_secs: 120,
        }
    }
}

impl TimingConfig {
    pub fn check_time(&self) -> u64 {
        self.check_time
            .unwrap_or_else(|| self.candle_duration.saturating_sub(1))
    }

    /// Seconds spent sampling ticks each cycle
    pub fn collection_secs(&self) -> u64 {
        self.check_time().saturating_sub(self.tick_start_time)
    }

    /// Pause after a cycle so the next one starts in a fresh candle
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.candle_duration - self.check_time() + 1)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn settlement_poll(&self) -> Duration {
        Duration::from_millis(self.settlement_poll_ms)
    }

    pub fn settlement_timeout(&self) -> Duration {
        Duration::from_secs(self.settlement_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub model_dir: PathBuf,
    pub win_threshold: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("."),
            win_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(crate::ledger::DEFAULT_LEDGER_FILE),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub broker: BrokerConfig,
    pub trading: TradingConfig,
    pub timing: TimingConfig,
    pub analysis: AnalysisConfig,
    pub predictor: PredictorConfig,
    pub ledger: LedgerConfig,
}

impl EngineConfig {
    /// Load `.env`, then the TOML file (optional), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = path
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
        // An explicitly named file must exist
        let required = path.is_some();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&file).required(required))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;

        let config: EngineConfig = settings
            .try_deserialize()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent timing and sizing before any cycle runs
    pub fn validate(&self) -> Result<()> {
        let t = &self.timing;
        let check = t.check_time();

        if t.candle_duration == 0 {
            return Err(EngineError::Configuration(
                "candle_duration must be positive".to_string(),
            ));
        }
        if !(t.tick_start_time < check && check < t.candle_duration) {
            return Err(EngineError::Configuration(format!(
                "timing must satisfy tick_start_time < check_time < candle_duration (got {} / {} / {})",
                t.tick_start_time, check, t.candle_duration
            )));
        }
        if t.sample_interval_ms == 0 || t.idle_poll_ms == 0 || t.settlement_poll_ms == 0 {
            return Err(EngineError::Configuration(
                "poll and sample intervals must be positive".to_string(),
            ));
        }
        if t.settlement_timeout_secs == 0 {
            return Err(EngineError::Configuration(
                "settlement_timeout_secs must be positive".to_string(),
            ));
        }

        let a = &self.analysis;
        if a.analyze_window == 0 || a.analyze_window > a.max_ticks {
            return Err(EngineError::Configuration(format!(
                "analyze_window must be in 1..={} (got {})",
                a.max_ticks, a.analyze_window
            )));
        }

        if self.trading.trade_amount <= Decimal::ZERO {
            return Err(EngineError::Configuration(format!(
                "trade_amount must be positive (got {})",
                self.trading.trade_amount
            )));
        }
        if self.trading.expiration_mode == 0 {
            return Err(EngineError::Configuration(
                "expiration_mode must be at least one minute".to_string(),
            ));
        }
        let expiry_secs = u64::from(self.trading.expiration_mode) * 60;
        if t.settlement_timeout_secs <= expiry_secs {
            return Err(EngineError::Configuration(format!(
                "settlement_timeout_secs must exceed the {}s option expiry (got {})",
                expiry_secs, t.settlement_timeout_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.predictor.win_threshold) {
            return Err(EngineError::Configuration(format!(
                "win_threshold must be within 0..=1 (got {})",
                self.predictor.win_threshold
            )));
        }

        self.trading.account_kind()?;
        Ok(())
    }
}

/// Normalize `asset` and check it against the broker's instrument list.
///
/// Returns the normalized (trimmed, upper-cased) name. Errors carry
/// example assets and, for near-misses, a suggestion.
pub fn validate_asset(asset: &str, instruments: &[String]) -> Result<String> {
    let asset = asset.trim().to_uppercase();
    let known: Vec<String> = instruments.iter().map(|i| i.to_uppercase()).collect();

    if known.iter().any(|k| *k == asset) {
        return Ok(asset);
    }

    let mut message = format!(
        "Invalid asset: {}. Valid examples: {}.",
        asset, EXAMPLE_ASSETS
    );
    if let Some(suggestion) = suggest_asset(&asset, &known) {
        message.push_str(&format!(" Did you mean {}?", suggestion));
    }

    Err(EngineError::Configuration(message))
}

fn suggest_asset(asset: &str, known: &[String]) -> Option<String> {
    if let Some((_, fixed)) = KNOWN_MISSPELLINGS.iter().find(|(typo, _)| *typo == asset) {
        return Some(fixed.to_string());
    }

    known
        .iter()
        .map(|k| (edit_distance(asset, k), k))
        .filter(|(d, _)| *d <= 1)
        .min_by_key(|(d, _)| *d)
        .map(|(_, k)| k.clone())
}

/// Levenshtein distance over chars
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut curr = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        prev = curr;
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instruments() -> Vec<String> {
        ["EURUSD-OTC", "EURJPY-OTC", "USDZAR-OTC"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();

        assert_eq!(config.timing.check_time(), 59);
        assert_eq!(config.timing.collection_secs(), 19);
        assert_eq!(config.timing.cooldown(), Duration::from_secs(2));
        assert_eq!(config.analysis.max_ticks, 10);
        assert_eq!(config.analysis.analyze_window, 4);
        assert_eq!(config.trading.account_kind().unwrap(), AccountKind::Practice);
    }

    #[test]
    fn test_inconsistent_timing_rejected() {
        let mut config = EngineConfig::default();
        config.timing.tick_start_time = 59;
        assert!(matches!(config.validate(), Err(EngineError::Configuration(_))));

        let mut config = EngineConfig::default();
        config.timing.check_time = Some(60);
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.timing.check_time = Some(50);
        config.validate().unwrap();
        assert_eq!(config.timing.cooldown(), Duration::from_secs(11));
    }

    #[test]
    fn test_window_and_amount_rejected() {
        let mut config = EngineConfig::default();
        config.analysis.analyze_window = 11;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.trading.trade_amount = Decimal::ZERO;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.trading.account = "savings".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_long_candle_timing_is_valid() {
        let mut config = EngineConfig::default();
        config.timing.candle_duration = 300;
        config.timing.tick_start_time = 100;
        config.timing.check_time = Some(119);
        config.validate().unwrap();
        assert_eq!(config.timing.collection_secs(), 19);
        assert_eq!(config.timing.cooldown(), Duration::from_secs(182));
    }

    #[test]
    fn test_settlement_timeout_must_outlast_expiry() {
        let mut config = EngineConfig::default();
        config.trading.expiration_mode = 5;
        match config.validate() {
            Err(EngineError::Configuration(msg)) => assert!(msg.contains("300s")),
            other => panic!("expected configuration error, got {:?}", other),
        }

        config.timing.settlement_timeout_secs = 360;
        config.validate().unwrap();

        let mut config = EngineConfig::default();
        config.trading.expiration_mode = 2;
        config.timing.settlement_timeout_secs = 120;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!("pressure-bot-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"
[trading]
asset = "USDZAR-OTC"
account = "tournament"
trade_amount = 2.5

[timing]
tick_start_time = 30
check_time = 55

[analysis]
max_ticks = 8
analyze_window = 3
"#,
        )
        .unwrap();

        let config = EngineConfig::load(Some(&path)).unwrap();

        assert_eq!(config.trading.asset, "USDZAR-OTC");
        assert_eq!(config.trading.account_kind().unwrap(), AccountKind::Tournament);
        assert_eq!(config.trading.trade_amount, Decimal::new(25, 1));
        assert_eq!(config.timing.collection_secs(), 25);
        assert_eq!(config.analysis.analyze_window, 3);
        // Untouched sections keep their defaults
        assert_eq!(config.predictor.win_threshold, 0.6);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let path = std::env::temp_dir().join("does-not-exist-pressure-bot.toml");
        assert!(EngineConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_validate_asset_normalizes() {
        assert_eq!(
            validate_asset("  eurusd-otc ", &instruments()).unwrap(),
            "EURUSD-OTC"
        );
    }

    #[test]
    fn test_validate_asset_suggests_known_typo() {
        let err = validate_asset("uszar-otc", &instruments()).unwrap_err().to_string();
        assert!(err.contains("Invalid asset: USZAR-OTC"));
        assert!(err.contains("USDZAR-OTC, EURJPY-OTC, EURUSD-OTC"));
        assert!(err.contains("Did you mean USDZAR-OTC?"));
    }

    #[test]
    fn test_validate_asset_suggests_near_miss() {
        let err = validate_asset("EURUSD-OTX", &instruments()).unwrap_err().to_string();
        assert!(err.contains("Did you mean EURUSD-OTC?"));

        let err = validate_asset("BTCUSD", &instruments()).unwrap_err().to_string();
        assert!(!err.contains("Did you mean"));
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("abc", "abc"), 0);
        assert_eq!(edit_distance("abc", "abd"), 1);
        assert_eq!(edit_distance("", "ab"), 2);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
    }
}
