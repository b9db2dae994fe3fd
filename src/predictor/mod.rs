//! Outcome prediction for candidate trades.
//!
//! A trained classifier estimates whether a decision will win given the
//! four analyzed ticks. When no model is available the engine trades
//! ungated through [`NullPredictor`].

pub mod encoder;
pub mod forest;
pub mod training;

pub use encoder::LabelEncoder;
pub use forest::{ForestParams, RandomForest};

use crate::models::{Decision, PredictionVerdict, PressureSignal, VerdictLabel};
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CLASSIFIER_FILE: &str = "digit_classifier.json";
pub const COLOR_ENCODER_FILE: &str = "le_color.json";
pub const DECISION_ENCODER_FILE: &str = "le_decision.json";
pub const RESULT_ENCODER_FILE: &str = "le_result.json";

/// Number of ticks feeding one feature row
pub const FEATURE_TICKS: usize = 4;

/// Result class whose probability gates trades
pub const WIN_CLASS: &str = "WIN";

/// `[digit1, color1, ..., digit4, color4, decision]`
pub fn feature_row(digits: &[u8], colors: &[usize], decision: usize) -> Vec<f64> {
    let mut row = Vec::with_capacity(digits.len() * 2 + 1);
    for (&digit, &color) in digits.iter().zip(colors) {
        row.push(digit as f64);
        row.push(color as f64);
    }
    row.push(decision as f64);
    row
}

/// Classifier plus the three categorical encoders it was trained with
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub classifier: RandomForest,
    pub color: LabelEncoder,
    pub decision: LabelEncoder,
    pub result: LabelEncoder,
}

impl ModelArtifacts {
    pub fn load(dir: &Path) -> Result<Self> {
        let artifacts = Self {
            classifier: RandomForest::load(&dir.join(CLASSIFIER_FILE))?,
            color: LabelEncoder::load(&dir.join(COLOR_ENCODER_FILE))?,
            decision: LabelEncoder::load(&dir.join(DECISION_ENCODER_FILE))?,
            result: LabelEncoder::load(&dir.join(RESULT_ENCODER_FILE))?,
        };

        let expected_features = FEATURE_TICKS * 2 + 1;
        if artifacts.classifier.n_features() != expected_features
            || artifacts.classifier.n_classes() != artifacts.result.len()
        {
            return Err(EngineError::Artifact(format!(
                "classifier shape ({} features, {} classes) does not match encoders ({} features, {} results)",
                artifacts.classifier.n_features(),
                artifacts.classifier.n_classes(),
                expected_features,
                artifacts.result.len()
            )));
        }
        Ok(artifacts)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.classifier.save(&dir.join(CLASSIFIER_FILE))?;
        self.color.save(&dir.join(COLOR_ENCODER_FILE))?;
        self.decision.save(&dir.join(DECISION_ENCODER_FILE))?;
        self.result.save(&dir.join(RESULT_ENCODER_FILE))?;
        Ok(())
    }
}

/// Predicts the result class of a candidate trade
pub trait Predictor: Send + Sync {
    fn predict(&self, signal: &PressureSignal, decision: Decision) -> Result<PredictionVerdict>;

    fn name(&self) -> &str;

    /// Like `predict`, but any failure degrades to an UNKNOWN verdict
    fn approve(&self, signal: &PressureSignal, decision: Decision) -> PredictionVerdict {
        match self.predict(signal, decision) {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!("Prediction failed ({}), trading without AI gating: {}", self.name(), e);
                PredictionVerdict::unknown()
            }
        }
    }
}

/// Used when no trained model is available
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPredictor;

impl Predictor for NullPredictor {
    fn predict(&self, _signal: &PressureSignal, _decision: Decision) -> Result<PredictionVerdict> {
        Ok(PredictionVerdict::unknown())
    }

    fn name(&self) -> &str {
        "null"
    }
}

pub struct TrainedPredictor {
    artifacts: ModelArtifacts,
}

impl TrainedPredictor {
    pub fn new(artifacts: ModelArtifacts) -> Self {
        Self { artifacts }
    }

    fn encode(&self, signal: &PressureSignal, decision: Decision) -> Result<Vec<f64>> {
        if signal.observations.len() != FEATURE_TICKS {
            return Err(EngineError::Encoding {
                encoder: "features".to_string(),
                value: format!("{} observations", signal.observations.len()),
            });
        }

        let digits: Vec<u8> = signal.observations.iter().map(|o| o.digit).collect();
        let colors = signal
            .observations
            .iter()
            .map(|o| self.artifacts.color.transform(o.color.label()))
            .collect::<Result<Vec<_>>>()?;
        let decision = self.artifacts.decision.transform(decision.label())?;

        Ok(feature_row(&digits, &colors, decision))
    }
}

impl Predictor for TrainedPredictor {
    fn predict(&self, signal: &PressureSignal, decision: Decision) -> Result<PredictionVerdict> {
        let row = self.encode(signal, decision)?;
        let classifier = &self.artifacts.classifier;

        let predicted = classifier.predict(&row)?;
        let proba = classifier.predict_proba(&row)?;
        let label = self.artifacts.result.inverse_transform(predicted)?;

        let win_index = self.artifacts.result.transform(WIN_CLASS)?;
        let win_probability = proba.get(win_index).copied().ok_or_else(|| {
            EngineError::Artifact("classifier and result encoder disagree on classes".to_string())
        })?;

        tracing::info!(
            "AI prediction: {} (P(WIN) = {:.2})",
            label,
            win_probability
        );

        Ok(PredictionVerdict {
            label: VerdictLabel::from_class(label),
            win_probability: Some(win_probability),
        })
    }

    fn name(&self) -> &str {
        "random-forest"
    }
}

/// Load the model from `dir`, falling back to [`NullPredictor`] when any
/// artifact is missing or unreadable
pub fn load_predictor(dir: &Path) -> Box<dyn Predictor> {
    match ModelArtifacts::load(dir) {
        Ok(artifacts) => {
            tracing::info!("Loaded prediction model from {}", dir.display());
            Box::new(TrainedPredictor::new(artifacts))
        }
        Err(e) => {
            tracing::warn!("No usable prediction model in {} ({}), AI gating disabled", dir.display(), e);
            Box::new(NullPredictor)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    /// No verdict available; trade proceeds
    Ungated,
    Approved,
    Vetoed,
}

impl Approval {
    pub fn allows_trade(&self) -> bool {
        !matches!(self, Approval::Vetoed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    pub win_threshold: f64,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self { win_threshold: 0.6 }
    }
}

impl ApprovalPolicy {
    pub fn new(win_threshold: f64) -> Self {
        Self { win_threshold }
    }

    pub fn evaluate(&self, verdict: &PredictionVerdict) -> Approval {
        if verdict.is_unknown() {
            return Approval::Ungated;
        }
        match (verdict.label, verdict.win_probability) {
            (VerdictLabel::Win, Some(p)) if p >= self.win_threshold => Approval::Approved,
            _ => Approval::Vetoed,
        }
    }
}
