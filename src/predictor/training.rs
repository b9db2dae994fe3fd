//! Offline training of the outcome classifier from ledger history.

use super::{feature_row, ForestParams, LabelEncoder, ModelArtifacts, RandomForest, FEATURE_TICKS};
use crate::ledger::LedgerEntry;
use crate::models::Outcome;
use crate::{EngineError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Smallest dataset that still leaves five folds on the training split
pub const MIN_SAMPLES: usize = 10;
pub const CV_FOLDS: usize = 5;
pub const TEST_FRACTION: f64 = 0.2;
pub const SEED: u64 = 42;

/// One settled cycle, still in string form
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub digits: Vec<u8>,
    pub colors: Vec<String>,
    pub decision: String,
    pub result: String,
}

/// Keep settled WIN/LOSS/TIE cycles with a full tick window
pub fn rows_from_entries(entries: &[LedgerEntry]) -> Vec<TrainingRow> {
    entries
        .iter()
        .filter(|e| matches!(e.outcome, Outcome::Win | Outcome::Loss | Outcome::Tie))
        .filter(|e| e.ticks.len() >= FEATURE_TICKS)
        .map(|e| {
            let ticks = &e.ticks[..FEATURE_TICKS];
            TrainingRow {
                digits: ticks.iter().map(|t| t.digit).collect(),
                colors: ticks.iter().map(|t| t.color.clone()).collect(),
                decision: e.decision.clone(),
                result: e.outcome.ledger_label().to_string(),
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct EncodedDataset {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
    pub color: LabelEncoder,
    pub decision: LabelEncoder,
    pub result: LabelEncoder,
}

/// Fit the encoders and build the feature matrix.
/// The color encoder sees all four color columns.
pub fn encode_rows(rows: &[TrainingRow]) -> Result<EncodedDataset> {
    let color = LabelEncoder::fit("color", rows.iter().flat_map(|r| r.colors.iter()));
    let decision = LabelEncoder::fit("decision", rows.iter().map(|r| &r.decision));
    let result = LabelEncoder::fit("result", rows.iter().map(|r| &r.result));

    let mut features = Vec::with_capacity(rows.len());
    let mut labels = Vec::with_capacity(rows.len());

    for row in rows {
        let colors = row
            .colors
            .iter()
            .map(|c| color.transform(c))
            .collect::<Result<Vec<_>>>()?;
        features.push(feature_row(&row.digits, &colors, decision.transform(&row.decision)?));
        labels.push(result.transform(&row.result)?);
    }

    Ok(EncodedDataset {
        features,
        labels,
        color,
        decision,
        result,
    })
}

/// Shuffled (train, test) index split
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));

    let n_test = ((n as f64) * test_fraction).ceil() as usize;
    let train = indices.split_off(n_test.min(n));
    (train, indices)
}

/// Contiguous k-fold boundaries; the first `n % k` folds get one extra sample
fn fold_ranges(n: usize, folds: usize) -> Vec<std::ops::Range<usize>> {
    let base = n / folds;
    let extra = n % folds;
    let mut start = 0;
    (0..folds)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

fn select<T: Clone>(items: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| items[i].clone()).collect()
}

/// Accuracy of `params` on each held-out fold
pub fn cross_val_score(
    features: &[Vec<f64>],
    labels: &[usize],
    n_classes: usize,
    params: ForestParams,
    folds: usize,
) -> Result<Vec<f64>> {
    let n = features.len();
    if folds < 2 || n < folds {
        return Err(EngineError::Training(format!(
            "cannot run {}-fold cross-validation on {} samples",
            folds, n
        )));
    }

    let mut scores = Vec::with_capacity(folds);
    for range in fold_ranges(n, folds) {
        let train: Vec<usize> = (0..n).filter(|i| !range.contains(i)).collect();
        let test: Vec<usize> = range.collect();

        let model = RandomForest::fit(
            &select(features, &train),
            &select(labels, &train),
            n_classes,
            params,
        )?;
        scores.push(model.accuracy(&select(features, &test), &select(labels, &test))?);
    }

    Ok(scores)
}

/// `n_estimators × max_depth × min_samples_split`
pub fn param_grid() -> Vec<ForestParams> {
    let mut grid = Vec::new();
    for n_estimators in [50, 100, 200] {
        for max_depth in [None, Some(10), Some(20)] {
            for min_samples_split in [2, 5, 10] {
                grid.push(ForestParams {
                    n_estimators,
                    max_depth,
                    min_samples_split,
                    seed: SEED,
                });
            }
        }
    }
    grid
}

/// Best params by mean CV accuracy; the first candidate wins ties
pub fn grid_search(
    features: &[Vec<f64>],
    labels: &[usize],
    n_classes: usize,
    grid: &[ForestParams],
    folds: usize,
) -> Result<(ForestParams, f64)> {
    let mut best: Option<(ForestParams, f64)> = None;

    for &params in grid {
        let scores = cross_val_score(features, labels, n_classes, params, folds)?;
        let score = mean(&scores);
        tracing::debug!(?params, score, "Grid candidate scored");

        if best.map_or(true, |(_, s)| score > s) {
            best = Some((params, score));
        }
    }

    best.ok_or_else(|| EngineError::Training("empty parameter grid".to_string()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassMetrics {
    pub class: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class precision/recall/F1 (zero when undefined)
pub fn classification_report(truth: &[usize], predicted: &[usize], classes: &[String]) -> Vec<ClassMetrics> {
    classes
        .iter()
        .enumerate()
        .map(|(class, name)| {
            let tp = truth
                .iter()
                .zip(predicted)
                .filter(|&(&t, &p)| t == class && p == class)
                .count();
            let predicted_pos = predicted.iter().filter(|&&p| p == class).count();
            let support = truth.iter().filter(|&&t| t == class).count();

            let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
            let precision = ratio(tp, predicted_pos);
            let recall = ratio(tp, support);
            let f1 = if precision + recall == 0.0 {
                0.0
            } else {
                2.0 * precision * recall / (precision + recall)
            };

            ClassMetrics {
                class: name.clone(),
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub samples: usize,
    pub cv_scores: Vec<f64>,
    pub best_params: ForestParams,
    pub best_cv_score: f64,
    pub test_accuracy: f64,
    pub class_metrics: Vec<ClassMetrics>,
}

impl TrainingReport {
    pub fn cv_mean(&self) -> f64 {
        mean(&self.cv_scores)
    }

    /// Population standard deviation of the CV scores
    pub fn cv_std(&self) -> f64 {
        std_dev(&self.cv_scores)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Full pipeline: encode, cross-validate the default model, grid-search on
/// the training split, evaluate the winner on the test split.
pub fn train(rows: &[TrainingRow], grid: &[ForestParams]) -> Result<(ModelArtifacts, TrainingReport)> {
    if rows.len() < MIN_SAMPLES {
        return Err(EngineError::Training(format!(
            "need at least {} settled cycles, found {}",
            MIN_SAMPLES,
            rows.len()
        )));
    }

    let data = encode_rows(rows)?;
    let n_classes = data.result.len();

    let cv_scores = cross_val_score(
        &data.features,
        &data.labels,
        n_classes,
        ForestParams::default(),
        CV_FOLDS,
    )?;
    tracing::info!(
        "Cross-validation accuracy: {:.2} (+/- {:.2})",
        mean(&cv_scores),
        std_dev(&cv_scores) * 2.0
    );

    let (train_idx, test_idx) = train_test_split(rows.len(), TEST_FRACTION, SEED);
    let x_train = select(&data.features, &train_idx);
    let y_train = select(&data.labels, &train_idx);
    let x_test = select(&data.features, &test_idx);
    let y_test = select(&data.labels, &test_idx);

    let (best_params, best_cv_score) = grid_search(&x_train, &y_train, n_classes, grid, CV_FOLDS)?;
    tracing::info!(?best_params, "Best parameters (CV accuracy {:.2})", best_cv_score);

    let classifier = RandomForest::fit(&x_train, &y_train, n_classes, best_params)?;

    let predicted = x_test
        .iter()
        .map(|row| classifier.predict(row))
        .collect::<Result<Vec<_>>>()?;
    let test_accuracy = classifier.accuracy(&x_test, &y_test)?;
    let class_metrics = classification_report(&y_test, &predicted, data.result.classes());

    let report = TrainingReport {
        samples: rows.len(),
        cv_scores,
        best_params,
        best_cv_score,
        test_accuracy,
        class_metrics,
    };

    let artifacts = ModelArtifacts {
        classifier,
        color: data.color,
        decision: data.decision,
        result: data.result,
    };

    Ok((artifacts, report))
}

fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len().max(1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::parse_line;

    fn row(digits: [u8; 4], decision: &str, result: &str) -> TrainingRow {
        TrainingRow {
            digits: digits.to_vec(),
            colors: vec!["blue".into(), "red".into(), "blue".into(), "blue".into()],
            decision: decision.to_string(),
            result: result.to_string(),
        }
    }

    fn rows() -> Vec<TrainingRow> {
        (0..20u8)
            .map(|i| {
                let d = i % 10;
                if i % 2 == 0 {
                    row([d, 3, d, 1], "CALL (UP)", "WIN")
                } else {
                    row([d, 3, d, 1], "PUT (DOWN)", "LOSS")
                }
            })
            .collect()
    }

    #[test]
    fn test_rows_keep_only_settled_full_windows() {
        let lines = [
            "t | Resultado: WIN | Análisis: [Tick 1: Dígito=3 (blue); Tick 2: Dígito=3 (blue); Tick 3: Dígito=3 (red); Tick 4: Dígito=3 (blue)] | Decisión: CALL (UP)",
            "t | Resultado: EMPATE | Análisis: [Tick 1: Dígito=1 (red); Tick 2: Dígito=2 (red); Tick 3: Dígito=3 (red); Tick 4: Dígito=4 (red)] | Decisión: PUT (DOWN)",
            "t | Resultado: NONE | Análisis: [] | Decisión: No se realiza operación",
            "t | Resultado: ERROR | Análisis: [Tick 1: Dígito=3 (blue); Tick 2: Dígito=3 (blue); Tick 3: Dígito=3 (red); Tick 4: Dígito=3 (blue)] | Decisión: CALL (UP)",
            "t | Resultado: LOSS | Análisis: [Tick 1: Dígito=3 (blue)] | Decisión: CALL (UP)",
        ];
        let entries: Vec<_> = lines.iter().filter_map(|l| parse_line(l)).collect();

        let rows = rows_from_entries(&entries);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].digits, vec![3, 3, 3, 3]);
        assert_eq!(rows[0].colors[2], "red");
        assert_eq!(rows[1].result, "EMPATE");
        assert_eq!(rows[1].decision, "PUT (DOWN)");
    }

    #[test]
    fn test_encode_rows() {
        let mut rows = rows();
        rows[0].colors[3] = "red".to_string();
        let data = encode_rows(&rows).unwrap();

        assert_eq!(data.color.classes(), &["blue", "red"]);
        assert_eq!(data.decision.classes(), &["CALL (UP)", "PUT (DOWN)"]);
        assert_eq!(data.result.classes(), &["LOSS", "WIN"]);
        assert_eq!(data.features[0], vec![0.0, 0.0, 3.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0]);
        assert_eq!(data.labels[0], 1);
        assert_eq!(data.labels[1], 0);
    }

    #[test]
    fn test_train_test_split_partitions() {
        let (train, test) = train_test_split(10, 0.2, 42);
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);

        let mut all: Vec<usize> = train.iter().chain(&test).copied().collect();
        all.sort();
        assert_eq!(all, (0..10).collect::<Vec<_>>());

        assert_eq!(train_test_split(10, 0.2, 42), (train, test));
    }

    #[test]
    fn test_fold_ranges_cover_everything() {
        let ranges = fold_ranges(12, 5);
        assert_eq!(ranges, vec![0..3, 3..6, 6..8, 8..10, 10..12]);
    }

    #[test]
    fn test_cross_val_needs_enough_samples() {
        let features = vec![vec![1.0]; 3];
        let labels = vec![0; 3];
        assert!(cross_val_score(&features, &labels, 1, ForestParams::default(), 5).is_err());
    }

    #[test]
    fn test_classification_report() {
        let classes = vec!["LOSS".to_string(), "WIN".to_string()];
        let report = classification_report(&[1, 1, 0, 0], &[1, 0, 0, 0], &classes);

        assert_eq!(report[1].class, "WIN");
        assert_eq!(report[1].precision, 1.0);
        assert_eq!(report[1].recall, 0.5);
        assert!((report[1].f1 - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(report[0].support, 2);
        assert!((report[0].precision - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_param_grid_has_27_candidates() {
        let grid = param_grid();
        assert_eq!(grid.len(), 27);
        assert!(grid.iter().all(|p| p.seed == SEED));
    }

    #[test]
    fn test_train_on_separable_history() {
        let grid = [
            ForestParams {
                n_estimators: 10,
                ..Default::default()
            },
            ForestParams {
                n_estimators: 10,
                max_depth: Some(1),
                ..Default::default()
            },
        ];

        let (artifacts, report) = train(&rows(), &grid).unwrap();

        assert_eq!(report.samples, 20);
        assert_eq!(report.cv_scores.len(), CV_FOLDS);
        assert!(report.test_accuracy >= 0.5);
        assert!((0.0..=1.0).contains(&report.best_cv_score));
        assert_eq!(report.class_metrics.len(), 2);
        assert_eq!(artifacts.result.classes(), &["LOSS", "WIN"]);
    }

    #[test]
    fn test_train_rejects_tiny_history() {
        let rows = rows();
        assert!(matches!(
            train(&rows[..5], &param_grid()),
            Err(EngineError::Training(_))
        ));
    }
}
