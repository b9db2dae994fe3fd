//! Random forest classifier (CART trees, Gini impurity, bootstrap samples,
//! √features tried per split).

use crate::{EngineError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// `None` grows trees until leaves are pure
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn distribution(&self, row: &[f64]) -> &[f64] {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Check a deserialized node against the forest's shape
    fn check(&self, n_features: usize, n_classes: usize) -> Result<()> {
        match self {
            Node::Leaf { distribution } if distribution.len() != n_classes => {
                Err(EngineError::Artifact(format!(
                    "leaf has {} classes, expected {}",
                    distribution.len(),
                    n_classes
                )))
            }
            Node::Leaf { .. } => Ok(()),
            Node::Split { feature, .. } if *feature >= n_features => Err(EngineError::Artifact(
                format!("split on feature {} of {}", feature, n_features),
            )),
            Node::Split { left, right, .. } => {
                left.check(n_features, n_classes)?;
                right.check(n_features, n_classes)
            }
        }
    }

    fn leaf(counts: &[usize], n: usize) -> Self {
        let total = n.max(1) as f64;
        Node::Leaf {
            distribution: counts.iter().map(|&c| c as f64 / total).collect(),
        }
    }
}

fn gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

struct TreeBuilder<'a> {
    features: &'a [Vec<f64>],
    labels: &'a [usize],
    n_classes: usize,
    max_features: usize,
    params: &'a ForestParams,
    rng: &'a mut StdRng,
}

impl TreeBuilder<'_> {
    fn class_counts(&self, samples: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &i in samples {
            counts[self.labels[i]] += 1;
        }
        counts
    }

    fn build(&mut self, samples: &[usize], depth: usize) -> Node {
        let n = samples.len();
        let counts = self.class_counts(samples);

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        if pure || depth_reached || n < self.params.min_samples_split {
            return Node::leaf(&counts, n);
        }

        let Some((feature, threshold)) = self.best_split(samples, &counts) else {
            return Node::leaf(&counts, n);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&i| self.features[i][feature] <= threshold);
        if left.is_empty() || right.is_empty() {
            return Node::leaf(&counts, n);
        }

        Node::Split {
            feature,
            threshold,
            left: Box::new(self.build(&left, depth + 1)),
            right: Box::new(self.build(&right, depth + 1)),
        }
    }

    /// Best impurity-lowering (feature, threshold). At least `max_features`
    /// random features are tried; more are drawn while no split helps.
    fn best_split(&mut self, samples: &[usize], parent_counts: &[usize]) -> Option<(usize, f64)> {
        let n = samples.len();
        let n_features = self.features[samples[0]].len();

        let mut candidates: Vec<usize> = (0..n_features).collect();
        candidates.shuffle(&mut *self.rng);

        let mut best: Option<(usize, f64)> = None;
        let mut best_impurity = gini(parent_counts, n);

        for (visited, &feature) in candidates.iter().enumerate() {
            if visited >= self.max_features && best.is_some() {
                break;
            }

            let mut sorted: Vec<(f64, usize)> = samples
                .iter()
                .map(|&i| (self.features[i][feature], self.labels[i]))
                .collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left = vec![0usize; self.n_classes];
            let mut right = parent_counts.to_vec();

            for k in 0..sorted.len().saturating_sub(1) {
                let (value, label) = sorted[k];
                left[label] += 1;
                right[label] -= 1;

                let next = sorted[k + 1].0;
                if next <= value {
                    continue;
                }

                let n_left = k + 1;
                let n_right = n - n_left;
                let impurity = (n_left as f64 * gini(&left, n_left)
                    + n_right as f64 * gini(&right, n_right))
                    / n as f64;

                if impurity < best_impurity {
                    best_impurity = impurity;
                    best = Some((feature, (value + next) / 2.0));
                }
            }
        }

        best
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_classes: usize,
    n_features: usize,
    trees: Vec<Node>,
}

impl RandomForest {
    pub fn fit(
        features: &[Vec<f64>],
        labels: &[usize],
        n_classes: usize,
        params: ForestParams,
    ) -> Result<Self> {
        if features.is_empty() {
            return Err(EngineError::Training("no training samples".to_string()));
        }
        if features.len() != labels.len() {
            return Err(EngineError::Training(format!(
                "{} feature rows but {} labels",
                features.len(),
                labels.len()
            )));
        }
        if params.n_estimators == 0 {
            return Err(EngineError::Training("n_estimators must be positive".to_string()));
        }

        let n_features = features[0].len();
        if n_features == 0 || features.iter().any(|row| row.len() != n_features) {
            return Err(EngineError::Training("inconsistent feature rows".to_string()));
        }
        if labels.iter().any(|&l| l >= n_classes) {
            return Err(EngineError::Training(format!(
                "label outside 0..{}",
                n_classes
            )));
        }

        let n = features.len();
        let max_features = ((n_features as f64).sqrt() as usize).max(1);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let mut builder = TreeBuilder {
                features,
                labels,
                n_classes,
                max_features,
                params: &params,
                rng: &mut rng,
            };
            trees.push(builder.build(&bootstrap, 0));
        }

        Ok(Self {
            params,
            n_classes,
            n_features,
            trees,
        })
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Mean of the per-tree leaf class distributions
    pub fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.n_features {
            return Err(EngineError::Artifact(format!(
                "classifier expects {} features, got {}",
                self.n_features,
                row.len()
            )));
        }

        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, d) in proba.iter_mut().zip(tree.distribution(row)) {
                *p += d;
            }
        }

        let trees = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= trees);
        Ok(proba)
    }

    /// Most probable class (lowest index on ties)
    pub fn predict(&self, row: &[f64]) -> Result<usize> {
        let proba = self.predict_proba(row)?;
        let mut best = 0;
        for (i, &p) in proba.iter().enumerate() {
            if p > proba[best] {
                best = i;
            }
        }
        Ok(best)
    }

    pub fn accuracy(&self, features: &[Vec<f64>], labels: &[usize]) -> Result<f64> {
        if features.is_empty() {
            return Ok(0.0);
        }
        let mut correct = 0usize;
        for (row, &label) in features.iter().zip(labels) {
            if self.predict(row)? == label {
                correct += 1;
            }
        }
        Ok(correct as f64 / features.len() as f64)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Artifact(format!("{}: {}", path.display(), e)))?;
        let forest: Self = serde_json::from_str(&json)?;

        if forest.trees.is_empty() || forest.n_classes == 0 || forest.n_features == 0 {
            return Err(EngineError::Artifact(format!(
                "{}: empty classifier ({} trees, {} classes, {} features)",
                path.display(),
                forest.trees.len(),
                forest.n_classes,
                forest.n_features
            )));
        }
        for tree in &forest.trees {
            tree.check(forest.n_features, forest.n_classes)?;
        }
        Ok(forest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Class is 1 when the first feature is above 5, regardless of the noise feature
    fn threshold_dataset() -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for x in 0..10 {
            for noise in 0..4 {
                features.push(vec![x as f64, noise as f64]);
                labels.push(usize::from(x > 5));
            }
        }
        (features, labels)
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini(&[5, 0], 5), 0.0);
        assert!((gini(&[5, 5], 10) - 0.5).abs() < 1e-12);
        assert_eq!(gini(&[0, 0], 0), 0.0);
    }

    #[test]
    fn test_learns_threshold() {
        let (features, labels) = threshold_dataset();
        let forest = RandomForest::fit(&features, &labels, 2, ForestParams::default()).unwrap();

        assert_eq!(forest.predict(&[1.0, 2.0]).unwrap(), 0);
        assert_eq!(forest.predict(&[9.0, 0.0]).unwrap(), 1);
        assert!(forest.accuracy(&features, &labels).unwrap() > 0.95);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (features, labels) = threshold_dataset();
        let forest = RandomForest::fit(
            &features,
            &labels,
            2,
            ForestParams {
                n_estimators: 10,
                max_depth: Some(1),
                ..Default::default()
            },
        )
        .unwrap();

        let proba = forest.predict_proba(&[5.5, 1.0]).unwrap();
        assert_eq!(proba.len(), 2);
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_seed_same_model() {
        let (features, labels) = threshold_dataset();
        let params = ForestParams {
            n_estimators: 15,
            ..Default::default()
        };
        let a = RandomForest::fit(&features, &labels, 2, params).unwrap();
        let b = RandomForest::fit(&features, &labels, 2, params).unwrap();

        for row in &features {
            assert_eq!(a.predict_proba(row).unwrap(), b.predict_proba(row).unwrap());
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(RandomForest::fit(&[], &[], 2, ForestParams::default()).is_err());
        assert!(RandomForest::fit(&[vec![1.0]], &[0, 1], 2, ForestParams::default()).is_err());
        assert!(RandomForest::fit(&[vec![1.0]], &[3], 2, ForestParams::default()).is_err());

        let forest = RandomForest::fit(&[vec![1.0, 2.0]], &[0], 1, ForestParams::default()).unwrap();
        assert!(forest.predict_proba(&[1.0]).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let (features, labels) = threshold_dataset();
        let forest = RandomForest::fit(
            &features,
            &labels,
            2,
            ForestParams {
                n_estimators: 5,
                ..Default::default()
            },
        )
        .unwrap();
        let path = std::env::temp_dir().join(format!("forest-{}.json", uuid::Uuid::new_v4()));

        forest.save(&path).unwrap();
        let loaded = RandomForest::load(&path).unwrap();

        assert_eq!(loaded.params(), forest.params());
        let before = forest.predict_proba(&[7.0, 1.0]).unwrap();
        let after = loaded.predict_proba(&[7.0, 1.0]).unwrap();
        for (a, b) in before.iter().zip(&after) {
            assert!((a - b).abs() < 1e-12);
        }
        let _ = std::fs::remove_file(path);
    }

    fn retarget_root_split(node: &mut Node, bad_feature: usize) -> bool {
        match node {
            Node::Leaf { .. } => false,
            Node::Split { feature, .. } => {
                *feature = bad_feature;
                true
            }
        }
    }

    #[test]
    fn test_load_rejects_malformed_artifacts() {
        let (features, labels) = threshold_dataset();
        let params = ForestParams {
            n_estimators: 5,
            ..Default::default()
        };
        let path = std::env::temp_dir().join(format!("forest-{}.json", uuid::Uuid::new_v4()));

        let mut forest = RandomForest::fit(&features, &labels, 2, params).unwrap();
        let tampered = forest
            .trees
            .iter_mut()
            .any(|tree| retarget_root_split(tree, 99));
        assert!(tampered);
        forest.save(&path).unwrap();
        assert!(matches!(RandomForest::load(&path), Err(EngineError::Artifact(_))));

        let mut forest = RandomForest::fit(&features, &labels, 2, params).unwrap();
        forest.trees.clear();
        forest.save(&path).unwrap();
        assert!(matches!(RandomForest::load(&path), Err(EngineError::Artifact(_))));

        let _ = std::fs::remove_file(path);
    }
}
