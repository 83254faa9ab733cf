//! Tabular classifiers restored from serialized artifacts
//!
//! A `pickle`-format artifact is a bincode encoding of [`TabularModel`]. The
//! enum is closed, so decoding an artifact can only ever build one of the
//! variants below; it never runs code carried by the artifact.

use bincode::Options;
use digitd_core::{ServeError, ServeResult};
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::traits::TabularPredictor;
use crate::{FEATURE_COUNT, NUM_CLASSES};

/// Upper bound on a decoded tabular artifact
const MAX_ARTIFACT_BYTES: u64 = 256 * 1024 * 1024;

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(MAX_ARTIFACT_BYTES)
}

/// Serialized classifier object graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TabularModel {
    DummyClassifier(DummyClassifier),
    LogisticRegression(LogisticRegression),
    NearestCentroid(NearestCentroid),
}

impl TabularModel {
    /// Decode an artifact and check its internal consistency
    pub fn from_bytes(raw: &[u8]) -> ServeResult<Self> {
        let model: TabularModel = codec().deserialize(raw)?;
        model.validate()?;
        Ok(model)
    }

    /// Encode for storage
    pub fn to_bytes(&self) -> ServeResult<Vec<u8>> {
        codec()
            .serialize(self)
            .map_err(|e| ServeError::Serialization(e.to_string()))
    }

    /// Algorithm name as reported in logs
    pub fn algorithm(&self) -> &'static str {
        match self {
            TabularModel::DummyClassifier(_) => "dummy",
            TabularModel::LogisticRegression(_) => "logreg",
            TabularModel::NearestCentroid(_) => "nearest_centroid",
        }
    }

    fn validate(&self) -> ServeResult<()> {
        match self {
            TabularModel::DummyClassifier(m) => m.validate(),
            TabularModel::LogisticRegression(m) => m.validate(),
            TabularModel::NearestCentroid(m) => m.validate(),
        }
    }

    fn inner(&self) -> &dyn TabularPredictor {
        match self {
            TabularModel::DummyClassifier(m) => m,
            TabularModel::LogisticRegression(m) => m,
            TabularModel::NearestCentroid(m) => m,
        }
    }
}

impl TabularPredictor for TabularModel {
    fn predict_proba(&self, x: ArrayView2<'_, f32>) -> ServeResult<Option<Array2<f32>>> {
        self.inner().predict_proba(x)
    }

    fn predict(&self, x: ArrayView2<'_, f32>) -> ServeResult<Vec<u8>> {
        self.inner().predict(x)
    }
}

fn invalid(msg: impl Into<String>) -> ServeError {
    ServeError::Deserialization(msg.into())
}

/// Models must consume exactly one normalized image row
fn check_trained_width(features: usize) -> ServeResult<()> {
    if features != FEATURE_COUNT {
        return Err(invalid(format!(
            "model expects {} features, images provide {}",
            features, FEATURE_COUNT
        )));
    }
    Ok(())
}

fn check_features(x: &ArrayView2<'_, f32>, expected: usize) -> ServeResult<()> {
    if x.ncols() != expected {
        return Err(ServeError::Inference(format!(
            "expected {} features, got {}",
            expected,
            x.ncols()
        )));
    }
    Ok(())
}

/// Index and value of the largest element
fn argmax(values: ArrayView1<'_, f32>) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((i, v)),
        })
}

/// Predicts a fixed class distribution regardless of input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DummyClassifier {
    pub class_prior: Vec<f32>,
}

impl DummyClassifier {
    fn validate(&self) -> ServeResult<()> {
        if self.class_prior.is_empty() || self.class_prior.len() > NUM_CLASSES {
            return Err(invalid(format!(
                "dummy classifier has {} classes",
                self.class_prior.len()
            )));
        }
        if self.class_prior.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(invalid("class prior outside [0, 1]"));
        }
        Ok(())
    }
}

impl TabularPredictor for DummyClassifier {
    fn predict_proba(&self, x: ArrayView2<'_, f32>) -> ServeResult<Option<Array2<f32>>> {
        let classes = self.class_prior.len();
        let proba = Array2::from_shape_fn((x.nrows(), classes), |(_, c)| self.class_prior[c]);
        Ok(Some(proba))
    }

    fn predict(&self, x: ArrayView2<'_, f32>) -> ServeResult<Vec<u8>> {
        let prior = ArrayView1::from(&self.class_prior[..]);
        let (label, _) = argmax(prior).ok_or_else(|| invalid("empty class prior"))?;
        Ok(vec![label as u8; x.nrows()])
    }
}

/// Multinomial logistic regression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// One weight row per class
    pub coef: Vec<Vec<f32>>,
    /// One bias per class
    pub intercept: Vec<f32>,
}

impl LogisticRegression {
    fn validate(&self) -> ServeResult<()> {
        let classes = self.coef.len();
        if classes == 0 || classes > NUM_CLASSES || self.intercept.len() != classes {
            return Err(invalid(format!(
                "logistic regression has {} weight rows and {} intercepts",
                classes,
                self.intercept.len()
            )));
        }
        let features = self.coef[0].len();
        if self.coef.iter().any(|row| row.len() != features) {
            return Err(invalid("ragged coefficient matrix"));
        }
        check_trained_width(features)
    }

    fn weights(&self) -> ServeResult<Array2<f32>> {
        let classes = self.coef.len();
        let features = self.coef[0].len();
        let flat: Vec<f32> = self.coef.iter().flatten().copied().collect();
        Array2::from_shape_vec((classes, features), flat).map_err(|e| invalid(e.to_string()))
    }
}

impl TabularPredictor for LogisticRegression {
    fn predict_proba(&self, x: ArrayView2<'_, f32>) -> ServeResult<Option<Array2<f32>>> {
        let weights = self.weights()?;
        check_features(&x, weights.ncols())?;

        let mut scores = x.dot(&weights.t());
        for mut row in scores.rows_mut() {
            for (score, bias) in row.iter_mut().zip(&self.intercept) {
                *score += bias;
            }
            // Softmax with max shift
            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            row.mapv_inplace(|s| (s - max).exp());
            let sum: f32 = row.sum();
            row.mapv_inplace(|e| e / sum);
        }
        Ok(Some(scores))
    }

    fn predict(&self, x: ArrayView2<'_, f32>) -> ServeResult<Vec<u8>> {
        let proba = self
            .predict_proba(x)?
            .ok_or_else(|| ServeError::Inference("no probabilities".to_string()))?;
        proba
            .rows()
            .into_iter()
            .map(|row| {
                argmax(row)
                    .map(|(i, _)| i as u8)
                    .ok_or_else(|| ServeError::Inference("empty probability row".to_string()))
            })
            .collect()
    }
}

/// Assigns the label of the closest class centroid; has no probability output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestCentroid {
    pub centroids: Vec<Vec<f32>>,
    pub labels: Vec<u8>,
}

impl NearestCentroid {
    fn validate(&self) -> ServeResult<()> {
        if self.centroids.is_empty() || self.centroids.len() != self.labels.len() {
            return Err(invalid(format!(
                "nearest centroid has {} centroids and {} labels",
                self.centroids.len(),
                self.labels.len()
            )));
        }
        let features = self.centroids[0].len();
        if self.centroids.iter().any(|c| c.len() != features) {
            return Err(invalid("ragged centroid matrix"));
        }
        check_trained_width(features)?;
        if self.labels.iter().any(|&l| l as usize >= NUM_CLASSES) {
            return Err(invalid("centroid label is not a digit"));
        }
        Ok(())
    }
}

impl TabularPredictor for NearestCentroid {
    fn predict_proba(&self, _x: ArrayView2<'_, f32>) -> ServeResult<Option<Array2<f32>>> {
        Ok(None)
    }

    fn predict(&self, x: ArrayView2<'_, f32>) -> ServeResult<Vec<u8>> {
        check_features(&x, self.centroids[0].len())?;

        let labels = x
            .rows()
            .into_iter()
            .map(|sample| {
                let (best, _) = self
                    .centroids
                    .iter()
                    .map(|centroid| {
                        sample
                            .iter()
                            .zip(centroid)
                            .map(|(a, b)| (a - b) * (a - b))
                            .sum::<f32>()
                    })
                    .enumerate()
                    .fold((0, f32::INFINITY), |best, (i, d)| if d < best.1 { (i, d) } else { best });
                self.labels[best]
            })
            .collect();
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_hot_prior(digit: usize) -> Vec<f32> {
        let mut prior = vec![0.0; NUM_CLASSES];
        prior[digit] = 1.0;
        prior
    }

    #[test]
    fn test_bytes_roundtrip_validates() {
        let model = TabularModel::DummyClassifier(DummyClassifier {
            class_prior: one_hot_prior(9),
        });
        let bytes = model.to_bytes().unwrap();
        assert_eq!(TabularModel::from_bytes(&bytes).unwrap(), model);
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let result = TabularModel::from_bytes(b"definitely not a model");
        assert!(matches!(result, Err(ServeError::Deserialization(_))));
    }

    #[test]
    fn test_inconsistent_model_rejected() {
        let model = TabularModel::LogisticRegression(LogisticRegression {
            coef: vec![vec![0.0; 4], vec![0.0; 3]],
            intercept: vec![0.0, 0.0],
        });
        let bytes = model.to_bytes().unwrap();
        assert!(matches!(
            TabularModel::from_bytes(&bytes),
            Err(ServeError::Deserialization(_))
        ));
    }

    #[test]
    fn test_dummy_classifier() {
        let model = DummyClassifier {
            class_prior: one_hot_prior(9),
        };
        let x = Array2::<f32>::zeros((1, FEATURE_COUNT));
        let proba = model.predict_proba(x.view()).unwrap().unwrap();
        assert_eq!(proba.shape(), &[1, NUM_CLASSES]);
        assert_eq!(proba[[0, 9]], 1.0);
        assert_eq!(model.predict(x.view()).unwrap(), vec![9]);
    }

    #[test]
    fn test_logistic_regression_softmax() {
        // Class 3 responds to the first feature, everything else is flat
        let mut coef = vec![vec![0.0; FEATURE_COUNT]; NUM_CLASSES];
        coef[3][0] = 10.0;
        let model = LogisticRegression {
            coef,
            intercept: vec![0.0; NUM_CLASSES],
        };
        model.validate().unwrap();

        let mut x = Array2::<f32>::zeros((1, FEATURE_COUNT));
        x[[0, 0]] = 1.0;
        let proba = model.predict_proba(x.view()).unwrap().unwrap();
        let total: f32 = proba.row(0).sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(proba[[0, 3]] > 0.99);
        assert_eq!(model.predict(x.view()).unwrap(), vec![3]);
    }

    #[test]
    fn test_logistic_regression_feature_mismatch() {
        let model = LogisticRegression {
            coef: vec![vec![0.0; 2]; 2],
            intercept: vec![0.0; 2],
        };
        let x = Array2::<f32>::zeros((1, 5));
        assert!(matches!(
            model.predict_proba(x.view()),
            Err(ServeError::Inference(_))
        ));
    }

    #[test]
    fn test_nearest_centroid_has_no_proba() {
        let model = NearestCentroid {
            centroids: vec![vec![0.0; FEATURE_COUNT], vec![1.0; FEATURE_COUNT]],
            labels: vec![4, 8],
        };
        model.validate().unwrap();

        let x = Array2::from_shape_fn((2, FEATURE_COUNT), |(r, _)| {
            if r == 0 {
                0.9
            } else {
                0.1
            }
        });
        assert!(model.predict_proba(x.view()).unwrap().is_none());
        assert_eq!(model.predict(x.view()).unwrap(), vec![8, 4]);
    }

    #[test]
    fn test_nearest_centroid_rejects_non_digit_label() {
        let model = NearestCentroid {
            centroids: vec![vec![0.0; FEATURE_COUNT]],
            labels: vec![12],
        };
        assert!(matches!(model.validate(), Err(ServeError::Deserialization(_))));
    }

    #[test]
    fn test_wrong_feature_width_rejected_at_load() {
        let logreg = TabularModel::LogisticRegression(LogisticRegression {
            coef: vec![vec![0.1; 10]; NUM_CLASSES],
            intercept: vec![0.0; NUM_CLASSES],
        });
        let centroid = TabularModel::NearestCentroid(NearestCentroid {
            centroids: vec![vec![0.0; 64]],
            labels: vec![1],
        });

        for model in [logreg, centroid] {
            let bytes = model.to_bytes().unwrap();
            assert!(matches!(
                TabularModel::from_bytes(&bytes),
                Err(ServeError::Deserialization(_))
            ));
        }
    }

    #[test]
    fn test_argmax_prefers_first_maximum() {
        let values = [0.2, 0.4, 0.4, 0.0];
        assert_eq!(argmax(ArrayView1::from(&values[..])), Some((1, 0.4)));
        let empty: [f32; 0] = [];
        assert_eq!(argmax(ArrayView1::from(&empty[..])), None);
    }
}
