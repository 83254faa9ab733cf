//! Prediction dispatch
//!
//! [`Dispatcher::try_predict`] surfaces every failure as a typed error;
//! [`Dispatcher::predict`] is the only place those errors become the fallback
//! result.

use digitd_core::{PredictionResult, ServeError, ServeResult};
use digitd_runtime::{Predictor, TabularModel, TabularPredictor, TensorModel, NUM_CLASSES};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::cache::ModelCache;
use crate::normalize::{normalize, NormalizedImage};

/// Result of the inner prediction path
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// No model is configured; not an error
    NoModel,
    /// A real model produced a digit
    Classified { digit: u8, confidence: f32 },
}

/// Stateless entry point for predictions
pub struct Dispatcher {
    cache: Arc<ModelCache>,
}

impl Dispatcher {
    /// Create a dispatcher reading from `cache`
    pub fn new(cache: Arc<ModelCache>) -> Self {
        Self { cache }
    }

    /// Predict a digit; never fails
    ///
    /// `model_id` is the caller's own bookkeeping and does not select a model.
    pub async fn predict(&self, payload: &str, model_id: Option<&str>) -> PredictionResult {
        let started = Instant::now();

        match self.try_predict(payload).await {
            Ok(Outcome::Classified { digit, confidence }) => {
                let result = PredictionResult {
                    digit,
                    confidence,
                    used_model: true,
                    latency_ms: elapsed_ms(started),
                };
                debug!(
                    digit = result.digit,
                    confidence = result.confidence,
                    latency_ms = result.latency_ms,
                    model_id = ?model_id,
                    "Prediction served"
                );
                result
            }
            Ok(Outcome::NoModel) => {
                debug!(model_id = ?model_id, "No active model; serving fallback");
                PredictionResult::fallback(elapsed_ms(started))
            }
            Err(e) => {
                warn!(
                    kind = e.kind(),
                    error = %e,
                    model_id = ?model_id,
                    "Prediction failed; serving fallback"
                );
                PredictionResult::fallback(elapsed_ms(started))
            }
        }
    }

    /// Inner prediction path with errors kept visible
    pub async fn try_predict(&self, payload: &str) -> ServeResult<Outcome> {
        let model = self.cache.ensure_loaded().await?;
        let payload = payload.to_owned();

        // Decoding, resizing and the forward pass all block
        tokio::task::spawn_blocking(move || -> ServeResult<Outcome> {
            let image = normalize(&payload)?;

            let Some(model) = model else {
                return Ok(Outcome::NoModel);
            };

            match &model.predictor {
                Predictor::TabularClassifier(predictor) => classify_tabular(predictor, &image),
                Predictor::TensorClassifier(predictor) => {
                    classify_tensor(predictor.as_ref(), &image)
                }
            }
        })
        .await
        .map_err(|e| ServeError::Inference(format!("prediction task failed: {}", e)))?
    }
}

fn classify_tabular(predictor: &TabularModel, image: &NormalizedImage) -> ServeResult<Outcome> {
    let x = image.to_flat();

    match predictor.predict_proba(x.view())? {
        Some(proba) => {
            let row: Vec<f32> = proba.row(0).to_vec();
            classified_from_scores(&row)
        }
        None => {
            let label = predictor
                .predict(x.view())?
                .first()
                .copied()
                .ok_or_else(|| ServeError::Inference("predictor returned no label".to_string()))?;
            Ok(Outcome::Classified {
                digit: check_digit(label as usize)?,
                confidence: 0.0,
            })
        }
    }
}

fn classify_tensor(predictor: &dyn TensorModel, image: &NormalizedImage) -> ServeResult<Outcome> {
    let x = image.to_tensor();
    let scores = predictor.run(x.view())?;
    classified_from_scores(&scores)
}

/// Arg-max digit with its score as confidence
fn classified_from_scores(scores: &[f32]) -> ServeResult<Outcome> {
    let (index, score) = scores
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((i, v)),
        })
        .ok_or_else(|| ServeError::Inference("empty score vector".to_string()))?;

    if !score.is_finite() {
        return Err(ServeError::Inference(format!("non-finite score {}", score)));
    }

    Ok(Outcome::Classified {
        digit: check_digit(index)?,
        // Raw logits may fall outside [0, 1]
        confidence: score.clamp(0.0, 1.0),
    })
}

fn check_digit(index: usize) -> ServeResult<u8> {
    if index >= NUM_CLASSES {
        return Err(ServeError::Inference(format!(
            "class index {} is not a digit",
            index
        )));
    }
    Ok(index as u8)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
