//! digitd-inference: The prediction core
//!
//! This crate provides:
//! - Image normalization to a canonical 28x28 grid
//! - A single-slot cache for the active model
//! - Prediction dispatch with a guaranteed fallback result
//! - Model registration that keeps the cache coherent

pub mod cache;
pub mod dispatcher;
pub mod normalize;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::ModelCache;
pub use dispatcher::{Dispatcher, Outcome};
pub use normalize::{normalize, normalize_image, NormalizedImage};
pub use service::ModelService;
