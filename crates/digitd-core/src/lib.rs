//! digitd-core: Core types for the digit prediction server
//!
//! This crate provides the types shared across digitd:
//! - Model metadata, format tags and prediction results
//! - Configuration types
//! - Error handling

pub mod config;
pub mod error;
pub mod model;

pub use config::*;
pub use error::*;
pub use model::*;
