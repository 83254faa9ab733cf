//! digitd-api: REST API server for digitd
//!
//! This crate provides the REST API for interacting with digitd:
//! - Digit prediction
//! - Model registration and listing
//! - Health and status

pub mod rest;

pub use rest::{create_router, AppState};
