//! digitd-store: Model registry
//!
//! This crate provides the storage collaborator the prediction core reads from:
//! - Active-model lookup and artifact byte fetch
//! - Registration with single-active enforcement
//! - In-memory and filesystem-backed registries

pub mod fs;
pub mod memory;
pub mod registry;

pub use fs::FsRegistry;
pub use memory::MemoryRegistry;
pub use registry::{ModelRegistry, NewModel};
