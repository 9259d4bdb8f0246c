//! Geoload Common Library
//!
//! Shared types, utilities, and error handling for the geoload workspace.
//!
//! # Overview
//!
//! This crate provides functionality used across all geoload workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Logging**: Centralized tracing initialization
//! - **Types**: Shared domain types (schemas, table destinations)

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{GeoloadError, Result};
pub use types::{FieldMode, FieldType, SchemaField, TableDestination};
