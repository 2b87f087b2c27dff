// Social Sync - live synchronization of posts, comments, likes, follows
// and notifications over a document store

// Shared handles and configuration
pub mod app_state;
pub mod config;

// Core types and primitives
pub mod core;

// Store seam, codec, subscriptions, metrics
pub mod infrastructure;

// Entity records
pub mod models;

// Managers and feed derivation
pub mod services;

// Common utilities
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
