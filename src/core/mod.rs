// Core types and primitives

pub mod strong_types;
pub mod viewer;
pub mod published;

// Re-export commonly used types
pub use strong_types::{DocumentId, UserId};
pub use viewer::ViewerContext;
pub use published::Published;
