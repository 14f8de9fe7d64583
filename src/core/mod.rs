pub mod types;

// Re-export the core types for convenience
pub use types::*;
