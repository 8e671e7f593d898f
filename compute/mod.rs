//! Leaf traversal and collective metadata collection

pub mod apply;
pub mod metadata;

pub use apply::*;
pub use metadata::*;
