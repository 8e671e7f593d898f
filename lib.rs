//! # Vistle In-Situ - mesh access and metadata for distributed analysis adaptors
//!
//! Layout-agnostic array access, traversal of (possibly sparse) multi-block
//! collections, and a collective protocol that merges per-rank mesh metadata
//! into one descriptor held identically by every rank.

pub mod core;
pub mod compute;
pub mod mpi;
pub mod util;

pub use self::core::*;
pub use self::compute::*;
pub use self::mpi::*;

/// Install the global `tracing` subscriber.
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init(level: tracing::Level) {
    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Initializing Vistle in-situ v{}", env!("CARGO_PKG_VERSION"));
    }
}

/// Main error type for in-situ operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid layout for array `{array}`: {reason}")]
    InvalidLayout { array: String, reason: &'static str },

    #[error("array `{array}` holds {found:?} elements, requested {expected:?}")]
    ElementKind {
        array: String,
        expected: ElementKind,
        found: ElementKind,
    },

    #[error("unknown association `{0}` (expected point, cell or field)")]
    UnknownAssociation(String),

    #[error("structure mismatch at block {block}: {reason}")]
    StructureMismatch { block: usize, reason: String },

    #[error("metadata merge failed: {0}")]
    Merge(#[from] MergeError),

    #[error("communication error: {0}")]
    Communication(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid mesh: {0}")]
    InvalidMesh(String),
}

pub type Result<T> = std::result::Result<T, Error>;
