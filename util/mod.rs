//! Runtime configuration and export helpers

pub mod config;
pub mod decomp;

pub use self::config::RuntimeConfig;
pub use self::decomp::write_domain_decomp;
