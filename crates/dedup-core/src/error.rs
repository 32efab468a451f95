//! Errors raised by pure-logic code in this crate. Distinct from
//! `dedup_server::error::DedupError`, which covers the I/O-facing failure
//! modes of stores, embedders, and services.

use thiserror::Error;

/// Failures that can occur while configuring or running [`crate::engine::DedupEngine`].
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
