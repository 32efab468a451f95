//! Dedup core -- pure domain types and scoring logic for the ticket
//! deduplication service.
//!
//! This crate has no knowledge of storage, networking, or the clock beyond
//! what callers pass in. It provides:
//!
//! - **Types** ([`types`]): `Ticket`, `Cluster`, `MergeOperation`, and the
//!   enums and decision records that make up the domain model.
//! - **Config** ([`config`]): `DedupConfig`, every tunable of the dedup
//!   decision pipeline and cluster lifecycle.
//! - **Engine** ([`engine`]): `DedupEngine`, the confidence formula,
//!   three-tier decision policy, incremental centroid update, and
//!   calendar-month partition enumeration.
//! - **Dedup text** ([`dedup_text`]): the non-PII field concatenation
//!   actually sent to the embedder.
//! - **Error** ([`error`]): `EngineError` for pure-logic failures.

pub mod config;
pub mod dedup_text;
pub mod engine;
pub mod error;
pub mod types;

pub use config::DedupConfig;
pub use dedup_text::{build_dedup_text, build_dedup_text_for_ticket};
pub use engine::{CandidateScore, DedupEngine};
pub use error::EngineError;
pub use types::{
    Cluster, ClusterMember, ClusterStatus, Decision, DecisionReason, DecisionSignals,
    DedupDecision, MergeBehavior, MergeOperation, MergeOperationStatus, PartitionKey, Priority,
    SecondarySnapshot, Ticket, TicketStatus,
};
