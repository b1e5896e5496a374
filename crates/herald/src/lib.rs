//! # Herald
//!
//! Takes one academic announcement and distributes it across social
//! networks: a relevance gate, per-network adaptation, media synthesis and
//! publishing, with every network isolated from the others' failures.

pub mod adapter;
pub mod config;
pub mod content;
pub mod orchestrator;
pub mod validator;

#[cfg(test)]
mod orchestrator_tests;

use std::collections::BTreeMap;

pub use adapter::{Adaptation, NetworkAdapter, NetworkFields, NetworkProfile};
pub use config::HeraldConfig;
pub use content::ContentItem;
pub use orchestrator::{DistributionOrchestrator, RunSummary};
pub use validator::{ContentValidator, ValidationVerdict};

/// Errors that end a whole run. Per-network problems are reported inside
/// the [`RunSummary`] instead.
#[derive(Debug, thiserror::Error)]
pub enum HeraldError {
    #[error("Content is empty")]
    EmptyContent,

    #[error("Content rejected: {reason}")]
    ValidationRejected { reason: String },

    #[error("No valid target networks: {}", describe_reasons(.reasons))]
    NoValidNetworks { reasons: BTreeMap<String, String> },

    #[error("Configuration error: {0}")]
    Config(String),
}

fn describe_reasons(reasons: &BTreeMap<String, String>) -> String {
    reasons
        .iter()
        .map(|(network, reason)| format!("{}: {}", network, reason))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, HeraldError>;
