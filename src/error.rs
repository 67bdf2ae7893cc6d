//! Centralized error type for the extraction, orientation, and verification
//! pipelines.
//!
//! DESIGN DECISION: one `thiserror`-derived enum per failure family from the
//! error-handling design (fatal-to-evaluation, domain-partial, orientation-
//! degraded, parse), rather than a per-module error type.
//! WHY: every caller up to the orchestrator needs to match on "is this
//! fatal to the evaluation or can it be recorded as a status/flag and
//! continue" — a single enum keeps that policy in one place instead of
//! scattered `From` conversions at module boundaries.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("no source PDFs found for evaluation {0}")]
    NoSourcePdfs(String),

    #[error("discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("discovery cache at {0} failed to validate")]
    InvalidCache(String),

    #[error("agent {agent} failed: {message}")]
    AgentFailed { agent: String, message: String },

    #[error("agent {agent} timed out after {timeout_secs}s")]
    AgentTimeout { agent: String, timeout_secs: u64 },

    #[error("could not extract a JSON object from agent reply: {0}")]
    JsonExtractionFailed(String),

    #[error("project-info extraction failed: {0}")]
    ProjectInfoFailed(String),

    #[error("page router has no pages for domain {0}")]
    NoPagesForDomain(String),

    #[error("iteration store I/O error at {path}: {message}")]
    IterationStoreIo { path: String, message: String },

    #[error("no iterations recorded for evaluation {0}")]
    NoIterations(String),

    #[error("invalid semantic version {0}")]
    InvalidVersion(String),

    #[error("instruction file {0} has no version header")]
    MissingVersionHeader(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("ground-truth parse error: {0}")]
    GroundTruthParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Configuration(e.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::GroundTruthParse(e.to_string())
    }
}

/// Failure kinds this crate treats as non-fatal to the containing evaluation.
///
/// Used by the orchestrator to decide whether a failure aborts the whole
/// run or is recorded as a status field / uncertainty flag and merged
/// around.
impl Error {
    pub fn is_fatal_to_evaluation(&self) -> bool {
        matches!(
            self,
            Error::NoSourcePdfs(_)
                | Error::DiscoveryFailed(_)
                | Error::InvalidCache(_)
                | Error::ProjectInfoFailed(_)
                | Error::Io(_)
                | Error::IterationStoreIo { .. }
        )
    }
}
