//! Error types for depup
//!
//! Error taxonomy:
//! 1. Input errors (`ManifestError`): halt before any network or VCS side effect
//! 2. Transient external-call errors: recovered locally with a sentinel or fallback
//! 3. Per-unit application errors: logged as warnings, processing continues
//! 4. Publication errors (`PipelineError`): fatal for the remaining stages

use crate::orchestrator::RunState;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Manifest reading and rewriting errors
#[derive(Debug, Error)]
pub enum ManifestError {
    /// No manifest file in the working tree
    #[error("Manifest not found under {0}")]
    NotFound(PathBuf),

    /// Manifest is not well-formed XML
    #[error("Manifest parse error: {0}")]
    Parse(String),

    /// File read/write/backup failure
    #[error("Manifest IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<roxmltree::Error> for ManifestError {
    fn from(err: roxmltree::Error) -> Self {
        ManifestError::Parse(err.to_string())
    }
}

/// Run-level failure: which stage failed and why
#[derive(Debug, Clone, Error, Serialize)]
#[error("Stage {stage} failed: {message}")]
pub struct PipelineError {
    /// State the run was trying to reach
    pub stage: RunState,
    pub message: String,
}

impl PipelineError {
    pub fn new(stage: RunState, err: impl std::fmt::Display) -> Self {
        Self {
            stage,
            message: err.to_string(),
        }
    }
}
