//! depup library interface
//!
//! Dependency upgrade pipeline for Maven projects: parse the manifest, resolve
//! latest versions, synthesize upgrade insights, patch sources, rewrite the
//! manifest and publish the result as a pull request.

pub mod error;
pub mod insight;
pub mod manifest;
pub mod orchestrator;
pub mod patcher;
pub mod registry;
pub mod report;
pub mod services;
pub mod tasks;
pub mod types;

pub use crate::error::{ManifestError, PipelineError};
pub use crate::orchestrator::{Pipeline, PipelineContext, RunRequest, RunState, RunSummary};
