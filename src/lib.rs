//! Release Aggregator Core Library
//!
//! Collects upcoming and recent music releases from several uncooperative web
//! sources and folds them into one deduplicated snapshot.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetch`] - robots.txt gate, rate limiter, challenge-aware retrying fetch
//! - [`sources`] - per-source request building and extraction
//! - [`dates`] - date normalization and the run's date window
//! - [`merge`] - dedup/merge of candidates into canonical releases
//! - [`enrich`] - best-effort MusicBrainz lookup
//! - [`orchestrator`] - sequences sources, genres and pages
//! - [`snapshot`] - JSON output
//! - [`config`] - TOML config and run configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dates;
pub mod enrich;
pub mod fetch;
pub mod merge;
pub mod model;
pub mod orchestrator;
pub mod snapshot;
pub mod sources;
pub mod text;
pub mod user_agent;

// Re-export commonly used types
pub use config::{RunConfig, UndatedPolicy};
pub use dates::{DateWindow, normalize};
pub use merge::{MergeOutcome, ReleaseIndex};
pub use model::{CanonicalRelease, RawCandidate, ReleaseKey, SourceId};
pub use orchestrator::{Orchestrator, RunReport, RunStats, SourcePlan};
pub use snapshot::{Snapshot, write_snapshot};
