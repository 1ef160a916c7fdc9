//! Structured error accumulation for index runs
//!
//! The indexer recovers per file: failures are recorded here and the run
//! continues. The first few errors per phase log at warning level, the
//! rest at debug, and the end-of-run summary aggregates counts by phase
//! and kind with the first offending paths.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::Error;
use crate::infrastructure::checkpoint::IndexPhase;

/// One recorded failure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexError {
    pub path: String,
    pub phase: IndexPhase,
    pub kind: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Collects errors during a run, rate-limiting warning logs per phase
pub struct ErrorCollector {
    errors: Vec<IndexError>,
    warned_per_phase: BTreeMap<IndexPhase, usize>,
    max_warned: usize,
}

impl ErrorCollector {
    pub fn new(max_warned: usize) -> Self {
        Self {
            errors: Vec::new(),
            warned_per_phase: BTreeMap::new(),
            max_warned,
        }
    }

    pub fn record(&mut self, path: impl Into<String>, phase: IndexPhase, error: &Error) {
        let path = path.into();
        let warned = self.warned_per_phase.entry(phase).or_insert(0);
        if *warned < self.max_warned {
            *warned += 1;
            tracing::warn!(%path, %phase, kind = error.kind(), %error, "indexing error");
        } else {
            tracing::debug!(%path, %phase, kind = error.kind(), %error, "indexing error");
        }
        self.errors.push(IndexError {
            path,
            phase,
            kind: error.kind().to_string(),
            message: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<IndexError> {
        self.errors
    }
}

/// End-of-run report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub duration_ms: u64,
    pub files_discovered: u64,
    pub files_indexed: u64,
    pub files_unchanged: u64,
    pub files_skipped: u64,
    pub files_deleted: u64,
    pub chunks_created: u64,
    pub points_upserted: u64,
    /// Reindex reason → file count
    pub reasons: BTreeMap<String, u64>,
    /// Error kind → count
    pub error_counts: BTreeMap<String, u64>,
    /// Error kind → first few offending paths
    pub error_paths: BTreeMap<String, Vec<String>>,
    pub errors: Vec<IndexError>,
    pub cancelled: bool,
}

impl RunSummary {
    /// Number of sample paths kept per error kind
    const SAMPLE_PATHS: usize = 3;

    pub fn finalize(mut self, errors: Vec<IndexError>, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        for error in &errors {
            *self.error_counts.entry(error.kind.clone()).or_insert(0) += 1;
            let paths = self.error_paths.entry(error.kind.clone()).or_default();
            if paths.len() < Self::SAMPLE_PATHS && !paths.contains(&error.path) {
                paths.push(error.path.clone());
            }
        }
        self.errors = errors;
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "indexed {} of {} files ({} unchanged, {} skipped, {} deleted) into {} points in {}",
            self.files_indexed,
            self.files_discovered,
            self.files_unchanged,
            self.files_skipped,
            self.files_deleted,
            self.points_upserted,
            humantime::format_duration(Duration::from_millis(self.duration_ms)),
        )?;
        if !self.error_counts.is_empty() {
            write!(f, "; errors:")?;
            for (kind, count) in &self.error_counts {
                write!(f, " {kind}={count}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_aggregates_errors_by_kind() {
        let mut collector = ErrorCollector::new(2);
        for i in 0..5 {
            collector.record(
                format!("file{i}.rs"),
                IndexPhase::Chunking,
                &Error::validation("no blocks"),
            );
        }
        collector.record(
            "remote.rs",
            IndexPhase::Embedding,
            &Error::provider_unavailable("embedder", "down"),
        );

        let summary = RunSummary::default()
            .finalize(collector.into_errors(), Duration::from_millis(1500));
        assert_eq!(summary.error_counts.get("validation"), Some(&5));
        assert_eq!(summary.error_counts.get("provider_unavailable"), Some(&1));
        assert_eq!(summary.error_paths.get("validation").unwrap().len(), 3);
        assert!(summary.has_errors());
        let text = summary.to_string();
        assert!(text.contains("validation=5"));
    }

    #[test]
    fn display_reads_like_a_report() {
        let summary = RunSummary {
            files_discovered: 10,
            files_indexed: 8,
            files_unchanged: 2,
            points_upserted: 40,
            ..RunSummary::default()
        }
        .finalize(Vec::new(), Duration::from_secs(2));
        let text = summary.to_string();
        assert!(text.contains("indexed 8 of 10 files"));
        assert!(text.contains("40 points"));
        assert!(!text.contains("errors:"));
    }
}
