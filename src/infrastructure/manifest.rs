//! Persistent file manifest
//!
//! Maps every indexed file to its content hash, chunk ids, and the
//! embedding models used, so the indexer can decide per file whether any
//! work is needed. Persisted as a single JSON document; saves are atomic
//! (temp file, fsync, rename) so a crash leaves either the old or the new
//! state, never a torn write.
//!
//! Schema v1.1. Readers accept older versions by treating missing optional
//! fields as unknown; unknown future versions fail with a configuration
//! error. Unknown fields round-trip untouched.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{RwLock, RwLockReadGuard};
use uuid::Uuid;

use crate::domain::error::{Error, Result};

/// Current manifest schema version
pub const MANIFEST_VERSION: &str = "1.1";

/// Which embedding side a backfill query asks about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingKind {
    Dense,
    Sparse,
}

/// Models currently configured, compared against per-file records
#[derive(Debug, Clone, PartialEq)]
pub struct ModelsInUse {
    pub dense_provider: String,
    pub dense_model: String,
    pub sparse_provider: Option<String>,
    pub sparse_model: Option<String>,
}

/// Why a file needs reprocessing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReindexReason {
    NewFile,
    ContentChanged,
    DenseModelChanged,
    SparseModelChanged,
}

impl ReindexReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReindexReason::NewFile => "new_file",
            ReindexReason::ContentChanged => "content_changed",
            ReindexReason::DenseModelChanged => "dense_model_changed",
            ReindexReason::SparseModelChanged => "sparse_model_changed",
        }
    }
}

/// Per-file record, schema v1.1
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileManifestEntry {
    /// Path relative to the project root
    pub path: String,
    /// Blake3 of the file content, hex-encoded
    pub content_hash: String,
    /// Ids of the chunks produced from the file
    pub chunk_ids: Vec<Uuid>,
    /// When the file was last indexed
    pub indexed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dense_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dense_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_dense_embeddings: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_sparse_embeddings: Option<bool>,
    /// Fields from newer schema versions pass through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The manifest document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub project_root: String,
    pub files: BTreeMap<String, FileManifestEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manifest {
    pub fn new(project_root: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: MANIFEST_VERSION.to_string(),
            created_at: now,
            modified_at: now,
            project_root: project_root.into(),
            files: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    /// Whether a file must be reprocessed, and why.
    ///
    /// Returns `None` when the recorded state matches the current content
    /// hash and models. A record whose model fields are missing is treated
    /// as unknown and reprocessed, since a match cannot be proven.
    pub fn needs_reindex(
        &self,
        path: &str,
        content_hash: &str,
        models: &ModelsInUse,
    ) -> Option<ReindexReason> {
        let entry = match self.files.get(path) {
            Some(entry) => entry,
            None => return Some(ReindexReason::NewFile),
        };
        if entry.content_hash != content_hash {
            return Some(ReindexReason::ContentChanged);
        }
        let dense_matches = entry.dense_provider.as_deref() == Some(&models.dense_provider)
            && entry.dense_model.as_deref() == Some(&models.dense_model);
        if !dense_matches {
            return Some(ReindexReason::DenseModelChanged);
        }
        if models.sparse_model.is_some() {
            let sparse_matches = entry.sparse_provider == models.sparse_provider
                && entry.sparse_model == models.sparse_model;
            if !sparse_matches {
                return Some(ReindexReason::SparseModelChanged);
            }
        }
        None
    }

    /// Every chunk id recorded across all files
    pub fn get_all_chunk_ids(&self) -> HashSet<Uuid> {
        self.files
            .values()
            .flat_map(|entry| entry.chunk_ids.iter().copied())
            .collect()
    }

    /// Files recorded without the given embedding kind, candidates for a
    /// vector backfill without re-chunking
    pub fn files_needing_embedding(&self, kind: EmbeddingKind) -> Vec<String> {
        self.files
            .values()
            .filter(|entry| {
                let flag = match kind {
                    EmbeddingKind::Dense => entry.has_dense_embeddings,
                    EmbeddingKind::Sparse => entry.has_sparse_embeddings,
                };
                flag == Some(false)
            })
            .map(|entry| entry.path.clone())
            .collect()
    }

    pub fn upsert_file(&mut self, entry: FileManifestEntry) {
        self.files.insert(entry.path.clone(), entry);
    }

    pub fn remove_file(&mut self, path: &str) -> Option<FileManifestEntry> {
        self.files.remove(path)
    }

    /// Move a record to a new path without touching its chunk data.
    /// Used when the watcher detects a content-preserving rename.
    pub fn rename_file(&mut self, from: &str, to: &str) -> bool {
        match self.files.remove(from) {
            Some(mut entry) => {
                entry.path = to.to_string();
                self.files.insert(to.to_string(), entry);
                true
            }
            None => false,
        }
    }

    fn check_version(version: &str) -> Result<()> {
        let parse = |v: &str| -> Option<(u64, u64)> {
            let mut parts = v.splitn(2, '.');
            let major = parts.next()?.parse().ok()?;
            let minor = parts.next().unwrap_or("0").parse().ok()?;
            Some((major, minor))
        };
        let current = parse(MANIFEST_VERSION).expect("own version parses");
        match parse(version) {
            Some(found) if found <= current => Ok(()),
            Some(_) => Err(Error::configuration(format!(
                "manifest version {version} is newer than supported {MANIFEST_VERSION}"
            ))),
            None => Err(Error::configuration(format!(
                "unparseable manifest version: {version}"
            ))),
        }
    }
}

/// Serialized access to the manifest: many readers, one writer, every save
/// atomic.
pub struct ManifestStore {
    path: PathBuf,
    inner: RwLock<Manifest>,
}

impl ManifestStore {
    /// Load the manifest from `path`, or start a fresh one when the file
    /// does not exist yet.
    pub fn load_or_create(path: impl Into<PathBuf>, project_root: &Path) -> Result<Self> {
        let path = path.into();
        let manifest = if path.exists() {
            let bytes = std::fs::read(&path)?;
            let manifest: Manifest = serde_json::from_slice(&bytes).map_err(|err| {
                Error::persistence(format!(
                    "manifest at {} is unreadable: {err}",
                    path.display()
                ))
            })?;
            Manifest::check_version(&manifest.version)?;
            manifest
        } else {
            Manifest::new(project_root.display().to_string())
        };
        Ok(Self {
            path,
            inner: RwLock::new(manifest),
        })
    }

    /// Read access for queries
    pub async fn read(&self) -> RwLockReadGuard<'_, Manifest> {
        self.inner.read().await
    }

    pub async fn upsert(&self, entry: FileManifestEntry) {
        let mut manifest = self.inner.write().await;
        manifest.upsert_file(entry);
    }

    pub async fn remove(&self, path: &str) -> Option<FileManifestEntry> {
        let mut manifest = self.inner.write().await;
        manifest.remove_file(path)
    }

    pub async fn rename(&self, from: &str, to: &str) -> bool {
        let mut manifest = self.inner.write().await;
        manifest.rename_file(from, to)
    }

    /// Drop every file record. Used when the vector store is found
    /// inconsistent and the manifest can no longer serve as a diff base.
    pub async fn clear_files(&self) {
        let mut manifest = self.inner.write().await;
        manifest.files.clear();
    }

    /// Persist atomically: serialize to a sibling temp file, fsync, rename
    /// over the target. The write lock is held through the file write so
    /// saves are strictly serialized.
    pub async fn save(&self) -> Result<()> {
        let mut manifest = self.inner.write().await;
        manifest.modified_at = Utc::now();
        manifest.version = MANIFEST_VERSION.to_string();
        atomic_write_json(&self.path, &*manifest)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write `value` as JSON via a temp file in the same directory, fsync, and
/// rename over `path`.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    use std::io::Write;

    let parent = path.parent().ok_or_else(|| {
        Error::persistence(format!("no parent directory for {}", path.display()))
    })?;
    std::fs::create_dir_all(parent)?;

    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(value)?;
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models() -> ModelsInUse {
        ModelsInUse {
            dense_provider: "null".to_string(),
            dense_model: "model-a".to_string(),
            sparse_provider: Some("bm25".to_string()),
            sparse_model: Some("bm25-code".to_string()),
        }
    }

    fn entry(path: &str, hash: &str, m: &ModelsInUse) -> FileManifestEntry {
        FileManifestEntry {
            path: path.to_string(),
            content_hash: hash.to_string(),
            chunk_ids: vec![Uuid::new_v8([7u8; 16])],
            indexed_at: Utc::now(),
            dense_provider: Some(m.dense_provider.clone()),
            dense_model: Some(m.dense_model.clone()),
            sparse_provider: m.sparse_provider.clone(),
            sparse_model: m.sparse_model.clone(),
            has_dense_embeddings: Some(true),
            has_sparse_embeddings: Some(true),
            extra: Map::new(),
        }
    }

    #[test]
    fn needs_reindex_reports_each_reason() {
        let m = models();
        let mut manifest = Manifest::new("/p");
        assert_eq!(
            manifest.needs_reindex("a.rs", "h1", &m),
            Some(ReindexReason::NewFile)
        );

        manifest.upsert_file(entry("a.rs", "h1", &m));
        assert_eq!(manifest.needs_reindex("a.rs", "h1", &m), None);
        assert_eq!(
            manifest.needs_reindex("a.rs", "h2", &m),
            Some(ReindexReason::ContentChanged)
        );

        let mut model_b = m.clone();
        model_b.dense_model = "model-b".to_string();
        assert_eq!(
            manifest.needs_reindex("a.rs", "h1", &model_b),
            Some(ReindexReason::DenseModelChanged)
        );

        let mut sparse_b = m.clone();
        sparse_b.sparse_model = Some("bm25-v2".to_string());
        assert_eq!(
            manifest.needs_reindex("a.rs", "h1", &sparse_b),
            Some(ReindexReason::SparseModelChanged)
        );
    }

    #[test]
    fn records_without_model_fields_are_reprocessed() {
        let m = models();
        let mut manifest = Manifest::new("/p");
        let mut legacy = entry("a.rs", "h1", &m);
        legacy.dense_provider = None;
        legacy.dense_model = None;
        manifest.upsert_file(legacy);
        assert_eq!(
            manifest.needs_reindex("a.rs", "h1", &m),
            Some(ReindexReason::DenseModelChanged)
        );
    }

    #[test]
    fn rename_moves_the_record_without_touching_chunks() {
        let m = models();
        let mut manifest = Manifest::new("/p");
        let original = entry("src/util.py", "h1", &m);
        let ids = original.chunk_ids.clone();
        manifest.upsert_file(original);

        assert!(manifest.rename_file("src/util.py", "src/helpers.py"));
        assert!(manifest.files.get("src/util.py").is_none());
        let moved = manifest.files.get("src/helpers.py").unwrap();
        assert_eq!(moved.chunk_ids, ids);
        assert_eq!(moved.path, "src/helpers.py");
        assert!(!manifest.rename_file("missing.py", "other.py"));
    }

    #[test]
    fn newer_manifest_versions_are_rejected() {
        assert!(Manifest::check_version("1.1").is_ok());
        assert!(Manifest::check_version("1.0").is_ok());
        assert!(Manifest::check_version("2.0").is_err());
        assert!(Manifest::check_version("not-a-version").is_err());
    }

    #[test]
    fn unknown_fields_round_trip() {
        let json = r#"{
            "version": "1.1",
            "created_at": "2026-01-01T00:00:00Z",
            "modified_at": "2026-01-01T00:00:00Z",
            "project_root": "/p",
            "files": {},
            "future_field": {"nested": true}
        }"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert!(manifest.extra.contains_key("future_field"));
        let out = serde_json::to_string(&manifest).unwrap();
        assert!(out.contains("future_field"));
    }

    #[tokio::test]
    async fn save_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let store = ManifestStore::load_or_create(&path, Path::new("/p")).unwrap();
        let m = models();
        store.upsert(entry("a.rs", "h1", &m)).await;
        store.save().await.unwrap();

        let reloaded = ManifestStore::load_or_create(&path, Path::new("/p")).unwrap();
        let manifest = reloaded.read().await;
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files["a.rs"].content_hash, "h1");
        assert_eq!(manifest.version, MANIFEST_VERSION);
    }

    #[tokio::test]
    async fn files_needing_embedding_filters_by_flag() {
        let m = models();
        let mut incomplete = entry("a.rs", "h1", &m);
        incomplete.has_dense_embeddings = Some(false);
        let mut manifest = Manifest::new("/p");
        manifest.upsert_file(incomplete);
        manifest.upsert_file(entry("b.rs", "h2", &m));

        assert_eq!(
            manifest.files_needing_embedding(EmbeddingKind::Dense),
            vec!["a.rs".to_string()]
        );
        assert!(manifest
            .files_needing_embedding(EmbeddingKind::Sparse)
            .is_empty());
    }
}
