//! Incremental, checkpointed indexing pipeline
//!
//! Orchestrates discovery → diff → chunk → embed → upsert with three
//! bounded stages: discovery/hashing (IO), chunking (CPU, blocking pool),
//! and embedding/upsert (provider IO). Backpressure flows through the
//! bounded channels between stages, so a slow embedder throttles chunking
//! and a slow store throttles embedding.
//!
//! Per-file atomicity: a file's points are upserted before its manifest
//! entry is written, and stale points are deleted before new ones land.
//! A cancelled or crashed run therefore leaves each file either fully
//! indexed or untouched, and the next run resumes from the manifest diff.

pub mod discovery;
pub mod errors;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::chunking::Chunker;
use crate::domain::error::{Error, Result};
use crate::domain::ports::{EmbeddingProvider, SparseEmbeddingProvider, VectorStoreProvider};
use crate::domain::types::{
    payload, Chunk, CollectionMetadata, DiscoveredFile, SparseVector, VectorPoint,
    COLLECTION_SCHEMA_VERSION,
};
use crate::infrastructure::checkpoint::{Checkpoint, CheckpointStore, IndexPhase};
use crate::infrastructure::config::Settings;
use crate::infrastructure::manifest::{
    EmbeddingKind, FileManifestEntry, ManifestStore, ReindexReason,
};
use crate::infrastructure::resilience::{call_with_retry, CircuitBreakerRegistry, RetryPolicy};
use crate::infrastructure::watcher::{pair_moves, ChangeEvent, FileWatcher, WatchFilter};

pub use errors::{ErrorCollector, IndexError, RunSummary};

/// A file read and hashed, waiting to be chunked
struct FileJob {
    path: String,
    content: String,
    hash: String,
    reason: ReindexReason,
    old_chunk_ids: Vec<Uuid>,
}

/// A file chunked, waiting to be embedded and upserted
struct FileChunks {
    path: String,
    hash: String,
    reason: ReindexReason,
    old_chunk_ids: Vec<Uuid>,
    chunks: Vec<Chunk>,
}

/// Counters and error state shared across pipeline workers
struct RunState {
    files_indexed: AtomicU64,
    files_unchanged: AtomicU64,
    files_skipped: AtomicU64,
    chunks_created: AtomicU64,
    points_upserted: AtomicU64,
    reasons: Mutex<BTreeMap<String, u64>>,
    errors: Mutex<ErrorCollector>,
    fatal: Mutex<Option<Error>>,
}

impl RunState {
    fn new(max_warned: usize) -> Self {
        Self {
            files_indexed: AtomicU64::new(0),
            files_unchanged: AtomicU64::new(0),
            files_skipped: AtomicU64::new(0),
            chunks_created: AtomicU64::new(0),
            points_upserted: AtomicU64::new(0),
            reasons: Mutex::new(BTreeMap::new()),
            errors: Mutex::new(ErrorCollector::new(max_warned)),
            fatal: Mutex::new(None),
        }
    }

    fn record_error(&self, path: &str, phase: IndexPhase, error: &Error) {
        self.errors
            .lock()
            .expect("error collector lock poisoned")
            .record(path, phase, error);
    }

    fn record_reason(&self, reason: ReindexReason) {
        *self
            .reasons
            .lock()
            .expect("reason lock poisoned")
            .entry(reason.as_str().to_string())
            .or_insert(0) += 1;
    }

    fn set_fatal(&self, error: Error) {
        let mut fatal = self.fatal.lock().expect("fatal lock poisoned");
        if fatal.is_none() {
            *fatal = Some(error);
        }
    }

    fn take_fatal(&self) -> Option<Error> {
        self.fatal.lock().expect("fatal lock poisoned").take()
    }
}

/// The indexing orchestrator
pub struct Indexer {
    settings: Arc<Settings>,
    chunker: Arc<Chunker>,
    manifest: Arc<ManifestStore>,
    checkpoints: Arc<CheckpointStore>,
    embedding: Arc<dyn EmbeddingProvider>,
    sparse: Option<Arc<dyn SparseEmbeddingProvider>>,
    store: Arc<dyn VectorStoreProvider>,
    breakers: Arc<CircuitBreakerRegistry>,
    cancel: CancellationToken,
}

impl Indexer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Arc<Settings>,
        chunker: Arc<Chunker>,
        manifest: Arc<ManifestStore>,
        checkpoints: Arc<CheckpointStore>,
        embedding: Arc<dyn EmbeddingProvider>,
        sparse: Option<Arc<dyn SparseEmbeddingProvider>>,
        store: Arc<dyn VectorStoreProvider>,
        breakers: Arc<CircuitBreakerRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            chunker,
            manifest,
            checkpoints,
            embedding,
            sparse,
            store,
            breakers,
            cancel,
        }
    }

    fn collection(&self) -> &str {
        self.settings.collection()
    }

    /// Collection metadata describing the configured providers
    fn collection_metadata(&self) -> CollectionMetadata {
        let caps = self.embedding.capabilities();
        CollectionMetadata {
            provider_name: self.embedding.provider_name().to_string(),
            model_name: self.embedding.model_name().to_string(),
            schema_version: COLLECTION_SCHEMA_VERSION,
            created_at: Utc::now(),
            dense_dim: caps.dimensions,
            sparse_present: self.sparse.is_some(),
            project_name: self.settings.project_name(),
        }
    }

    /// Full index run: discovery, diff, pipeline, deletions, checkpoint.
    pub async fn index_full(&self) -> Result<RunSummary> {
        let started = Instant::now();
        self.store
            .ensure_collection(self.collection(), &self.collection_metadata())
            .await?;

        let run_id = match self.checkpoints.load() {
            Some(previous) if previous.phase != IndexPhase::Complete => {
                tracing::info!(
                    run_id = %previous.run_id,
                    phase = %previous.phase,
                    last_file = previous.last_file.as_deref().unwrap_or(""),
                    "resuming interrupted index run"
                );
                previous.run_id
            }
            _ => {
                let digest = blake3::hash(Utc::now().to_rfc3339().as_bytes());
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(&digest.as_bytes()[..16]);
                Uuid::new_v8(bytes)
            }
        };
        let checkpoint = Arc::new(Mutex::new(Checkpoint::new(run_id)));
        self.save_checkpoint(&checkpoint, IndexPhase::Discovery, None)?;

        let root = self.settings.project_root.clone();
        let include = self.settings.indexer.include.clone();
        let exclude = self.settings.indexer.exclude.clone();
        let discovered = tokio::task::spawn_blocking(move || {
            discovery::discover_files(&root, &include, &exclude)
        })
        .await
        .map_err(|err| Error::persistence(format!("discovery task panicked: {err}")))??;

        let discovered_keys: HashSet<String> = discovered
            .iter()
            .map(|f| discovery::path_key(&f.path))
            .collect();
        let deleted: Vec<String> = {
            let manifest = self.manifest.read().await;
            manifest
                .files
                .keys()
                .filter(|path| !discovered_keys.contains(*path))
                .cloned()
                .collect()
        };

        let total_discovered = discovered.len() as u64;
        let state = Arc::new(RunState::new(self.settings.indexer.max_warned_errors));
        self.save_checkpoint(&checkpoint, IndexPhase::Diff, None)?;
        self.run_pipeline(discovered, state.clone(), checkpoint.clone())
            .await;

        if let Some(fatal) = state.take_fatal() {
            tracing::error!(%fatal, "index run aborted");
            return Err(fatal);
        }

        // Deletion phase: files gone from disk leave the store and manifest
        self.save_checkpoint(&checkpoint, IndexPhase::Deletion, None)?;
        let mut files_deleted = 0u64;
        for path in deleted {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match self.store.delete_by_file(self.collection(), &path).await {
                Ok(_) => {
                    self.manifest.remove(&path).await;
                    files_deleted += 1;
                }
                Err(err) => state.record_error(&path, IndexPhase::Deletion, &err),
            }
        }
        self.manifest.save().await?;
        self.save_checkpoint(&checkpoint, IndexPhase::Complete, None)?;
        self.checkpoints.clear()?;

        let errors = std::mem::replace(
            &mut *state.errors.lock().expect("error lock poisoned"),
            ErrorCollector::new(0),
        )
        .into_errors();
        let summary = self
            .build_summary(run_id, &state, total_discovered, files_deleted)
            .finalize(errors, started.elapsed());
        tracing::info!(%summary, "index run complete");
        Ok(summary)
    }

    /// Incremental run over specific relative paths (watcher deltas)
    pub async fn index_paths(&self, paths: Vec<PathBuf>) -> Result<RunSummary> {
        let started = Instant::now();
        self.store
            .ensure_collection(self.collection(), &self.collection_metadata())
            .await?;

        let files: Vec<DiscoveredFile> = paths
            .into_iter()
            .filter_map(|path| {
                let absolute = self.settings.project_root.join(&path);
                let metadata = std::fs::metadata(&absolute).ok()?;
                Some(DiscoveredFile {
                    language: discovery::language_of(&path),
                    path,
                    size: metadata.len(),
                    mtime: None,
                    ignored: false,
                })
            })
            .collect();
        let total = files.len() as u64;

        let run_id = Uuid::new_v8(rand::random::<[u8; 16]>());
        let checkpoint = Arc::new(Mutex::new(Checkpoint::new(run_id)));
        let state = Arc::new(RunState::new(self.settings.indexer.max_warned_errors));
        self.run_pipeline(files, state.clone(), checkpoint).await;

        if let Some(fatal) = state.take_fatal() {
            return Err(fatal);
        }
        self.manifest.save().await?;
        self.checkpoints.clear()?;

        let summary = self.build_summary(run_id, &state, total, 0);
        let errors = std::mem::replace(
            &mut *state.errors.lock().expect("error lock poisoned"),
            ErrorCollector::new(0),
        )
        .into_errors();
        Ok(summary.finalize(errors, started.elapsed()))
    }

    /// Apply a debounced watcher batch: renames move manifest entries and
    /// payloads without re-embedding, deletions purge, the rest reindex.
    pub async fn handle_events(&self, events: Vec<ChangeEvent>) -> Result<RunSummary> {
        let manifest_hashes: BTreeMap<String, String> = {
            let manifest = self.manifest.read().await;
            manifest
                .files
                .iter()
                .map(|(path, entry)| (path.clone(), entry.content_hash.clone()))
                .collect()
        };
        let root = self.settings.project_root.clone();
        let events = pair_moves(
            events,
            |path| manifest_hashes.get(&discovery::path_key(path)).cloned(),
            |path| {
                std::fs::read_to_string(root.join(path))
                    .ok()
                    .map(|content| discovery::hash_content(&content))
            },
        );

        let mut to_index: Vec<PathBuf> = Vec::new();
        let mut moved = 0u64;
        let mut deleted = 0u64;
        for event in events {
            match event {
                ChangeEvent::Moved { from, to } => {
                    let from_key = discovery::path_key(&from);
                    let to_key = discovery::path_key(&to);
                    if self.manifest.rename(&from_key, &to_key).await {
                        self.store
                            .rename_file(self.collection(), &from_key, &to_key)
                            .await?;
                        moved += 1;
                        tracing::info!(from = %from_key, to = %to_key, "content-preserving rename");
                    } else {
                        // Never indexed under the old path; treat as new
                        to_index.push(to);
                    }
                }
                ChangeEvent::Deleted(path) => {
                    let key = discovery::path_key(&path);
                    if self.manifest.remove(&key).await.is_some() {
                        self.store.delete_by_file(self.collection(), &key).await?;
                        deleted += 1;
                    }
                }
                ChangeEvent::Created(path) | ChangeEvent::Modified(path) => to_index.push(path),
            }
        }
        if moved > 0 || deleted > 0 {
            self.manifest.save().await?;
        }

        let mut summary = if to_index.is_empty() {
            RunSummary::default()
        } else {
            self.index_paths(to_index).await?
        };
        summary.files_deleted += deleted;
        Ok(summary)
    }

    /// Watch the project and feed debounced batches through the
    /// incremental path until cancelled.
    pub async fn watch(&self) -> Result<()> {
        let filter = WatchFilter::new(
            &self.settings.project_root,
            self.settings
                .state_dir()
                .strip_prefix(&self.settings.project_root)
                .unwrap_or(Path::new(".codescout"))
                .to_path_buf(),
        );
        let (watcher, mut batches) = FileWatcher::spawn(
            self.settings.project_root.clone(),
            filter,
            self.settings.watcher.debounce(),
            self.cancel.clone(),
        )?;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                batch = batches.recv() => match batch {
                    Some(events) => {
                        if let Err(err) = self.handle_events(events).await {
                            if matches!(err, Error::Cancelled) {
                                break;
                            }
                            tracing::warn!(%err, "incremental update failed");
                        }
                    }
                    None => break,
                }
            }
        }
        watcher.shutdown().await;
        Ok(())
    }

    /// Sample manifest chunk ids and verify their presence in the vector
    /// store. Returns the missing ratio over the sample.
    pub async fn check_consistency(&self) -> Result<f32> {
        let sample: Vec<Uuid> = {
            let manifest = self.manifest.read().await;
            let mut ids: Vec<Uuid> = manifest.get_all_chunk_ids().into_iter().collect();
            ids.sort();
            ids.truncate(self.settings.indexer.reconcile_sample);
            ids
        };
        if sample.is_empty() {
            return Ok(0.0);
        }
        let found = self
            .store
            .get_points(self.collection(), &sample)
            .await
            .map(|points| points.len())
            .unwrap_or(0);
        Ok((sample.len() - found) as f32 / sample.len() as f32)
    }

    /// Startup reconciliation: a missing-point ratio above the configured
    /// threshold flags the collection inconsistent and triggers a full
    /// reindex.
    pub async fn reconcile(&self) -> Result<Option<RunSummary>> {
        let ratio = self.check_consistency().await?;
        if ratio > self.settings.indexer.reconcile_missing_threshold {
            tracing::warn!(
                missing_ratio = ratio,
                "vector store inconsistent with manifest, triggering full reindex"
            );
            // The manifest can no longer serve as a diff base; dropping its
            // records makes the next run reprocess everything
            self.manifest.clear_files().await;
            self.manifest.save().await?;
            return self.index_full().await.map(Some);
        }
        Ok(None)
    }

    /// Selective reindex: add missing vectors to existing points without
    /// re-chunking. Dense embeddings are prioritized over sparse.
    pub async fn backfill_missing_vectors(&self) -> Result<usize> {
        let mut updated = 0usize;
        for kind in [EmbeddingKind::Dense, EmbeddingKind::Sparse] {
            if kind == EmbeddingKind::Sparse && self.sparse.is_none() {
                continue;
            }
            let paths = {
                let manifest = self.manifest.read().await;
                manifest.files_needing_embedding(kind)
            };
            for path in paths {
                match self.backfill_file(&path, kind).await {
                    Ok(count) => updated += count,
                    Err(err) => {
                        tracing::warn!(%path, %err, "vector backfill failed for file")
                    }
                }
            }
        }
        Ok(updated)
    }

    async fn backfill_file(&self, path: &str, kind: EmbeddingKind) -> Result<usize> {
        let entry = {
            let manifest = self.manifest.read().await;
            manifest.files.get(path).cloned()
        }
        .ok_or_else(|| Error::validation(format!("{path} is not in the manifest")))?;

        let absolute = self.settings.project_root.join(path);
        let content = tokio::fs::read_to_string(&absolute).await?;
        if discovery::hash_content(&content) != entry.content_hash {
            // Content changed since indexing; the normal diff path handles it
            return Ok(0);
        }

        let points = self
            .store
            .get_points(self.collection(), &entry.chunk_ids)
            .await?;
        let lines: Vec<&str> = content.lines().collect();
        let mut updated = 0usize;
        for point in points {
            let (Some(start), Some(end)) = (
                point.payload.get(payload::LINE_START).and_then(Value::as_u64),
                point.payload.get(payload::LINE_END).and_then(Value::as_u64),
            ) else {
                continue;
            };
            let start = (start.max(1) - 1) as usize;
            let end = (end as usize).min(lines.len());
            if start >= end {
                continue;
            }
            let text = lines[start..end].join("\n");

            match kind {
                EmbeddingKind::Dense => {
                    let vector = self.embed_dense_batch(&[text]).await?.pop();
                    self.store
                        .update_vectors(self.collection(), point.id, vector, None)
                        .await?;
                }
                EmbeddingKind::Sparse => {
                    let sparse = self.embed_sparse_batch(&[text]).await?.pop();
                    self.store
                        .update_vectors(self.collection(), point.id, None, sparse)
                        .await?;
                }
            }
            updated += 1;
        }

        let mut entry = entry;
        let models = self.settings.models_in_use();
        match kind {
            EmbeddingKind::Dense => {
                entry.has_dense_embeddings = Some(true);
                entry.dense_provider = Some(models.dense_provider);
                entry.dense_model = Some(models.dense_model);
            }
            EmbeddingKind::Sparse => {
                entry.has_sparse_embeddings = Some(true);
                entry.sparse_provider = models.sparse_provider;
                entry.sparse_model = models.sparse_model;
            }
        }
        self.manifest.upsert(entry).await;
        self.manifest.save().await?;
        Ok(updated)
    }

    /// Cancellation token polled by the pipeline
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // ------------------------------------------------------------------
    // Pipeline stages
    // ------------------------------------------------------------------

    async fn run_pipeline(
        &self,
        files: Vec<DiscoveredFile>,
        state: Arc<RunState>,
        checkpoint: Arc<Mutex<Checkpoint>>,
    ) {
        let capacity = self.settings.indexer.channel_capacity;
        let (chunk_tx, chunk_rx) = mpsc::channel::<FileJob>(capacity);
        let (embed_tx, embed_rx) = mpsc::channel::<FileChunks>(capacity);

        // Stage A: read + hash + diff on the IO pool
        let reader = {
            let state = state.clone();
            let manifest = self.manifest.clone();
            let settings = self.settings.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                for file in files {
                    if cancel.is_cancelled() {
                        state.set_fatal(Error::Cancelled);
                        break;
                    }
                    let key = discovery::path_key(&file.path);
                    let absolute = settings.project_root.join(&file.path);
                    let content = match tokio::fs::read(&absolute).await {
                        Ok(bytes) => match String::from_utf8(bytes) {
                            Ok(content) => content,
                            Err(_) => {
                                // Binary files are silently outside the corpus
                                state.files_skipped.fetch_add(1, Ordering::Relaxed);
                                continue;
                            }
                        },
                        Err(err) => {
                            state.record_error(&key, IndexPhase::Discovery, &err.into());
                            state.files_skipped.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }
                    };
                    let hash = discovery::hash_content(&content);
                    let models = settings.models_in_use();
                    let (reason, old_chunk_ids) = {
                        let manifest = manifest.read().await;
                        let reason = manifest.needs_reindex(&key, &hash, &models);
                        let old = manifest
                            .files
                            .get(&key)
                            .map(|entry| entry.chunk_ids.clone())
                            .unwrap_or_default();
                        (reason, old)
                    };
                    let Some(reason) = reason else {
                        state.files_unchanged.fetch_add(1, Ordering::Relaxed);
                        continue;
                    };
                    state.record_reason(reason);
                    let job = FileJob {
                        path: key,
                        content,
                        hash,
                        reason,
                        old_chunk_ids,
                    };
                    if chunk_tx.send(job).await.is_err() {
                        break;
                    }
                }
            })
        };

        // Stage B: chunking on the blocking pool, several workers
        let chunk_rx = Arc::new(tokio::sync::Mutex::new(chunk_rx));
        let mut chunk_workers = Vec::new();
        for _ in 0..self.settings.indexer.effective_chunking_workers() {
            let rx = chunk_rx.clone();
            let tx = embed_tx.clone();
            let chunker = self.chunker.clone();
            let state = state.clone();
            chunk_workers.push(tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    let language = discovery::language_of(Path::new(&job.path));
                    let chunker = chunker.clone();
                    let path = job.path.clone();
                    let content = job.content;
                    let chunked = tokio::task::spawn_blocking(move || {
                        chunker.chunk(Path::new(&path), &content, language)
                    })
                    .await;
                    let chunks = match chunked {
                        Ok(Ok(chunks)) => chunks,
                        Ok(Err(err)) => {
                            state.record_error(&job.path, IndexPhase::Chunking, &err);
                            state.files_skipped.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }
                        Err(err) => {
                            state.record_error(
                                &job.path,
                                IndexPhase::Chunking,
                                &Error::persistence(format!("chunking task panicked: {err}")),
                            );
                            continue;
                        }
                    };
                    let message = FileChunks {
                        path: job.path,
                        hash: job.hash,
                        reason: job.reason,
                        old_chunk_ids: job.old_chunk_ids,
                        chunks,
                    };
                    if tx.send(message).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(embed_tx);

        // Stage C: embed + upsert workers
        let embed_rx = Arc::new(tokio::sync::Mutex::new(embed_rx));
        let mut embed_workers = Vec::new();
        for _ in 0..self.settings.indexer.embedding_workers.max(1) {
            let rx = embed_rx.clone();
            let state = state.clone();
            let checkpoint = checkpoint.clone();
            let this = self.clone_for_worker();
            embed_workers.push(tokio::spawn(async move {
                loop {
                    if this.cancel.is_cancelled() {
                        state.set_fatal(Error::Cancelled);
                        break;
                    }
                    let message = { rx.lock().await.recv().await };
                    let Some(message) = message else { break };
                    this.process_file(message, &state, &checkpoint).await;
                }
            }));
        }

        let _ = reader.await;
        let _ = futures::future::join_all(chunk_workers).await;
        let _ = futures::future::join_all(embed_workers).await;
    }

    /// Cheap clone of the provider handles for worker tasks
    fn clone_for_worker(&self) -> IndexWorker {
        IndexWorker {
            settings: self.settings.clone(),
            manifest: self.manifest.clone(),
            checkpoints: self.checkpoints.clone(),
            embedding: self.embedding.clone(),
            sparse: self.sparse.clone(),
            store: self.store.clone(),
            breakers: self.breakers.clone(),
            cancel: self.cancel.clone(),
        }
    }

    async fn embed_dense_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let worker = self.clone_for_worker();
        worker.embed_dense(texts).await
    }

    async fn embed_sparse_batch(&self, texts: &[String]) -> Result<Vec<SparseVector>> {
        let worker = self.clone_for_worker();
        worker.embed_sparse(texts).await
    }

    fn save_checkpoint(
        &self,
        checkpoint: &Arc<Mutex<Checkpoint>>,
        phase: IndexPhase,
        last_file: Option<String>,
    ) -> Result<()> {
        let snapshot = {
            let mut checkpoint = checkpoint.lock().expect("checkpoint lock poisoned");
            checkpoint.advance(phase, last_file);
            checkpoint.clone()
        };
        self.checkpoints.save(&snapshot)
    }

    fn build_summary(
        &self,
        run_id: Uuid,
        state: &RunState,
        files_discovered: u64,
        files_deleted: u64,
    ) -> RunSummary {
        RunSummary {
            run_id,
            files_discovered,
            files_indexed: state.files_indexed.load(Ordering::Relaxed),
            files_unchanged: state.files_unchanged.load(Ordering::Relaxed),
            files_skipped: state.files_skipped.load(Ordering::Relaxed),
            files_deleted,
            chunks_created: state.chunks_created.load(Ordering::Relaxed),
            points_upserted: state.points_upserted.load(Ordering::Relaxed),
            reasons: state.reasons.lock().expect("reason lock poisoned").clone(),
            ..RunSummary::default()
        }
    }
}

/// The subset of indexer state shared with stage C workers
struct IndexWorker {
    settings: Arc<Settings>,
    manifest: Arc<ManifestStore>,
    checkpoints: Arc<CheckpointStore>,
    embedding: Arc<dyn EmbeddingProvider>,
    sparse: Option<Arc<dyn SparseEmbeddingProvider>>,
    store: Arc<dyn VectorStoreProvider>,
    breakers: Arc<CircuitBreakerRegistry>,
    cancel: CancellationToken,
}

impl IndexWorker {
    fn collection(&self) -> &str {
        self.settings.collection()
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.settings.indexer.max_retries,
            base_delay: std::time::Duration::from_millis(self.settings.indexer.retry_base_ms),
            max_delay: std::time::Duration::from_secs(10),
        }
    }

    async fn embed_dense(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let caps = self.embedding.capabilities();
        let breaker = self.breakers.get(self.embedding.provider_name());
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(caps.preferred_batch.max(1)) {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let result = call_with_retry(
                self.embedding.provider_name(),
                &breaker,
                &self.retry_policy(),
                self.settings.indexer.provider_timeout(),
                || self.embedding.embed_documents(batch),
            )
            .await?;
            for vector in &result {
                if vector.len() != caps.dimensions {
                    return Err(Error::DimensionMismatch {
                        expected: caps.dimensions,
                        actual: vector.len(),
                    });
                }
            }
            vectors.extend(result);
        }
        Ok(vectors)
    }

    async fn embed_sparse(&self, texts: &[String]) -> Result<Vec<SparseVector>> {
        let Some(sparse) = &self.sparse else {
            return Err(Error::validation("no sparse embedder configured"));
        };
        let breaker = self.breakers.get(sparse.provider_name());
        call_with_retry(
            sparse.provider_name(),
            &breaker,
            &self.retry_policy(),
            self.settings.indexer.provider_timeout(),
            || sparse.embed_documents(texts),
        )
        .await
    }

    async fn process_file(
        &self,
        message: FileChunks,
        state: &RunState,
        checkpoint: &Arc<Mutex<Checkpoint>>,
    ) {
        let path = message.path.clone();
        match self.process_file_inner(message, state).await {
            Ok(ProcessedFile {
                chunks,
                points,
            }) => {
                state.files_indexed.fetch_add(1, Ordering::Relaxed);
                state.chunks_created.fetch_add(chunks, Ordering::Relaxed);
                state.points_upserted.fetch_add(points, Ordering::Relaxed);
                let snapshot = {
                    let mut checkpoint = checkpoint.lock().expect("checkpoint lock poisoned");
                    checkpoint.counters.files_processed += 1;
                    checkpoint.counters.chunks_embedded += chunks;
                    checkpoint.counters.points_upserted += points;
                    checkpoint.advance(IndexPhase::Upsert, Some(path));
                    checkpoint.clone()
                };
                if let Err(err) = self.checkpoints.save(&snapshot) {
                    tracing::warn!(%err, "failed to write checkpoint");
                }
            }
            Err(err) => {
                // Fatal kinds abort the run; everything else is per-file
                match &err {
                    Error::DimensionMismatch { .. }
                    | Error::ProviderSwitch { .. }
                    | Error::ProviderFatal { .. }
                    | Error::Cancelled => {
                        self.cancel.cancel();
                        state.set_fatal(err);
                    }
                    _ => {
                        state.record_error(&path, IndexPhase::Embedding, &err);
                        let mut checkpoint =
                            checkpoint.lock().expect("checkpoint lock poisoned");
                        checkpoint.counters.errors += 1;
                    }
                }
            }
        }
    }

    async fn process_file_inner(
        &self,
        message: FileChunks,
        state: &RunState,
    ) -> Result<ProcessedFile> {
        let FileChunks {
            path,
            hash,
            reason: _,
            old_chunk_ids,
            chunks,
        } = message;

        // Deletes precede upserts for the same file
        let new_ids: HashSet<Uuid> = chunks.iter().map(|chunk| chunk.id).collect();
        let stale: Vec<Uuid> = old_chunk_ids
            .into_iter()
            .filter(|id| !new_ids.contains(id))
            .collect();
        if !stale.is_empty() {
            self.store
                .delete_by_id(self.collection(), &stale)
                .await?;
        }

        let models = self.settings.models_in_use();
        let mut entry = FileManifestEntry {
            path: path.clone(),
            content_hash: hash,
            chunk_ids: chunks.iter().map(|chunk| chunk.id).collect(),
            indexed_at: Utc::now(),
            dense_provider: Some(models.dense_provider.clone()),
            dense_model: Some(models.dense_model.clone()),
            sparse_provider: models.sparse_provider.clone(),
            sparse_model: models.sparse_model.clone(),
            has_dense_embeddings: Some(false),
            has_sparse_embeddings: Some(false),
            extra: Map::new(),
        };

        // Empty files keep an entry with an empty chunk list
        if chunks.is_empty() {
            entry.has_dense_embeddings = Some(true);
            entry.has_sparse_embeddings = Some(self.sparse.is_some());
            self.manifest.upsert(entry).await;
            self.save_manifest_with_retry().await?;
            return Ok(ProcessedFile {
                chunks: 0,
                points: 0,
            });
        }

        let texts: Vec<String> = chunks.iter().map(Chunk::embedding_text).collect();
        let sparse_texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();

        // Partial success is allowed: a modality that fails leaves its
        // vectors absent and the points flagged incomplete
        let dense = match self.embed_dense(&texts).await {
            Ok(vectors) => Some(vectors),
            Err(err @ Error::DimensionMismatch { .. }) => return Err(err),
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(err @ Error::ProviderFatal { .. }) => return Err(err),
            Err(err) => {
                state.record_error(&path, IndexPhase::Embedding, &err);
                None
            }
        };
        let sparse = if self.sparse.is_some() {
            match self.embed_sparse(&sparse_texts).await {
                Ok(vectors) => Some(vectors),
                Err(err) => {
                    state.record_error(&path, IndexPhase::Embedding, &err);
                    None
                }
            }
        } else {
            None
        };

        if dense.is_none() && sparse.is_none() {
            // Nothing to upsert; leave the manifest untouched so the next
            // run retries the file
            return Err(Error::provider_unavailable(
                self.embedding.provider_name(),
                "no embeddings produced for file",
            ));
        }

        let sparse_expected = self.sparse.is_some();
        let complete = dense.is_some() && (!sparse_expected || sparse.is_some());
        let points: Vec<VectorPoint> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| VectorPoint {
                id: chunk.id,
                dense: dense.as_ref().map(|vectors| vectors[i].clone()),
                sparse: sparse.as_ref().map(|vectors| vectors[i].clone()),
                payload: point_payload(chunk, self.embedding.provider_name(), complete),
            })
            .collect();

        let store_breaker = self.breakers.get(self.store.provider_name());
        for batch in points.chunks(self.settings.provider.vector_store.batch_size.max(1)) {
            let batch = batch.to_vec();
            call_with_retry(
                self.store.provider_name(),
                &store_breaker,
                &self.retry_policy(),
                self.settings.indexer.provider_timeout(),
                || self.store.upsert(self.collection(), batch.clone()),
            )
            .await?;
        }

        entry.has_dense_embeddings = Some(dense.is_some());
        entry.has_sparse_embeddings = Some(sparse.is_some() || !sparse_expected);
        let chunk_count = chunks.len() as u64;
        let point_count = points.len() as u64;
        self.manifest.upsert(entry).await;
        self.save_manifest_with_retry().await?;

        Ok(ProcessedFile {
            chunks: chunk_count,
            points: point_count,
        })
    }

    /// Manifest persistence is retried before aborting the run, so a
    /// transient IO failure does not lose a finished file.
    async fn save_manifest_with_retry(&self) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            match self.manifest.save().await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.settings.indexer.max_retries => {
                    attempt += 1;
                    tracing::warn!(%err, attempt, "manifest save failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(
                        self.settings.indexer.retry_base_ms * attempt as u64,
                    ))
                    .await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

struct ProcessedFile {
    chunks: u64,
    points: u64,
}

/// Vector point payload for one chunk
fn point_payload(chunk: &Chunk, provider_name: &str, complete: bool) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(
        payload::FILE_PATH.to_string(),
        Value::String(discovery::path_key(&chunk.span.file_path)),
    );
    map.insert(
        payload::LANGUAGE.to_string(),
        Value::String(chunk.language.as_str().to_string()),
    );
    map.insert(
        payload::LINE_START.to_string(),
        Value::from(chunk.span.line_start),
    );
    map.insert(
        payload::LINE_END.to_string(),
        Value::from(chunk.span.line_end),
    );
    map.insert(
        payload::CHUNK_KIND.to_string(),
        Value::String(chunk.kind.as_str().to_string()),
    );
    map.insert(
        payload::CONTENT_HASH.to_string(),
        Value::String(chunk.content_hash.clone()),
    );
    map.insert(payload::EMBEDDING_COMPLETE.to_string(), Value::Bool(complete));
    map.insert(
        payload::INDEXED_AT.to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
    map.insert(
        payload::PROVIDER_NAME.to_string(),
        Value::String(provider_name.to_string()),
    );
    map.insert(
        payload::CHUNK_NAME.to_string(),
        Value::String(chunk.chunk_name()),
    );
    if let Some(semantic) = &chunk.semantic {
        map.insert(
            payload::SEMANTIC_CATEGORY.to_string(),
            Value::String(semantic.category.as_str().to_string()),
        );
        map.insert(
            payload::IMPORTANCE.to_string(),
            Value::from(semantic.importance as f64),
        );
    }
    map
}
