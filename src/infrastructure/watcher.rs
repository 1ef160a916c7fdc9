//! Debounced filesystem change stream
//!
//! Subscribes to filesystem events under the project root, filters them
//! through the same ignore rules as discovery, coalesces bursts within a
//! debounce window per path, and emits normalized change batches. Content-
//! preserving renames are detected by pairing a `Deleted` and a `Created`
//! whose content hashes match inside the window; matched pairs become
//! `Moved` events so the indexer can rename manifest entries without
//! re-embedding.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::error::{Error, Result};

/// Normalized filesystem change, with paths relative to the project root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
}

impl ChangeEvent {
    /// The path the event primarily concerns
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(path)
            | ChangeEvent::Modified(path)
            | ChangeEvent::Deleted(path) => path,
            ChangeEvent::Moved { to, .. } => to,
        }
    }
}

/// Ignore filter shared between discovery and the watcher
pub struct WatchFilter {
    gitignore: ignore::gitignore::Gitignore,
    state_dir: PathBuf,
}

impl WatchFilter {
    /// Build from the project's `.gitignore` plus the state directory
    pub fn new(project_root: &Path, state_dir: PathBuf) -> Self {
        let mut builder = ignore::gitignore::GitignoreBuilder::new(project_root);
        builder.add(project_root.join(".gitignore"));
        let gitignore = builder.build().unwrap_or_else(|err| {
            tracing::warn!(%err, "failed to build gitignore matcher, watching everything");
            ignore::gitignore::Gitignore::empty()
        });
        Self {
            gitignore,
            state_dir,
        }
    }

    /// Whether a path (relative to the root) should be dropped
    pub fn is_ignored(&self, relative: &Path) -> bool {
        if relative.components().any(|c| c.as_os_str() == ".git") {
            return true;
        }
        if relative.starts_with(&self.state_dir) {
            return true;
        }
        self.gitignore
            .matched_path_or_any_parents(relative, false)
            .is_ignore()
    }
}

/// Per-path coalesced state inside one debounce window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Created,
    Modified,
    Deleted,
}

/// Merge a new raw event into a path's pending state.
///
/// `Created` followed by `Deleted` cancels out; `Deleted` followed by
/// `Created` is a modification; everything else keeps the stronger kind.
fn merge_pending(current: Option<PendingKind>, incoming: PendingKind) -> Option<PendingKind> {
    match (current, incoming) {
        (None, kind) => Some(kind),
        (Some(PendingKind::Created), PendingKind::Deleted) => None,
        (Some(PendingKind::Created), _) => Some(PendingKind::Created),
        (Some(PendingKind::Deleted), PendingKind::Created) => Some(PendingKind::Modified),
        (Some(PendingKind::Deleted), _) => Some(PendingKind::Deleted),
        (Some(PendingKind::Modified), PendingKind::Deleted) => Some(PendingKind::Deleted),
        (Some(PendingKind::Modified), _) => Some(PendingKind::Modified),
    }
}

/// Pair `Deleted`/`Created` events whose content hashes match into `Moved`
/// events. `deleted_hash` resolves the pre-delete hash (from the manifest);
/// `created_hash` hashes the new file on disk.
pub fn pair_moves(
    events: Vec<ChangeEvent>,
    deleted_hash: impl Fn(&Path) -> Option<String>,
    created_hash: impl Fn(&Path) -> Option<String>,
) -> Vec<ChangeEvent> {
    let mut created: Vec<(usize, PathBuf, Option<String>)> = Vec::new();
    for (index, event) in events.iter().enumerate() {
        if let ChangeEvent::Created(path) = event {
            created.push((index, path.clone(), created_hash(path)));
        }
    }

    let mut consumed: Vec<usize> = Vec::new();
    let mut result: Vec<ChangeEvent> = Vec::with_capacity(events.len());

    for (index, event) in events.iter().enumerate() {
        if consumed.contains(&index) {
            continue;
        }
        match event {
            ChangeEvent::Deleted(from) => {
                let from_hash = deleted_hash(from);
                let matched = from_hash.as_ref().and_then(|hash| {
                    created
                        .iter()
                        .find(|(i, _, h)| !consumed.contains(i) && h.as_ref() == Some(hash))
                        .map(|(i, to, _)| (*i, to.clone()))
                });
                match matched {
                    Some((created_index, to)) => {
                        consumed.push(created_index);
                        result.push(ChangeEvent::Moved {
                            from: from.clone(),
                            to,
                        });
                    }
                    None => result.push(event.clone()),
                }
            }
            _ => result.push(event.clone()),
        }
    }
    result
}

/// Filesystem watcher emitting debounced change batches
pub struct FileWatcher {
    // Kept alive for the subscription's lifetime
    _watcher: RecommendedWatcher,
    handle: JoinHandle<()>,
}

impl FileWatcher {
    /// Start watching `project_root`. Batches of normalized events arrive
    /// on the returned channel after each debounce window closes.
    pub fn spawn(
        project_root: PathBuf,
        filter: WatchFilter,
        debounce: Duration,
        cancel: CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<Vec<ChangeEvent>>)> {
        let (raw_tx, mut raw_rx) = mpsc::channel::<notify::Event>(256);
        let (batch_tx, batch_rx) = mpsc::channel::<Vec<ChangeEvent>>(16);

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<notify::Event>| {
                if let Ok(event) = result {
                    let _ = raw_tx.blocking_send(event);
                }
            },
            notify::Config::default(),
        )
        .map_err(|err| Error::configuration(format!("failed to start watcher: {err}")))?;
        watcher
            .watch(&project_root, RecursiveMode::Recursive)
            .map_err(|err| {
                Error::configuration(format!(
                    "failed to watch {}: {err}",
                    project_root.display()
                ))
            })?;

        let handle = tokio::spawn(async move {
            let mut pending: BTreeMap<PathBuf, PendingKind> = BTreeMap::new();
            loop {
                let wait = if pending.is_empty() {
                    // Nothing buffered; wait indefinitely for the next event
                    Duration::from_secs(3600)
                } else {
                    debounce
                };
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = raw_rx.recv() => {
                        match event {
                            Some(event) => {
                                Self::absorb(&project_root, &filter, &mut pending, event)
                            }
                            None => break,
                        }
                    }
                    _ = tokio::time::sleep(wait), if !pending.is_empty() => {
                        let batch: Vec<ChangeEvent> = std::mem::take(&mut pending)
                            .into_iter()
                            .map(|(path, kind)| match kind {
                                PendingKind::Created => ChangeEvent::Created(path),
                                PendingKind::Modified => ChangeEvent::Modified(path),
                                PendingKind::Deleted => ChangeEvent::Deleted(path),
                            })
                            .collect();
                        if !batch.is_empty() && batch_tx.send(batch).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok((
            Self {
                _watcher: watcher,
                handle,
            },
            batch_rx,
        ))
    }

    fn absorb(
        project_root: &Path,
        filter: &WatchFilter,
        pending: &mut BTreeMap<PathBuf, PendingKind>,
        event: notify::Event,
    ) {
        use notify::EventKind;

        let kind = match event.kind {
            EventKind::Create(_) => PendingKind::Created,
            EventKind::Modify(_) => PendingKind::Modified,
            EventKind::Remove(_) => PendingKind::Deleted,
            _ => return,
        };
        for path in event.paths {
            let Ok(relative) = path.strip_prefix(project_root) else {
                continue;
            };
            let relative = relative.to_path_buf();
            if filter.is_ignored(&relative) {
                continue;
            }
            // Rename events surface as Modify on some platforms; resolve
            // against the filesystem
            let effective = if kind == PendingKind::Modified && !path.exists() {
                PendingKind::Deleted
            } else {
                kind
            };
            let merged = merge_pending(pending.get(&relative).copied(), effective);
            match merged {
                Some(kind) => {
                    pending.insert(relative, kind);
                }
                None => {
                    pending.remove(&relative);
                }
            }
        }
    }

    /// Stop the debounce task
    pub async fn shutdown(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_then_deleted_cancels_out() {
        assert_eq!(
            merge_pending(Some(PendingKind::Created), PendingKind::Deleted),
            None
        );
        assert_eq!(
            merge_pending(Some(PendingKind::Deleted), PendingKind::Created),
            Some(PendingKind::Modified)
        );
        assert_eq!(
            merge_pending(Some(PendingKind::Modified), PendingKind::Modified),
            Some(PendingKind::Modified)
        );
        assert_eq!(merge_pending(None, PendingKind::Created), Some(PendingKind::Created));
    }

    #[test]
    fn matching_hashes_become_a_move() {
        let events = vec![
            ChangeEvent::Deleted(PathBuf::from("src/util.py")),
            ChangeEvent::Created(PathBuf::from("src/helpers.py")),
        ];
        let paired = pair_moves(
            events,
            |path| (path == Path::new("src/util.py")).then(|| "hash-x".to_string()),
            |path| (path == Path::new("src/helpers.py")).then(|| "hash-x".to_string()),
        );
        assert_eq!(
            paired,
            vec![ChangeEvent::Moved {
                from: PathBuf::from("src/util.py"),
                to: PathBuf::from("src/helpers.py"),
            }]
        );
    }

    #[test]
    fn differing_hashes_stay_separate_events() {
        let events = vec![
            ChangeEvent::Deleted(PathBuf::from("a.rs")),
            ChangeEvent::Created(PathBuf::from("b.rs")),
        ];
        let paired = pair_moves(
            events.clone(),
            |_| Some("hash-a".to_string()),
            |_| Some("hash-b".to_string()),
        );
        assert_eq!(paired, events);
    }

    #[test]
    fn one_created_file_pairs_with_at_most_one_delete() {
        let events = vec![
            ChangeEvent::Deleted(PathBuf::from("a.rs")),
            ChangeEvent::Deleted(PathBuf::from("b.rs")),
            ChangeEvent::Created(PathBuf::from("c.rs")),
        ];
        let paired = pair_moves(
            events,
            |_| Some("same".to_string()),
            |_| Some("same".to_string()),
        );
        // First delete wins the pairing; the second stays a delete
        assert_eq!(
            paired,
            vec![
                ChangeEvent::Moved {
                    from: PathBuf::from("a.rs"),
                    to: PathBuf::from("c.rs"),
                },
                ChangeEvent::Deleted(PathBuf::from("b.rs")),
            ]
        );
    }

    #[test]
    fn filter_drops_git_and_state_paths() {
        let dir = tempfile::tempdir().unwrap();
        let filter = WatchFilter::new(dir.path(), PathBuf::from(".codescout"));
        assert!(filter.is_ignored(Path::new(".git/objects/ab")));
        assert!(filter.is_ignored(Path::new(".codescout/manifest.json")));
        assert!(!filter.is_ignored(Path::new("src/lib.rs")));
    }
}
