//! Project discovery
//!
//! Walks the project root honoring gitignore rules plus the configured
//! include/exclude globs, detecting languages from file extensions. The
//! walk is deterministic: results are sorted by relative path.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;

use crate::domain::error::{Error, Result};
use crate::domain::types::{DiscoveredFile, Language};

/// State directory name always excluded from discovery
const STATE_DIR_NAME: &str = ".codescout";

/// Walk `root` and return every indexable file, sorted by path.
///
/// Include globs restrict the walk when non-empty; exclude globs are
/// applied on top of gitignore rules.
pub fn discover_files(
    root: &Path,
    include: &[String],
    exclude: &[String],
) -> Result<Vec<DiscoveredFile>> {
    let mut overrides = OverrideBuilder::new(root);
    for glob in include {
        overrides
            .add(glob)
            .map_err(|err| Error::configuration(format!("bad include glob '{glob}': {err}")))?;
    }
    for glob in exclude {
        overrides
            .add(&format!("!{glob}"))
            .map_err(|err| Error::configuration(format!("bad exclude glob '{glob}': {err}")))?;
    }
    let overrides = overrides
        .build()
        .map_err(|err| Error::configuration(format!("failed to build glob overrides: {err}")))?;

    let walker = WalkBuilder::new(root)
        .overrides(overrides)
        .follow_links(false)
        // Honor .gitignore files even when the project is not a git repo
        .require_git(false)
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(%err, "skipping unreadable entry during discovery");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if relative
            .components()
            .any(|c| c.as_os_str() == STATE_DIR_NAME || c.as_os_str() == ".git")
        {
            continue;
        }

        let metadata = entry.metadata().ok();
        let size = metadata.as_ref().map(|m| m.len()).unwrap_or(0);
        let mtime = metadata.as_ref().and_then(|m| {
            m.modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
        });
        let language = language_of(relative);

        files.push(DiscoveredFile {
            path: relative.to_path_buf(),
            size,
            mtime,
            language,
            ignored: false,
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Language detection from the file extension
pub fn language_of(path: &Path) -> Language {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(Language::from_extension)
        .unwrap_or(Language::Unknown)
}

/// Blake3 of file bytes, hex-encoded
pub fn hash_content(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Relative path as the manifest key string
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Absolute path of a relative project file
pub fn absolute(root: &Path, relative: &Path) -> PathBuf {
    root.join(relative)
}
