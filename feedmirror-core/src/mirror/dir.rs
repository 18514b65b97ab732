//! Directory-backed mirror.
//!
//! Layout:
//!
//! ```text
//! <root>/<feed_id>/<uid-slug>-<uid-hash>.ics
//! <root>/<feed_id>/.feedmirror/resync-pending
//! ```
//!
//! Each UID maps to exactly one file name, so an upsert is a single atomic
//! write (temp file + rename) with no lookup.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::date_range::DateWindow;
use crate::error::{FeedMirrorError, FeedMirrorResult};
use crate::event::MirroredEvent;
use crate::ics::{generate_mirror_ics, parse_mirror_ics};
use crate::mirror::{FeedScope, Mirror, sort_rows};

const STATE_DIR: &str = ".feedmirror";
const RESYNC_PENDING_FILE: &str = "resync-pending";
const MAX_SLUG_LEN: usize = 40;

pub struct DirMirror {
    root: PathBuf,
}

impl DirMirror {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirMirror { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn feed_dir(&self, scope: &FeedScope) -> PathBuf {
        self.root.join(&scope.feed_id)
    }

    fn marker_path(&self, scope: &FeedScope) -> PathBuf {
        self.feed_dir(scope).join(STATE_DIR).join(RESYNC_PENDING_FILE)
    }

    fn event_path(&self, event: &MirroredEvent) -> PathBuf {
        self.root
            .join(&event.feed_id)
            .join(filename_for_uid(&event.external_uid))
    }

    /// Every readable row of a feed. Files that fail to parse are skipped.
    async fn read_rows(&self, scope: &FeedScope) -> FeedMirrorResult<Vec<MirroredEvent>> {
        let mut rows = Vec::new();
        for path in self.event_files(scope).await? {
            let content = fs::read_to_string(&path).await.map_err(|e| storage(&path, e))?;
            match parse_mirror_ics(&content) {
                Some(row) => rows.push(row),
                None => tracing::warn!(path = %path.display(), "skipping unreadable mirror file"),
            }
        }
        Ok(rows)
    }

    async fn event_files(&self, scope: &FeedScope) -> FeedMirrorResult<Vec<PathBuf>> {
        let dir = self.feed_dir(scope);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(storage(&dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| storage(&dir, e))? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "ics") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl Mirror for DirMirror {
    async fn upsert(&self, event: &MirroredEvent) -> FeedMirrorResult<()> {
        let path = self.event_path(event);
        let content = generate_mirror_ics(event);
        write_atomic(&path, content.as_bytes()).await
    }

    async fn clear(&self, scope: &FeedScope) -> FeedMirrorResult<usize> {
        let files = self.event_files(scope).await?;
        let mut removed = 0;
        for path in files {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(storage(&path, e)),
            }
        }
        Ok(removed)
    }

    async fn query_range(
        &self,
        scope: &FeedScope,
        window: &DateWindow,
    ) -> FeedMirrorResult<Vec<MirroredEvent>> {
        let mut rows: Vec<_> = self
            .read_rows(scope)
            .await?
            .into_iter()
            .filter(|row| window.overlaps(row.starts_at, row.ends_at))
            .collect();
        sort_rows(&mut rows);
        Ok(rows)
    }

    async fn count(&self, scope: &FeedScope) -> FeedMirrorResult<usize> {
        Ok(self.event_files(scope).await?.len())
    }

    async fn set_resync_pending(&self, scope: &FeedScope, pending: bool) -> FeedMirrorResult<()> {
        let path = self.marker_path(scope);
        if pending {
            let stamp = chrono::Utc::now().to_rfc3339();
            write_atomic(&path, stamp.as_bytes()).await
        } else {
            match fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(storage(&path, e)),
            }
        }
    }

    async fn resync_pending(&self, scope: &FeedScope) -> FeedMirrorResult<bool> {
        let path = self.marker_path(scope);
        fs::try_exists(&path).await.map_err(|e| storage(&path, e))
    }
}

async fn write_atomic(path: &Path, content: &[u8]) -> FeedMirrorResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| FeedMirrorError::Storage(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(dir).await.map_err(|e| storage(dir, e))?;

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    fs::write(&temp, content).await.map_err(|e| storage(&temp, e))?;
    fs::rename(&temp, path).await.map_err(|e| storage(path, e))?;
    Ok(())
}

fn storage(path: &Path, err: std::io::Error) -> FeedMirrorError {
    FeedMirrorError::Storage(format!("{}: {}", path.display(), err))
}

/// Stable file name for a UID: a readable slug plus a hash of the full UID,
/// since different UIDs can slugify to the same text.
pub(crate) fn filename_for_uid(uid: &str) -> String {
    let slug: String = slug::slugify(uid).chars().take(MAX_SLUG_LEN).collect();
    let slug = slug.trim_end_matches('-');
    let slug = if slug.is_empty() { "event" } else { slug };
    format!("{}-{:016x}.ics", slug, fnv1a64(uid.as_bytes()))
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}
