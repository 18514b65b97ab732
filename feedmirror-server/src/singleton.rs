//! One scheduler per mirror.
//!
//! Two servers over the same mirror directory would both refresh every feed
//! and race each other's forced resyncs, so the server takes an exclusive
//! lock keyed by the mirror path before spawning its refresh tasks. Servers
//! over different mirrors do not contend.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

/// Held while the scheduler runs; dropping it releases the lock.
pub struct SchedulerLock {
    _file: File,
}

fn lock_path(mirror_dir: &Path) -> Result<PathBuf> {
    let runtime_dir = dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .ok_or_else(|| anyhow::anyhow!("Could not determine runtime directory"))?;

    let dir = runtime_dir.join("feedmirror");
    fs::create_dir_all(&dir)?;

    Ok(dir.join(format!("scheduler-{}.lock", lock_key(mirror_dir))))
}

/// File-name-safe form of the mirror path.
fn lock_key(mirror_dir: &Path) -> String {
    let key: String = mirror_dir
        .to_string_lossy()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();

    match key.trim_matches('-') {
        "" => "root".to_string(),
        key => key.to_string(),
    }
}

/// Take the scheduler lock for `mirror_dir` and record our pid in it.
pub fn acquire_scheduler_lock(mirror_dir: &Path) -> Result<SchedulerLock> {
    let path = lock_path(mirror_dir)?;
    // Not truncated on open: a losing attempt must still see the holder's pid
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .context("Failed to create scheduler lock file")?;

    if file.try_lock_exclusive().is_err() {
        let mut holder = String::new();
        let _ = file.read_to_string(&mut holder);
        let holder = match holder.trim() {
            "" => "unknown".to_string(),
            pid => pid.to_string(),
        };
        anyhow::bail!(
            "Another feedmirror-server (pid {holder}) is already scheduling syncs for {}.\n\
            If you believe this is an error, remove: {}",
            mirror_dir.display(),
            path.display()
        );
    }

    file.set_len(0)?;
    file.rewind()?;
    writeln!(file, "{}", std::process::id())?;

    Ok(SchedulerLock { _file: file })
}
