// ABOUTME: Short cross-process lock around one state file's read-modify-write.
// ABOUTME: A `create_new` sibling `<file>.lock`, held only while no await is pending.

use std::fs::OpenOptions;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

/// A read-modify-write never takes this long; older lock files were left by a crash.
const STALE_AFTER: Duration = Duration::from_secs(30);
const WAIT_LIMIT: Duration = Duration::from_secs(10);
const RETRY_EVERY: Duration = Duration::from_millis(5);

/// Exclusive access to a state file. Released on drop.
#[derive(Debug)]
pub(crate) struct StateFileLock {
    path: PathBuf,
}

impl StateFileLock {
    /// Block until the lock next to `file` is ours.
    ///
    /// Never hold the result across an `.await`: another future on the same
    /// task waiting here would never let it go.
    pub(crate) fn acquire(file: &Path) -> io::Result<Self> {
        let path = lock_path(file);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut handle) => {
                    let lock = Self { path };
                    writeln!(handle, "{}", std::process::id())?;
                    return Ok(lock);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }

            if is_stale(&path) {
                tracing::warn!("Breaking stale state lock at {}", path.display());
                match std::fs::remove_file(&path) {
                    Ok(()) => continue,
                    Err(e) if e.kind() == ErrorKind::NotFound => continue,
                    Err(e) => return Err(e),
                }
            }
            if started.elapsed() >= WAIT_LIMIT {
                return Err(io::Error::new(
                    ErrorKind::TimedOut,
                    format!("timed out waiting for {}", path.display()),
                ));
            }
            std::thread::sleep(RETRY_EVERY);
        }
    }
}

impl Drop for StateFileLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!("Failed to release state lock {}: {}", self.path.display(), e);
        }
    }
}

fn lock_path(file: &Path) -> PathBuf {
    let mut name = file.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".lock");
    file.with_file_name(name)
}

fn is_stale(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age >= STALE_AFTER)
}
