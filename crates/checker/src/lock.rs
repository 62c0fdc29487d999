//! Single-writer mutual exclusion via a pid-stamped lockfile.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from lockfile handling.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lockfile I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("lockfile serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Contents of the lockfile.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    timestamp: DateTime<Utc>,
    hostname: String,
}

/// Outcome of an acquisition attempt.
#[derive(Debug)]
pub enum Acquisition {
    /// We hold the lock.
    Acquired(LockGuard),
    /// A live holder within the timeout has it; the caller should exit
    /// successfully, this is expected cadence collision.
    Busy { holder_pid: u32, age: Duration },
}

/// Manages the single-writer lockfile.
pub struct LockManager {
    path: PathBuf,
    timeout: Duration,
}

impl LockManager {
    #[must_use]
    pub fn new(path: PathBuf, timeout: Duration) -> Self {
        Self { path, timeout }
    }

    /// Try to take the lock.
    ///
    /// Steals on parse failure, dead holder, or a holder older than the
    /// timeout (assumed hung). Refuses when a live holder is within the
    /// timeout.
    pub fn acquire(&self, now: DateTime<Utc>) -> Result<Acquisition, LockError> {
        match std::fs::read_to_string(&self.path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
            Ok(content) => match serde_json::from_str::<LockInfo>(&content) {
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "unparseable lockfile, stealing");
                }
                Ok(holder) => {
                    let age = (now - holder.timestamp)
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    if holder_alive(&holder) {
                        if age < self.timeout {
                            return Ok(Acquisition::Busy {
                                holder_pid: holder.pid,
                                age,
                            });
                        }
                        warn!(
                            holder_pid = holder.pid,
                            age_secs = age.as_secs(),
                            "lock holder exceeded timeout, assuming hung and stealing"
                        );
                    } else {
                        warn!(holder_pid = holder.pid, "lock holder is dead, stealing orphaned lock");
                    }
                }
            },
        }

        self.write_lock(now)?;
        debug!(path = %self.path.display(), "lock acquired");
        Ok(Acquisition::Acquired(LockGuard {
            path: self.path.clone(),
            pid: std::process::id(),
        }))
    }

    fn write_lock(&self, now: DateTime<Utc>) -> Result<(), LockError> {
        let info = LockInfo {
            pid: std::process::id(),
            timestamp: now,
            hostname: gethostname::gethostname().to_string_lossy().into_owned(),
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&info)?)?;
        Ok(())
    }
}

/// Held lock. Releases on [`LockGuard::release`] or drop, but only while
/// the lockfile still names this process.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    pid: u32,
}

impl LockGuard {
    /// Release the lock if we still own it.
    pub fn release(self) -> Result<(), LockError> {
        release_if_owned(&self.path, self.pid)?;
        std::mem::forget(self);
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = release_if_owned(&self.path, self.pid) {
            warn!(path = %self.path.display(), error = %e, "failed to release lock on drop");
        }
    }
}

/// Remove the lockfile only when it still names `pid`. A lock stolen
/// mid-flight belongs to the thief.
fn release_if_owned(path: &Path, pid: u32) -> Result<(), LockError> {
    let content = match std::fs::read_to_string(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
        Ok(content) => content,
    };
    match serde_json::from_str::<LockInfo>(&content) {
        Ok(info) if info.pid == pid => {
            std::fs::remove_file(path)?;
            debug!(path = %path.display(), "lock released");
        }
        _ => {
            warn!(path = %path.display(), "lockfile no longer ours, leaving it");
        }
    }
    Ok(())
}

/// Liveness probe: a no-op signal to the pid. Delivery failure other than
/// EPERM means the process is gone. A lock written by another host cannot
/// be probed, so it is treated as alive and ages out instead.
fn holder_alive(holder: &LockInfo) -> bool {
    let ours = gethostname::gethostname().to_string_lossy().into_owned();
    if holder.hostname != ours {
        return true;
    }
    // A pid that cannot exist on this platform is dead by definition, and
    // must not wrap into a negative (process-group) kill target.
    let Ok(pid) = libc::pid_t::try_from(holder.pid) else {
        return false;
    };
    let rc = unsafe { libc::kill(pid, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}
