//! Cross-process session locking.
//!
//! A [`SessionLock`] serializes access to a named resource across
//! independent OS processes — potentially on different hosts sharing a
//! filesystem. The lock is a file created with **create_new** (exclusive)
//! semantics, containing JSON metadata identifying the holder; it is
//! advisory, enforced only by convention among cooperating processes.
//!
//! # Stale-lock recovery
//!
//! A holder that crashed leaves its lock file behind. A lock becomes
//! breakable only when it is old enough *and* its recorded owner is
//! verifiably gone — either the PID no longer exists, or a process with
//! that PID exists but its start time differs from the recorded one (the
//! PID was reused by an unrelated process). Thresholds are asymmetric:
//! a local-host lock needs 60 s of age; a lock recorded by a different
//! hostname needs 5 minutes, because liveness cannot be verified remotely
//! and the longer grace period substitutes for verification. On Windows
//! locks are never auto-broken — there is no reliable cross-process
//! start-time introspection, so false-positive breaking is a real risk
//! and recovery is manual ([`force_break`]) only.
//!
//! # Lock file format
//!
//! Pretty-printed JSON with camelCase keys:
//!
//! ```json
//! {
//!   "lockId": "host-1234-1718000000000000",
//!   "pid": 1234,
//!   "processStartTime": 8888,
//!   "hostname": "host",
//!   "acquiredAt": "2026-08-30T12:00:00Z"
//! }
//! ```

use crate::error::{CofferError, Result};
use crate::process;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Age a local-host lock must reach before a dead/reused owner makes it
/// breakable.
pub const LOCAL_STALE_AFTER: Duration = Duration::from_secs(60);

/// Age a lock recorded by a different hostname must reach before it is
/// breakable; liveness cannot be checked remotely, so the grace period is
/// larger.
pub const REMOTE_STALE_AFTER: Duration = Duration::from_secs(300);

const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Holder identity persisted as the sole content of a lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    /// Unique id of this acquisition; ownership comparisons use this, not
    /// the path.
    pub lock_id: String,

    /// Process ID of the holder.
    pub pid: u32,

    /// Platform start time of the holder process, when available. A live
    /// process whose current start time differs from this value is treated
    /// as PID reuse, i.e. the holder is gone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_start_time: Option<u64>,

    /// Hostname the lock was recorded on.
    pub hostname: String,

    /// Acquisition timestamp (RFC3339).
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    /// Build the metadata describing an acquisition by this process, now.
    fn for_current_process() -> Self {
        let pid = std::process::id();
        let hostname = local_hostname();
        let acquired_at = Utc::now();
        let lock_id = format!(
            "{}-{}-{}",
            hostname,
            pid,
            acquired_at.timestamp_micros()
        );

        Self {
            lock_id,
            pid,
            process_start_time: process::current_start_time(),
            hostname,
            acquired_at,
        }
    }

    /// Serialize to the on-disk JSON form.
    fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            CofferError::io(
                "failed to serialize lock metadata",
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })
    }

    /// Age of the lock relative to now.
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.acquired_at)
    }

    /// Owner identity for error messages (`pid@hostname`).
    pub fn owner_string(&self) -> String {
        format!("{}@{}", self.pid, self.hostname)
    }
}

/// Hostname of this machine, or `"unknown"` when it cannot be read.
fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// File-based mutual-exclusion lock with stale-holder recovery.
///
/// Acquire with [`try_acquire`](Self::try_acquire) (single attempt) or
/// [`acquire`](Self::acquire) (bounded polling). A held lock is released by
/// [`release`](Self::release) or, best-effort, on drop.
#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
    local_stale_after: Duration,
    remote_stale_after: Duration,
    held: Option<LockInfo>,
}

impl SessionLock {
    /// Create an unlocked handle for the lock file at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            local_stale_after: LOCAL_STALE_AFTER,
            remote_stale_after: REMOTE_STALE_AFTER,
            held: None,
        }
    }

    /// Override the staleness thresholds (local-host, remote-host).
    pub fn with_thresholds(mut self, local: Duration, remote: Duration) -> Self {
        self.local_stale_after = local;
        self.remote_stale_after = remote;
        self
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this handle currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    /// Identity of this handle's acquisition, while held.
    pub fn info(&self) -> Option<&LockInfo> {
        self.held.as_ref()
    }

    /// Attempt to acquire the lock without waiting.
    ///
    /// On success the lock file exists with this process's [`LockInfo`]
    /// fsynced into it. If the file already exists, the recorded holder is
    /// evaluated: a breakable stale holder is deleted and creation retried
    /// once; otherwise [`CofferError::LockHeldByOther`] is returned and
    /// this handle stays unlocked. An unparsable lock file is
    /// [`CofferError::LockFileCorrupt`] — never silently deleted, since a
    /// torn write must not defeat mutual exclusion.
    ///
    /// Calling while already held is a no-op.
    pub fn try_acquire(&mut self) -> Result<()> {
        if self.held.is_some() {
            return Ok(());
        }

        if let Some(info) = self.try_create()? {
            self.held = Some(info);
            return Ok(());
        }

        let existing = match read_lock_info(&self.path)? {
            Some(info) => info,
            None => {
                // Holder released between our create attempt and the read;
                // one more create attempt before reporting contention.
                if let Some(info) = self.try_create()? {
                    self.held = Some(info);
                    return Ok(());
                }
                return Err(CofferError::LockHeldByOther {
                    path: self.path.clone(),
                    owner: "unknown".to_string(),
                });
            }
        };

        if self.can_break_lock(&existing) {
            tracing::warn!(
                path = %self.path.display(),
                owner = %existing.owner_string(),
                age_secs = existing.age().num_seconds(),
                "breaking stale lock"
            );
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(CofferError::io(
                        format!("failed to remove stale lock '{}'", self.path.display()),
                        e,
                    ));
                }
            }
            if let Some(info) = self.try_create()? {
                self.held = Some(info);
                return Ok(());
            }
            // Another contender won the re-acquire race.
            let owner = read_lock_info(&self.path)
                .ok()
                .flatten()
                .map(|i| i.owner_string())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(CofferError::LockHeldByOther {
                path: self.path.clone(),
                owner,
            });
        }

        Err(CofferError::LockHeldByOther {
            path: self.path.clone(),
            owner: existing.owner_string(),
        })
    }

    /// Acquire the lock, polling with backoff until `timeout` elapses.
    ///
    /// Expiry fails with [`CofferError::LockTimeout`], which is distinct
    /// from [`CofferError::LockHeldByOther`]: callers retry or escalate on
    /// a timeout but prompt for a manual [`force_break`] on a live holder.
    /// A corrupt lock file aborts the loop immediately — polling a file
    /// that will never parse cannot succeed.
    ///
    /// The deadline and backoff are local to this call, so a lock object
    /// is safely reusable from independent call sites.
    pub fn acquire(&mut self, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match self.try_acquire() {
                Ok(()) => return Ok(()),
                Err(CofferError::LockHeldByOther { .. }) => {}
                Err(e) => return Err(e),
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(CofferError::LockTimeout {
                    path: self.path.clone(),
                    waited_ms: elapsed.as_millis() as u64,
                });
            }

            let remaining = timeout.saturating_sub(elapsed);
            std::thread::sleep(backoff.min(remaining));
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// Release a held lock.
    ///
    /// Idempotent: releasing an unheld handle is a no-op. The lock file is
    /// deleted only if it still records this handle's acquisition; if the
    /// lock was broken and re-acquired by another process in the meantime,
    /// their file is left alone and only local state is cleared.
    pub fn release(&mut self) -> Result<()> {
        let Some(ours) = self.held.take() else {
            return Ok(());
        };

        match read_lock_info(&self.path) {
            Ok(Some(on_disk)) if on_disk.lock_id == ours.lock_id => {
                fs::remove_file(&self.path).map_err(|e| {
                    CofferError::io(
                        format!("failed to release lock '{}'", self.path.display()),
                        e,
                    )
                })
            }
            Ok(Some(on_disk)) => {
                tracing::warn!(
                    path = %self.path.display(),
                    current_owner = %on_disk.owner_string(),
                    "lock no longer ours at release; leaving current holder's file"
                );
                Ok(())
            }
            // Already gone, or replaced with something unreadable that is
            // therefore not ours to delete.
            Ok(None) => Ok(()),
            Err(CofferError::LockFileCorrupt { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Whether an existing lock may be reclaimed.
    ///
    /// Breakable iff the lock's age exceeds the staleness threshold AND
    /// the owning process is dead or its current start time differs from
    /// the recorded one (PID reuse). For a different hostname only the
    /// (longer) age threshold applies. On Windows always `false`.
    pub fn can_break_lock(&self, info: &LockInfo) -> bool {
        #[cfg(windows)]
        {
            let _ = info;
            return false;
        }

        #[cfg(not(windows))]
        {
            let age = info.age();

            if info.hostname != local_hostname() {
                return age_exceeds(age, self.remote_stale_after);
            }

            if !age_exceeds(age, self.local_stale_after) {
                return false;
            }

            use crate::process::ProcessStatus;
            match process::probe(info.pid) {
                ProcessStatus::Dead => true,
                ProcessStatus::Alive {
                    start_time: Some(current),
                } => match info.process_start_time {
                    Some(recorded) => current != recorded,
                    None => false,
                },
                ProcessStatus::Alive { start_time: None } => false,
                ProcessStatus::Unknown => false,
            }
        }
    }

    /// Exclusive creation of the lock file with fresh metadata.
    ///
    /// `Ok(Some(info))` on success, `Ok(None)` when the file already
    /// exists. A write or sync failure removes the half-written file
    /// best-effort before propagating.
    fn try_create(&self) -> Result<Option<LockInfo>> {
        let info = LockInfo::for_current_process();
        let json = info.to_json()?;

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => {
                return Err(CofferError::io(
                    format!("failed to create lock file '{}'", self.path.display()),
                    e,
                ));
            }
        };

        file.write_all(json.as_bytes()).map_err(|e| {
            let _ = fs::remove_file(&self.path);
            CofferError::io("failed to write lock metadata", e)
        })?;

        file.sync_all().map_err(|e| {
            let _ = fs::remove_file(&self.path);
            CofferError::io("failed to sync lock file", e)
        })?;

        Ok(Some(info))
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if self.held.is_some()
            && let Err(e) = self.release()
        {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to release lock on drop"
            );
        }
    }
}

/// Explicit acknowledgement token for [`force_break`].
///
/// Constructing one is the caller's statement that a *live* holder may be
/// raced; it exists so the unchecked administrative path cannot be
/// substituted for a normal [`SessionLock::release`] by accident.
#[derive(Debug)]
pub struct ForceBreak;

/// Administrative, ownership-unchecked removal of a lock file.
///
/// Dangerous: no staleness or liveness evaluation is performed, so this
/// may race a legitimate holder. It must only be triggered by a human
/// recovering from a crash, never invoked automatically.
///
/// Returns the displaced [`LockInfo`] when the file was readable, for
/// audit; `None` when the file was absent or unreadable.
pub fn force_break(path: &Path, _confirm: ForceBreak) -> Result<Option<LockInfo>> {
    let displaced = read_lock_info(path).ok().flatten();

    match fs::remove_file(path) {
        Ok(()) => Ok(displaced),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CofferError::io(
            format!("failed to force-break lock '{}'", path.display()),
            e,
        )),
    }
}

/// Read and parse a lock file.
///
/// `Ok(None)` when the file does not exist; [`CofferError::LockFileCorrupt`]
/// when it exists but does not parse as [`LockInfo`].
fn read_lock_info(path: &Path) -> Result<Option<LockInfo>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CofferError::io(
                format!("failed to read lock file '{}'", path.display()),
                e,
            ));
        }
    };

    match serde_json::from_str(&content) {
        Ok(info) => Ok(Some(info)),
        Err(e) => Err(CofferError::LockFileCorrupt {
            path: path.to_path_buf(),
            detail: e.to_string(),
        }),
    }
}

#[cfg(not(windows))]
fn age_exceeds(age: chrono::Duration, threshold: Duration) -> bool {
    age.num_milliseconds() > threshold.as_millis() as i64
}
