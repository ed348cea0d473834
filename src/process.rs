//! Process liveness and start-time introspection.
//!
//! Collaborator for stale-lock detection: answers "is this PID alive, and
//! when did it start?" so that a lock whose recorded PID has been reused
//! by an unrelated process is treated as abandoned rather than held.
//!
//! Backends:
//! - **Linux**: `/proc/<pid>/stat`, parsing the start-time field from after
//!   the *last* `)` in the line — the process-name field may itself contain
//!   spaces or parentheses.
//! - **macOS**: `ps -p <pid> -o lstart=`, parsed to an epoch timestamp.
//! - **Other unix**: `kill(pid, 0)` existence probe, no start time.
//! - **Elsewhere** (including Windows): [`ProcessStatus::Unknown`] — no
//!   reliable cross-process start-time introspection exists, so callers
//!   must not make break/no-break decisions from it.

/// Observed status of a probed process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// The process exists. The start time is in platform units (clock
    /// ticks since boot on Linux, epoch seconds on macOS) and is only
    /// meaningful for equality comparison against a recorded value from
    /// the same host.
    Alive {
        /// Start time, when the platform exposes one.
        start_time: Option<u64>,
    },
    /// No process with that PID exists.
    Dead,
    /// This platform cannot answer.
    Unknown,
}

/// Probe a PID for liveness and start time.
#[cfg(target_os = "linux")]
pub fn probe(pid: u32) -> ProcessStatus {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => ProcessStatus::Alive {
            start_time: parse_stat_start_time(&stat),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ProcessStatus::Dead,
        Err(_) => ProcessStatus::Unknown,
    }
}

/// Probe a PID for liveness and start time.
#[cfg(target_os = "macos")]
pub fn probe(pid: u32) -> ProcessStatus {
    use std::process::Command;

    let output = Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "lstart="])
        .output();

    match output {
        Ok(out) => {
            let text = String::from_utf8_lossy(&out.stdout);
            let text = text.trim();
            if text.is_empty() {
                // ps prints no row (and exits nonzero) for an unknown pid.
                ProcessStatus::Dead
            } else {
                ProcessStatus::Alive {
                    start_time: parse_lstart_epoch(text),
                }
            }
        }
        Err(_) => ProcessStatus::Unknown,
    }
}

/// Probe a PID for liveness; start time is unavailable on this platform.
#[cfg(all(unix, not(target_os = "linux"), not(target_os = "macos")))]
pub fn probe(pid: u32) -> ProcessStatus {
    // Signal 0 probes existence without delivering anything.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if rc == 0 {
        return ProcessStatus::Alive { start_time: None };
    }
    match std::io::Error::last_os_error().raw_os_error() {
        Some(libc::ESRCH) => ProcessStatus::Dead,
        // EPERM: exists, just not ours to signal.
        Some(libc::EPERM) => ProcessStatus::Alive { start_time: None },
        _ => ProcessStatus::Unknown,
    }
}

/// Probe a PID: unanswerable on this platform.
#[cfg(not(unix))]
pub fn probe(pid: u32) -> ProcessStatus {
    let _ = pid;
    ProcessStatus::Unknown
}

/// Start time of the current process, for stamping into lock metadata.
pub fn current_start_time() -> Option<u64> {
    match probe(std::process::id()) {
        ProcessStatus::Alive { start_time } => start_time,
        _ => None,
    }
}

/// Extract the start-time field from a `/proc/<pid>/stat` line.
///
/// The comm field (field 2) is parenthesized and may contain anything, so
/// fields are counted from after the last `)`. Start time is field 22 of
/// proc(5), i.e. the 20th whitespace token of the remainder.
#[cfg(target_os = "linux")]
fn parse_stat_start_time(stat: &str) -> Option<u64> {
    let (_, after_comm) = stat.rsplit_once(')')?;
    after_comm.split_whitespace().nth(19)?.parse().ok()
}

/// Parse `ps -o lstart=` output ("Mon Jan  2 15:04:05 2006", local time)
/// to epoch seconds.
#[cfg(target_os = "macos")]
fn parse_lstart_epoch(text: &str) -> Option<u64> {
    use chrono::{Local, NaiveDateTime, TimeZone};

    let naive = NaiveDateTime::parse_from_str(text, "%a %b %e %H:%M:%S %Y").ok()?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    u64::try_from(local.timestamp()).ok()
}
