//! Process Supervisor (C1, spec §4.1).
//!
//! Spawns named child processes, captures stderr as a line stream, and
//! tracks every live handle in a process-wide registry so that shutdown
//! (C9) can reach in and kill everything regardless of which job owns it.
//!
//! Caller cancellation never reaps a child directly: the grace-then-kill
//! path in [`ProcessHandle::kill`] is the only way a tracked process dies,
//! independent of whatever cancellation token the caller used to decide it
//! should be killed (spec §4.1 "Key policy").

use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;

const KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Exited(i32),
    Killed,
}

struct TrackedProcess {
    child: Child,
    started_at: DateTime<Utc>,
}

/// Handle returned by [`ProcessSupervisor::spawn`]. Holds the process id
/// used to look the entry back up in the registry; the child itself lives
/// in the registry so `KillAll` can reach it without the caller's
/// cooperation.
pub struct ProcessHandle {
    pub id: u64,
    pub name: String,
    pub started_at: DateTime<Utc>,
    registry: Arc<Mutex<HashMap<u64, TrackedProcess>>>,
    stderr_rx: Mutex<Option<mpsc::Receiver<String>>>,
}

impl ProcessHandle {
    /// Takes ownership of the stderr line receiver. May only be called
    /// once; subsequent calls return `None`.
    pub async fn take_stderr_lines(&self) -> Option<mpsc::Receiver<String>> {
        self.stderr_rx.lock().await.take()
    }

    /// Waits for the process to exit, removing it from the registry.
    pub async fn wait(&self) -> Result<ProcessOutcome> {
        let mut registry = self.registry.lock().await;
        let Some(entry) = registry.get_mut(&self.id) else {
            return Ok(ProcessOutcome::Killed);
        };
        let status = entry
            .child
            .wait()
            .await
            .with_context(|| format!("waiting for process '{}' (id {})", self.name, self.id))?;
        registry.remove(&self.id);
        Ok(exit_status_to_outcome(status))
    }

    /// Sends a terminate signal, waits up to [`KILL_GRACE`], then force
    /// kills. Always removes the entry from the registry; idempotent if the
    /// process already exited.
    pub async fn kill(&self) -> Result<()> {
        let mut registry = self.registry.lock().await;
        let Some(entry) = registry.get_mut(&self.id) else {
            return Ok(());
        };

        #[cfg(unix)]
        {
            if let Some(pid) = entry.child.id() {
                unsafe {
                    libc::kill(pid as i32, libc::SIGTERM);
                }
            }
        }
        #[cfg(not(unix))]
        {
            // No portable terminate signal on this platform; fall through
            // to the hard kill below after the grace period.
        }

        let graced = timeout(KILL_GRACE, entry.child.wait()).await;
        if graced.is_err() {
            let _ = entry.child.start_kill();
            let _ = entry.child.wait().await;
        }
        registry.remove(&self.id);
        Ok(())
    }
}

fn exit_status_to_outcome(status: ExitStatus) -> ProcessOutcome {
    match status.code() {
        Some(code) => ProcessOutcome::Exited(code),
        None => ProcessOutcome::Killed,
    }
}

/// Process-wide registry of live handles. Cheap to clone; shares the
/// underlying map.
#[derive(Clone, Default)]
pub struct ProcessSupervisor {
    registry: Arc<Mutex<HashMap<u64, TrackedProcess>>>,
    next_id: Arc<AtomicU64>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a named child process with the given argument vector,
    /// environment, and working directory. Fails with a launch error if the
    /// binary is unresolvable or permission is denied.
    pub async fn spawn(
        &self,
        name: &str,
        args: &[String],
        env: &[(String, String)],
        cwd: Option<&std::path::Path>,
    ) -> Result<Arc<ProcessHandle>> {
        let mut cmd = Command::new(name);
        cmd.args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("launch failure spawning '{name}'"))?;

        let stderr = child
            .stderr
            .take()
            .context("child process did not provide a stderr pipe")?;
        let (tx, rx) = mpsc::channel::<String>(256);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
        });

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let started_at = Utc::now();
        {
            let mut registry = self.registry.lock().await;
            registry.insert(
                id,
                TrackedProcess {
                    child,
                    started_at,
                },
            );
        }

        Ok(Arc::new(ProcessHandle {
            id,
            name: name.to_string(),
            started_at,
            registry: self.registry.clone(),
            stderr_rx: Mutex::new(Some(rx)),
        }))
    }

    /// Kills every tracked handle and clears the registry. Idempotent — a
    /// second call on an empty registry is a no-op and returns 0.
    pub async fn kill_all(&self) -> usize {
        let mut registry = self.registry.lock().await;
        let ids: Vec<u64> = registry.keys().copied().collect();
        let count = ids.len();
        for id in ids {
            if let Some(mut entry) = registry.remove(&id) {
                #[cfg(unix)]
                if let Some(pid) = entry.child.id() {
                    unsafe { libc::kill(pid as i32, libc::SIGTERM) };
                }
                let graced = timeout(KILL_GRACE, entry.child.wait()).await;
                if graced.is_err() {
                    let _ = entry.child.start_kill();
                    let _ = entry.child.wait().await;
                }
            }
        }
        count
    }

    pub async fn live_count(&self) -> usize {
        self.registry.lock().await.len()
    }
}

pub fn assert_binary_exists(path: &str) -> Result<()> {
    let resolved = which::which(path);
    match resolved {
        Ok(_) => Ok(()),
        Err(_) => {
            let as_path = std::path::Path::new(path);
            if as_path.exists() {
                Ok(())
            } else {
                bail!("encoder binary '{path}' not found on PATH or as an explicit path")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kill_all_on_empty_registry_is_a_noop() {
        let sup = ProcessSupervisor::new();
        assert_eq!(sup.kill_all().await, 0);
        assert_eq!(sup.kill_all().await, 0);
    }

    #[tokio::test]
    async fn spawn_and_wait_reports_exit_code() {
        let sup = ProcessSupervisor::new();
        let handle = sup
            .spawn("true", &[], &[], None)
            .await
            .expect("spawning `true` should succeed on unix-like test hosts");
        let outcome = handle.wait().await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Exited(0));
        assert_eq!(sup.live_count().await, 0);
    }

    #[tokio::test]
    async fn kill_all_empties_the_registry() {
        let sup = ProcessSupervisor::new();
        let _handle = sup
            .spawn("sleep", &["5".to_string()], &[], None)
            .await
            .expect("spawning `sleep` should succeed on unix-like test hosts");
        assert_eq!(sup.live_count().await, 1);
        let killed = sup.kill_all().await;
        assert_eq!(killed, 1);
        assert_eq!(sup.live_count().await, 0);
        assert_eq!(sup.kill_all().await, 0);
    }
}
