//! Worker pool supervisor — spawns, tracks, and signals worker processes.
//!
//! Each worker is an independent OS process running one [`WorkerRunner`]
//! loop; the pool only owns their handles. Stopping is fire-and-forget:
//! [`WorkerPool::stop_workers`] sends SIGINT and forgets the handles without
//! waiting, so a worker may still be finishing its current job (and holding
//! its claim) after the call returns.
//!
//! [`WorkerRunner`]: crate::runner::WorkerRunner

use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tracing;

use queuectl_core::config::WorkerConfig;
use queuectl_core::error::AppError;

/// Name of the worker process binary.
pub const WORKER_BINARY: &str = "queuectl-worker";

/// Identity and OS pid of a spawned worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPid {
    pub worker_id: String,
    pub pid: u32,
}

/// A tracked worker process.
#[derive(Debug)]
pub struct WorkerHandle {
    worker_id: String,
    pid: u32,
    child: Child,
}

impl WorkerHandle {
    /// Identity passed to the worker with `--id`.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// OS process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    fn as_pid(&self) -> WorkerPid {
        WorkerPid {
            worker_id: self.worker_id.clone(),
            pid: self.pid,
        }
    }
}

/// Set of worker processes owned by this supervisor.
#[derive(Debug)]
pub struct WorkerPool {
    /// Worker executable
    program: PathBuf,
    /// Arguments placed before `--id <worker-id>`
    args: Vec<String>,
    /// Tracked workers
    handles: Vec<WorkerHandle>,
    /// Suffix for the next worker identity
    next_index: usize,
}

impl WorkerPool {
    /// Create an empty pool that launches `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            handles: Vec::new(),
            next_index: 1,
        }
    }

    /// Set the arguments passed to every worker ahead of `--id`.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Spawn `count` workers, each with a distinct identity.
    pub fn start_workers(&mut self, count: usize) -> Result<Vec<WorkerPid>, AppError> {
        let supervisor = std::process::id();
        let mut started = Vec::with_capacity(count);

        for _ in 0..count {
            let worker_id = format!("worker-{}-{}", supervisor, self.next_index);
            self.next_index += 1;

            // Workers get their own process group so a terminal Ctrl+C reaches
            // only the supervisor, which then stops them one by one.
            let child = Command::new(&self.program)
                .args(&self.args)
                .arg("--id")
                .arg(&worker_id)
                .process_group(0)
                .spawn()
                .map_err(|e| {
                    AppError::internal(format!(
                        "Failed to spawn worker '{}' ({}): {}",
                        worker_id,
                        self.program.display(),
                        e
                    ))
                })?;

            let pid = child.id().ok_or_else(|| {
                AppError::internal(format!("Worker '{worker_id}' exited immediately"))
            })?;

            let handle = WorkerHandle {
                worker_id,
                pid,
                child,
            };
            started.push(handle.as_pid());
            self.add(handle);
        }

        tracing::info!(
            "Started {} workers (pids): {:?}",
            count,
            started.iter().map(|w| w.pid).collect::<Vec<_>>()
        );
        Ok(started)
    }

    /// Track an already-spawned worker.
    pub fn add(&mut self, handle: WorkerHandle) {
        self.handles.push(handle);
    }

    /// Stop tracking a worker without signalling it.
    pub fn remove(&mut self, worker_id: &str) -> Option<WorkerHandle> {
        let idx = self.handles.iter().position(|h| h.worker_id == worker_id)?;
        Some(self.handles.swap_remove(idx))
    }

    /// Identities and pids of tracked workers.
    pub fn pids(&self) -> Vec<WorkerPid> {
        self.handles.iter().map(WorkerHandle::as_pid).collect()
    }

    /// Number of tracked workers.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no workers are tracked.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Drop handles of workers that have already exited and return them.
    pub fn reap(&mut self) -> Vec<WorkerPid> {
        let mut exited = Vec::new();
        self.handles.retain_mut(|handle| match handle.child.try_wait() {
            Ok(Some(status)) => {
                tracing::info!("Worker '{}' exited with {}", handle.worker_id, status);
                exited.push(handle.as_pid());
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!("Failed to poll worker '{}': {}", handle.worker_id, e);
                true
            }
        });
        exited
    }

    /// Send SIGINT to every tracked worker and forget them immediately.
    ///
    /// Returns the number of workers signalled. Does not wait for exit.
    pub fn stop_workers(&mut self) -> usize {
        tracing::info!("Stopping {} workers...", self.handles.len());
        let mut signalled = 0;
        for handle in self.handles.drain(..) {
            match signal_worker(handle.pid) {
                Ok(true) => signalled += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!("Failed to signal worker '{}': {}", handle.worker_id, e),
            }
        }
        signalled
    }
}

/// Send SIGINT to a worker process. Returns `false` if it no longer exists.
pub fn signal_worker(pid: u32) -> Result<bool, AppError> {
    let raw = i32::try_from(pid)
        .map_err(|_| AppError::internal(format!("Invalid worker pid {pid}")))?;

    match signal::kill(Pid::from_raw(raw), Signal::SIGINT) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => {
            tracing::debug!(pid, "Worker already exited");
            Ok(false)
        }
        Err(e) => Err(AppError::internal(format!(
            "Failed to signal worker pid {pid}: {e}"
        ))),
    }
}

/// Locate the worker binary: the configured path, else `queuectl-worker`
/// beside the current executable, else whatever `PATH` resolves.
pub fn resolve_worker_executable(config: &WorkerConfig) -> PathBuf {
    if let Some(path) = &config.executable {
        return PathBuf::from(path);
    }

    let file_name = format!("{WORKER_BINARY}{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .map(|exe| exe.with_file_name(&file_name))
        .filter(|candidate| candidate.exists())
        .unwrap_or_else(|| PathBuf::from(file_name))
}

/// Record running workers so a later `worker stop` can find them.
pub fn write_pid_file(path: &Path, workers: &[WorkerPid]) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(workers)?)?;
    Ok(())
}

/// Read recorded workers. A missing file means none are recorded.
pub fn read_pid_file(path: &Path) -> Result<Vec<WorkerPid>, AppError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Delete the pid file if present.
pub fn remove_pid_file(path: &Path) -> Result<(), AppError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
