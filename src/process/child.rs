//! # OS child process handles.
//!
//! [`ChildHandle`] is the narrow interface the supervisor and the fan-in
//! watcher need from the OS process layer: liveness, termination, reaping.
//! [`OsChild`] implements it over [`tokio::process::Child`], sending SIGTERM
//! on Unix and falling back to the runtime's kill elsewhere.

use std::io;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

/// Narrow view of an OS child process.
#[async_trait]
pub trait ChildHandle: Send + Sync + 'static {
    /// OS pid, if the child is (or was) running.
    fn pid(&self) -> Option<u32>;

    /// True while the child has not yet exited.
    async fn is_alive(&self) -> bool;

    /// Sends the platform's termination signal; does not wait.
    async fn terminate(&self) -> io::Result<()>;

    /// Blocks until the OS confirms the child exited (reaps it).
    async fn join(&self) -> io::Result<()>;
}

/// A spawned OS child process.
pub struct OsChild {
    pid: Option<u32>,
    inner: Mutex<Child>,
}

impl OsChild {
    /// Spawns `command` and wraps the child in a shared handle.
    pub fn spawn(command: &mut Command) -> io::Result<std::sync::Arc<Self>> {
        let child = command.spawn()?;
        Ok(std::sync::Arc::new(Self::adopt(child)))
    }

    /// Adopts an already spawned child.
    pub fn adopt(child: Child) -> Self {
        Self {
            pid: child.id(),
            inner: Mutex::new(child),
        }
    }
}

#[async_trait]
impl ChildHandle for OsChild {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn is_alive(&self) -> bool {
        matches!(self.inner.lock().await.try_wait(), Ok(None))
    }

    #[cfg(unix)]
    async fn terminate(&self) -> io::Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let pid = self.pid.ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "child pid unavailable")
        })?;
        kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
            .map_err(|errno| io::Error::from_raw_os_error(errno as i32))
    }

    #[cfg(not(unix))]
    async fn terminate(&self) -> io::Result<()> {
        self.inner.lock().await.start_kill()
    }

    async fn join(&self) -> io::Result<()> {
        self.inner.lock().await.wait().await.map(|_status| ())
    }
}
