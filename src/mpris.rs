//! Metadata sources: anything that produces one line per playback change.

pub mod connection;
pub mod events;
pub mod metadata;
pub mod playerctl;

use std::io;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

pub use connection::MprisError;
pub use events::spawn_dbus;
pub use playerctl::{spawn_command, spawn_playerctl};

/// Format handed to `playerctl -f`; lines look like `Playing: Artist - Title`.
pub const METADATA_FORMAT: &str = "{{ status }}: {{ artist }} - {{ title }}";

/// Lines are handed over one at a time; the producer waits for the debouncer.
pub(crate) const LINE_BUFFER: usize = 1;

/// How long an interrupted subprocess gets to exit before it is killed.
pub const GRACE_PERIOD: Duration = Duration::from_secs(2);

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} did not expose its stdout")]
    NoStdout(String),
    #[error(transparent)]
    Mpris(#[from] MprisError),
}

#[derive(Debug)]
enum Worker {
    Process { child: Child, reader: JoinHandle<()> },
    Task(JoinHandle<()>),
}

/// A running producer of metadata lines.
#[derive(Debug)]
pub struct MetadataSource {
    lines: mpsc::Receiver<String>,
    worker: Worker,
}

impl MetadataSource {
    pub(crate) fn from_process(
        lines: mpsc::Receiver<String>,
        child: Child,
        reader: JoinHandle<()>,
    ) -> Self {
        Self {
            lines,
            worker: Worker::Process { child, reader },
        }
    }

    /// Wraps a task that feeds `lines`. Terminating the source aborts the task.
    pub fn from_task(lines: mpsc::Receiver<String>, task: JoinHandle<()>) -> Self {
        Self {
            lines,
            worker: Worker::Task(task),
        }
    }

    /// Waits for the next line. `None` once the producer has gone away.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// OS process id of the subprocess, if this source has one that is still running.
    pub fn pid(&self) -> Option<u32> {
        match &self.worker {
            Worker::Process { child, .. } => child.id(),
            Worker::Task(_) => None,
        }
    }

    /// Stops the producer.
    ///
    /// A subprocess is sent SIGINT and given [`GRACE_PERIOD`] to exit before it is killed.
    /// A task is aborted.
    pub async fn terminate(&mut self) {
        self.lines.close();
        match &mut self.worker {
            Worker::Process { child, reader } => {
                debug!(pid = ?child.id(), "Interrupting metadata process");
                if let Err(err) = interrupt(child) {
                    warn!("Failed to signal metadata process: {}", err);
                }
                match timeout(GRACE_PERIOD, child.wait()).await {
                    Ok(Ok(status)) => debug!(%status, "Metadata process exited"),
                    Ok(Err(err)) => warn!("Failed to wait for metadata process: {}", err),
                    Err(_) => {
                        warn!("Metadata process ignored the interrupt, killing it");
                        if let Err(err) = child.kill().await {
                            warn!("Failed to kill metadata process: {}", err);
                        }
                    }
                }
                reader.abort();
            }
            Worker::Task(task) => task.abort(),
        }
    }
}

#[cfg(unix)]
fn interrupt(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(pid).map_err(|_| io::Error::other("pid out of range"))?;
    kill(Pid::from_raw(pid), Signal::SIGINT).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}
