use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{info, trace, warn};
use parking_lot::Mutex;

use crate::error::{MatmulError, Result};

/// Unit of work executed by a stream worker.
pub type Job = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

enum Command {
    Run { label: String, job: Job },
    Fence(mpsc::Sender<Option<MatmulError>>),
}

struct Inner {
    name: String,
    sender: Mutex<Option<mpsc::Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is queued and exit.
        self.sender.lock().take();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

/// An ordered device queue.
///
/// Jobs run on one dedicated worker thread in the order they were enqueued.
/// `enqueue` returns immediately; [`Stream::synchronize`] blocks until every
/// job issued before it has finished and reports the first device fault seen
/// since the previous synchronization. Jobs on different streams are not
/// ordered relative to each other.
///
/// `Stream` is a cheap handle; clones share the same queue. The worker is
/// joined when the last handle is dropped.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<Inner>,
}

impl Stream {
    /// Spawn a new queue whose worker thread is named `epimat-<name>`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Command>();
        let worker_name = name.clone();
        let handle = thread::Builder::new()
            .name(format!("epimat-{}", name))
            .spawn(move || worker_loop(&worker_name, receiver))
            .map_err(|e| {
                MatmulError::DeviceFault(format!("failed to start stream '{}': {}", name, e))
            })?;

        info!("created stream '{}'", name);
        Ok(Stream {
            inner: Arc::new(Inner {
                name,
                sender: Mutex::new(Some(sender)),
                worker: Mutex::new(Some(handle)),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Queue `job` behind everything already issued on this stream.
    pub fn enqueue(&self, label: impl Into<String>, job: Job) -> Result<()> {
        self.send(Command::Run {
            label: label.into(),
            job,
        })
    }

    /// Wait for all previously enqueued jobs to finish.
    ///
    /// Returns the first fault recorded since the last call and clears it.
    /// Callers must not hold a read guard on an in-flight output while
    /// waiting, since the worker needs exclusive access to fill it.
    pub fn synchronize(&self) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        self.send(Command::Fence(tx))?;
        match rx.recv() {
            Ok(None) => Ok(()),
            Ok(Some(fault)) => Err(fault),
            Err(_) => Err(self.worker_gone()),
        }
    }

    /// True when both handles refer to the same queue.
    pub fn same_queue(&self, other: &Stream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn send(&self, command: Command) -> Result<()> {
        let guard = self.inner.sender.lock();
        let sender = guard.as_ref().ok_or_else(|| self.worker_gone())?;
        sender.send(command).map_err(|_| self.worker_gone())
    }

    fn worker_gone(&self) -> MatmulError {
        MatmulError::DeviceFault(format!(
            "stream '{}' worker is no longer running",
            self.inner.name
        ))
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream").field("name", &self.inner.name).finish()
    }
}

fn worker_loop(name: &str, receiver: mpsc::Receiver<Command>) {
    let mut fault: Option<MatmulError> = None;
    for command in receiver {
        match command {
            Command::Run { label, job } => {
                trace!("stream '{}': start {}", name, label);
                let outcome = panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|_| {
                    Err(MatmulError::DeviceFault(format!("{} panicked", label)))
                });
                match outcome {
                    Ok(()) => trace!("stream '{}': done {}", name, label),
                    Err(err) => {
                        warn!("stream '{}': {} failed: {}", name, label, err);
                        fault.get_or_insert(err);
                    }
                }
            }
            Command::Fence(reply) => {
                let _ = reply.send(fault.take());
            }
        }
    }
}
