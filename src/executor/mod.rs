//! Ordered task executor
//!
//! An `Executor` owns one named worker thread that runs submitted tasks
//! strictly in submission order. The broker keeps one executor per message
//! direction, which is what sequences every publish for that direction.
//!
//! Usage notes:
//! - `submit` returns a [`TaskHandle`]; `wait` blocks the caller until the task
//!   has run and yields its return value.
//! - A task that panics is caught and logged; the worker keeps draining.
//! - `shutdown` lets already queued tasks finish, then joins the worker.
//!   Submitting afterwards fails with `ExecutorShutdown`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, sync_channel};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::utils::{BrokerError, Result};

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct Executor {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

/// Completion handle for a submitted task.
pub struct TaskHandle<T> {
    executor: String,
    done: Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Block until the task has run and return its value.
    ///
    /// Safe from any thread, including one driving an async runtime (which
    /// it blocks for the duration).
    pub fn wait(self) -> Result<T> {
        self.done
            .recv()
            .map_err(|_| BrokerError::TaskAborted(self.executor))
    }
}

impl Executor {
    /// Spawn the worker thread. The thread takes `name` so log lines and
    /// panics can be attributed to a direction.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<Task>();
        let worker_name = name.clone();

        let worker = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Some(task) = receiver.blocking_recv() {
                    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(task)) {
                        error!(
                            executor = %worker_name,
                            reason = panic_reason(panic.as_ref()),
                            "task panicked"
                        );
                    }
                }
                debug!(executor = %worker_name, "executor worker stopped");
            })
            .map_err(|e| BrokerError::ExecutorShutdown(format!("{name}: {e}")))?;

        Ok(Self {
            worker_id: worker.thread().id(),
            name,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `job` behind everything submitted before it.
    pub fn submit<F, T>(&self, job: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = sync_channel(1);
        let task: Task = Box::new(move || {
            // the submitter may have stopped waiting
            let _ = done_tx.try_send(job());
        });

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match sender.as_ref() {
            Some(sender) => sender
                .send(task)
                .map_err(|_| BrokerError::ExecutorShutdown(self.name.clone()))?,
            None => return Err(BrokerError::ExecutorShutdown(self.name.clone())),
        }

        Ok(TaskHandle {
            executor: self.name.clone(),
            done: done_rx,
        })
    }

    /// Block until every task submitted so far has run.
    ///
    /// Returns immediately when called from the worker thread itself or after
    /// shutdown, since there is nothing that could be waited on safely.
    pub fn wait_for_submitted_tasks(&self) {
        if self.is_worker_thread() {
            return;
        }
        match self.submit(|| ()) {
            Ok(marker) => {
                if let Err(e) = marker.wait() {
                    error!(executor = %self.name, reason = %e, "wait for submitted tasks failed");
                }
            }
            Err(e) => debug!(executor = %self.name, reason = %e, "nothing to wait for"),
        }
    }

    /// Close the queue, let queued tasks finish and join the worker.
    pub fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        // the worker exits on its own once the current task returns
        if let Some(worker) = worker.filter(|_| !self.is_worker_thread()) {
            if worker.join().is_err() {
                error!(executor = %self.name, "worker thread panicked");
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }

    fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub(crate) fn panic_reason(panic: &(dyn Any + Send)) -> &str {
    if let Some(reason) = panic.downcast_ref::<&str>() {
        reason
    } else if let Some(reason) = panic.downcast_ref::<String>() {
        reason.as_str()
    } else {
        "unknown panic"
    }
}
