//! Go-like wait groups.

use anyhow::Error;
use std::{
    any::Any,
    fmt::{self, Debug, Formatter},
    future::Future,
    mem::take,
    pin::pin,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};
use thiserror::Error;
use tokio::{
    sync::Notify,
    task::{JoinError, JoinHandle},
};


/// Output of a task run by a [`WaitGroup`], which may represent a failure
pub trait TaskOutput {
    /// Convert into success or the error the task failed with
    fn into_result(self) -> Result<(), Error>;
}

impl TaskOutput for () {
    fn into_result(self) -> Result<(), Error> {
        Ok(())
    }
}

impl<E: Into<Error>> TaskOutput for Result<(), E> {
    fn into_result(self) -> Result<(), Error> {
        self.map_err(Into::into)
    }
}

/// Way in which a task run by a [`WaitGroup`] failed
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task completed with an error
    #[error("task failed: {0:#}")]
    Failed(Error),
    /// The task panicked, with the panic message if it was a string
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The task was cancelled by the runtime before completing
    #[error("task was cancelled")]
    Cancelled,
}

impl From<JoinError> for TaskError {
    fn from(e: JoinError) -> Self {
        if e.is_panic() {
            TaskError::Panicked(panic_message(e.into_panic()))
        } else {
            TaskError::Cancelled
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(s) => s.to_string(),
            Err(_) => "<non-string panic payload>".to_string(),
        },
    }
}

/// Error for waiting on a [`WaitGroup`] in which some tasks failed
///
/// Holds every failure, ordered by the order in which the failed tasks were added to the group.
/// Displays as the first of them.
#[derive(Debug, Error)]
#[error("{}", describe(.failures))]
pub struct WaitError {
    // invariant: non-empty, sorted by index
    failures: Vec<(usize, TaskError)>,
}

impl WaitError {
    /// The failure of the earliest added task which failed, and that task's index
    pub fn first(&self) -> (usize, &TaskError) {
        let (index, error) = &self.failures[0];
        (*index, error)
    }

    /// Every failure, with the index of the task, ordered by index
    pub fn failures(&self) -> &[(usize, TaskError)] {
        &self.failures
    }

    /// Take every failure, with the index of the task, ordered by index
    pub fn into_failures(self) -> Vec<(usize, TaskError)> {
        self.failures
    }
}

fn describe(failures: &[(usize, TaskError)]) -> String {
    let (index, error) = &failures[0];
    let mut s = format!("task {} in wait group: {}", index, error);
    if failures.len() > 1 {
        s += &format!(" (and {} other failed tasks)", failures.len() - 1);
    }
    s
}


/// Tracks a set of spawned tasks and waits for all of them to finish
///
/// Handles are cheap to clone, and all clones refer to the same group, so tasks in the group may
/// themselves add more tasks to it.
#[derive(Clone)]
pub struct WaitGroup(Arc<Shared>);

struct Shared {
    lockable: Mutex<Lockable>,
    // number of spawned tasks which have not yet finished. kept outside the lock, since a task
    // may be dropped inside tokio::spawn.
    outstanding: AtomicUsize,
    // notified whenever outstanding drops to 0.
    idle: Notify,
}

struct Lockable {
    // tasks not yet joined, with their index.
    tasks: Vec<(usize, JoinHandle<Result<(), Error>>)>,
    // index to give the next task.
    next_index: usize,
    // set once wait has returned.
    finished: bool,
}

// decrements outstanding when the task finishes, however it finishes.
struct Outstanding(Arc<Shared>);

impl Drop for Outstanding {
    fn drop(&mut self) {
        if self.0.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Lockable> {
        self.lockable.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WaitGroup {
    /// Create a wait group with no tasks
    pub fn new() -> Self {
        WaitGroup(Arc::new(Shared {
            lockable: Mutex::new(Lockable {
                tasks: Vec::new(),
                next_index: 0,
                finished: false,
            }),
            outstanding: AtomicUsize::new(0),
            idle: Notify::new(),
        }))
    }

    /// Spawn `task` onto the tokio runtime as part of this group
    ///
    /// Panics if [`wait`](Self::wait) has already returned, or if not called from within a tokio
    /// runtime.
    pub fn go<F>(&self, task: F)
    where
        F: Future + Send + 'static,
        F::Output: TaskOutput,
    {
        let mut lock = self.0.lock();
        assert!(!lock.finished, "WaitGroup::go called after wait returned");
        self.0.outstanding.fetch_add(1, Ordering::AcqRel);
        let index = lock.next_index;
        lock.next_index += 1;
        let outstanding = Outstanding(Arc::clone(&self.0));
        let handle = tokio::spawn(async move {
            let _outstanding = outstanding;
            task.await.into_result()
        });
        lock.tasks.push((index, handle));
    }

    /// Number of tasks which have been added and have not yet finished
    pub fn outstanding(&self) -> usize {
        self.0.outstanding.load(Ordering::Acquire)
    }

    /// Wait until every task in the group has finished
    ///
    /// Errors if any task failed, with every failure. Returns immediately if the group has no
    /// tasks. Once this returns, no more tasks may be added.
    pub async fn wait(&self) -> Result<(), WaitError> {
        let mut failures = Vec::new();
        loop {
            // wait for outstanding to drop to 0
            loop {
                let mut idle = pin!(self.0.idle.notified());
                idle.as_mut().enable();
                if self.0.outstanding.load(Ordering::Acquire) == 0 {
                    break;
                }
                idle.await;
            }

            // join all tasks, unless more were added while joining
            let tasks = {
                let mut lock = self.0.lock();
                if lock.tasks.is_empty() {
                    lock.finished = true;
                    break;
                }
                take(&mut lock.tasks)
            };
            for (index, task) in tasks {
                let result = match task.await {
                    Ok(result) => result.map_err(TaskError::Failed),
                    Err(e) => Err(TaskError::from(e)),
                };
                if let Err(e) = result {
                    debug!(index, error = %e, "task in wait group failed");
                    failures.push((index, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            failures.sort_by_key(|&(index, _)| index);
            Err(WaitError { failures })
        }
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for WaitGroup {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("WaitGroup")
            .field("outstanding", &self.outstanding())
            .field("finished", &self.0.lock().finished)
            .finish_non_exhaustive()
    }
}
