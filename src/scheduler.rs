//! Execution of deferred computation graphs
//!
//! Chunked arrays never compute anything when a reduction is requested. They
//! return a [`Deferred`] graph: independent partial tasks (one per chunk) and a
//! combine step. A [`Scheduler`] runs the partial tasks, possibly in parallel,
//! and the caller blocks until the combined value is available.
//!
//! Two schedulers are provided:
//! - [`ThreadPoolScheduler`] runs tasks on a dedicated Rayon pool
//! - [`AsyncScheduler`] runs tasks as blocking jobs on a Tokio runtime

use crate::errors::{Result, SkimError};
use crate::parallel::ParallelConfig;
use rayon::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

/// A unit of work producing one partial result
pub type Task<T> = Box<dyn FnOnce() -> Result<T> + Send>;

/// An executor for independent tasks
///
/// Implementations must return results in task order and must propagate the
/// first task error unchanged. A panicking task is reported as
/// [`SkimError::Execution`].
pub trait Scheduler: Send + Sync {
    /// Runs every task and returns their results in order
    ///
    /// # Errors
    ///
    /// Returns the error of a failing task, or an execution error if a task
    /// could not be run at all.
    fn execute<T: Send + 'static>(&self, tasks: Vec<Task<T>>) -> Result<Vec<T>>;
}

/// A deferred computation: partial tasks plus the step that combines them
pub struct Deferred<P, T> {
    label: String,
    tasks: Vec<Task<P>>,
    combine: Box<dyn FnOnce(Vec<P>) -> Result<T> + Send>,
}

impl<P: Send + 'static, T> Deferred<P, T> {
    pub fn new(
        label: impl Into<String>,
        tasks: Vec<Task<P>>,
        combine: impl FnOnce(Vec<P>) -> Result<T> + Send + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            tasks,
            combine: Box::new(combine),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of partial tasks in the graph
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Executes the graph on `scheduler` and blocks until the value is ready
    ///
    /// # Errors
    ///
    /// Task and combine errors are returned as produced.
    pub fn compute<S: Scheduler + ?Sized>(self, scheduler: &S) -> Result<T> {
        debug!(graph = %self.label(), tasks = self.len(), "executing deferred graph");
        let partials = scheduler.execute(self.tasks)?;
        (self.combine)(partials)
    }
}

impl<P, T> std::fmt::Debug for Deferred<P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("label", &self.label)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

/// A value that is either available now or after executing a graph
#[derive(Debug)]
pub enum Pending<P, T> {
    Ready(T),
    Deferred(Deferred<P, T>),
}

impl<P: Send + 'static, T> Pending<P, T> {
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self, Pending::Deferred(_))
    }

    /// Returns the value, executing the graph on `scheduler` if needed
    ///
    /// # Errors
    ///
    /// Propagates errors from deferred execution unchanged.
    pub fn resolve<S: Scheduler + ?Sized>(self, scheduler: &S) -> Result<T> {
        match self {
            Pending::Ready(value) => Ok(value),
            Pending::Deferred(graph) => graph.compute(scheduler),
        }
    }
}

/// Scheduler backed by a dedicated Rayon thread pool
pub struct ThreadPoolScheduler {
    pool: rayon::ThreadPool,
}

impl ThreadPoolScheduler {
    /// Builds a pool following `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created.
    pub fn new(config: &ParallelConfig) -> Result<Self> {
        Ok(Self {
            pool: config.build_pool()?,
        })
    }

    #[must_use]
    pub fn current_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Scheduler for ThreadPoolScheduler {
    fn execute<T: Send + 'static>(&self, tasks: Vec<Task<T>>) -> Result<Vec<T>> {
        self.pool.install(|| {
            tasks
                .into_par_iter()
                .map(|task| {
                    panic::catch_unwind(AssertUnwindSafe(task)).unwrap_or_else(|payload| {
                        Err(SkimError::execution("pool task", panic_message(payload.as_ref())))
                    })
                })
                .collect()
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("task panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("task panicked: {message}")
    } else {
        "task panicked".to_string()
    }
}

/// Scheduler backed by a Tokio multi-threaded runtime
///
/// Tasks are CPU bound, so each one runs on the runtime's blocking pool.
/// `execute` blocks the calling thread and therefore must not be called from
/// inside another Tokio runtime.
pub struct AsyncScheduler {
    runtime: tokio::runtime::Runtime,
}

impl AsyncScheduler {
    /// Builds a runtime with `config.num_threads` workers (or Tokio's default)
    ///
    /// # Errors
    ///
    /// Returns an error for a zero thread count or if the runtime cannot be
    /// started.
    pub fn new(config: &ParallelConfig) -> Result<Self> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        if let Some(threads) = config.num_threads {
            if threads == 0 {
                return Err(SkimError::ThreadPoolError(
                    "Thread count must be at least 1".to_string(),
                ));
            }
            builder.worker_threads(threads).max_blocking_threads(threads);
        }
        let runtime = builder
            .thread_name("raster-skim-worker")
            .build()
            .map_err(|e| SkimError::ThreadPoolError(format!("Failed to start runtime: {e}")))?;
        Ok(Self { runtime })
    }
}

impl Scheduler for AsyncScheduler {
    fn execute<T: Send + 'static>(&self, tasks: Vec<Task<T>>) -> Result<Vec<T>> {
        self.runtime.block_on(async {
            let handles = tasks
                .into_iter()
                .map(|task| tokio::task::spawn_blocking(task));
            match futures::future::try_join_all(handles).await {
                Ok(joined) => joined.into_iter().collect::<Result<Vec<T>>>(),
                Err(e) => Err(SkimError::execution("blocking task", e.to_string())),
            }
        })
    }
}
