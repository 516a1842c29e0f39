//! Bounded-concurrency map over argument lists
//!
//! [`ParallelExecutor`] runs a function once per argument with at most
//! `n_workers` invocations in flight and returns one result per argument,
//! in input order regardless of completion order. Per-task failures are
//! captured at their index unless `raise_on_error` is set.

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use thiserror::Error;
use tracing::{debug, info};

/// Log progress every N completed tasks
const PROGRESS_LOG_INTERVAL: usize = 10;

/// Where task futures run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    /// Each invocation is spawned onto the tokio runtime and may run on any
    /// worker thread
    #[default]
    Thread,
    /// Invocations are polled concurrently on the calling task
    Inline,
}

/// Failure of one task
#[derive(Debug, Error)]
pub enum TaskError<E> {
    /// The function returned an error
    #[error("{0}")]
    Failed(E),

    #[error("Task panicked: {0}")]
    Panicked(String),

    /// The runtime dropped the task before it finished
    #[error("Task cancelled")]
    Cancelled,
}

impl<E> TaskError<E> {
    /// The function's own error, if that is what failed
    pub fn failed(&self) -> Option<&E> {
        match self {
            TaskError::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Executor errors
#[derive(Debug, Error)]
pub enum ExecutorError<E> {
    /// Invalid call; raised before any task is scheduled
    #[error("Executor configuration error: {0}")]
    Configuration(String),

    /// First task error, when `raise_on_error` is set
    #[error("Task {index} failed: {error}")]
    Task { index: usize, error: TaskError<E> },
}

/// Per-index outcome
pub type TaskResult<T, E> = Result<T, TaskError<E>>;

/// Executor settings
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub n_workers: usize,
    pub strategy: ExecutionStrategy,
    pub show_progress: bool,
    pub description: String,
    pub raise_on_error: bool,
}

impl ExecutorOptions {
    pub fn new(n_workers: usize) -> Self {
        Self {
            n_workers,
            strategy: ExecutionStrategy::default(),
            show_progress: false,
            description: "Processing".to_string(),
            raise_on_error: false,
        }
    }

    pub fn strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn show_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn raise_on_error(mut self, raise_on_error: bool) -> Self {
        self.raise_on_error = raise_on_error;
        self
    }
}

/// Completion counter with optional progress bar
struct Progress<'a> {
    description: &'a str,
    total: usize,
    completed: usize,
    bar: Option<ProgressBar>,
}

impl<'a> Progress<'a> {
    fn new(description: &'a str, total: usize, show_bar: bool) -> Self {
        let bar = show_bar.then(|| {
            let bar = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar.set_message(description.to_string());
            bar
        });

        Self {
            description,
            total,
            completed: 0,
            bar,
        }
    }

    fn tick(&mut self) {
        self.completed += 1;
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
        if self.completed % PROGRESS_LOG_INTERVAL == 0 || self.completed == self.total {
            info!(
                description = self.description,
                progress = format!("{}/{}", self.completed, self.total),
                "Parallel progress update"
            );
        }
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    fn abandon(&self) {
        if let Some(bar) = &self.bar {
            bar.abandon();
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

async fn run_task<Fut, T, E>(strategy: ExecutionStrategy, task: Fut) -> TaskResult<T, E>
where
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    match strategy {
        ExecutionStrategy::Inline => match AssertUnwindSafe(task).catch_unwind().await {
            Ok(result) => result.map_err(TaskError::Failed),
            Err(payload) => Err(TaskError::Panicked(panic_message(payload))),
        },
        ExecutionStrategy::Thread => match tokio::spawn(task).await {
            Ok(result) => result.map_err(TaskError::Failed),
            Err(join_error) if join_error.is_panic() => {
                Err(TaskError::Panicked(panic_message(join_error.into_panic())))
            }
            Err(_) => Err(TaskError::Cancelled),
        },
    }
}

/// Pair up positional and keyword argument lists
///
/// At least one list is required; a missing one is filled with defaults.
fn align_arguments<A, K, E>(
    args_list: Option<Vec<A>>,
    kwargs_list: Option<Vec<K>>,
) -> Result<Vec<(A, K)>, ExecutorError<E>>
where
    A: Default,
    K: Default,
{
    match (args_list, kwargs_list) {
        (None, None) => Err(ExecutorError::Configuration(
            "args_list or kwargs_list must be provided".to_string(),
        )),
        (Some(args), Some(kwargs)) => {
            if args.len() != kwargs.len() {
                return Err(ExecutorError::Configuration(format!(
                    "args_list and kwargs_list must have the same length, got {} and {}",
                    args.len(),
                    kwargs.len()
                )));
            }
            Ok(args.into_iter().zip(kwargs).collect())
        }
        (Some(args), None) => Ok(args.into_iter().map(|a| (a, K::default())).collect()),
        (None, Some(kwargs)) => Ok(kwargs.into_iter().map(|k| (A::default(), k)).collect()),
    }
}

/// Bounded-concurrency executor
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    options: ExecutorOptions,
}

impl ParallelExecutor {
    pub fn new(options: ExecutorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Run `func` once per argument
    pub async fn execute<F, Fut, A, T, E>(
        &self,
        func: F,
        args_list: Vec<A>,
    ) -> Result<Vec<TaskResult<T, E>>, ExecutorError<E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let arguments = args_list.into_iter().map(|a| (a, ())).collect();
        self.run(arguments, |a, ()| func(a)).await
    }

    /// Run `func` once per (args, kwargs) pair
    ///
    /// Either list may be omitted and is then filled with default values;
    /// both omitted, or both given with different lengths, is a
    /// configuration error.
    pub async fn execute_with<F, Fut, A, K, T, E>(
        &self,
        func: F,
        args_list: Option<Vec<A>>,
        kwargs_list: Option<Vec<K>>,
    ) -> Result<Vec<TaskResult<T, E>>, ExecutorError<E>>
    where
        F: Fn(A, K) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        A: Default,
        K: Default,
        T: Send + 'static,
        E: Send + 'static,
    {
        let arguments = align_arguments(args_list, kwargs_list)?;
        self.run(arguments, func).await
    }

    async fn run<F, Fut, A, K, T, E>(
        &self,
        arguments: Vec<(A, K)>,
        func: F,
    ) -> Result<Vec<TaskResult<T, E>>, ExecutorError<E>>
    where
        F: Fn(A, K) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let options = &self.options;
        if options.n_workers == 0 {
            return Err(ExecutorError::Configuration(
                "n_workers must be at least 1".to_string(),
            ));
        }

        let total = arguments.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        debug!(
            description = %options.description,
            total,
            n_workers = options.n_workers,
            strategy = ?options.strategy,
            "Starting parallel execution"
        );

        let mut progress = Progress::new(&options.description, total, options.show_progress);
        let mut slots: Vec<Option<TaskResult<T, E>>> = (0..total).map(|_| None).collect();

        // The stream is lazy: `func` is only called once a worker slot frees
        let strategy = options.strategy;
        let mut completions = stream::iter(arguments.into_iter().enumerate())
            .map(|(index, (args, kwargs))| {
                // `func` may panic before it hands back a future
                let started = std::panic::catch_unwind(AssertUnwindSafe(|| func(args, kwargs)));
                async move {
                    let outcome = match started {
                        Ok(task) => run_task(strategy, task).await,
                        Err(payload) => Err(TaskError::Panicked(panic_message(payload))),
                    };
                    (index, outcome)
                }
            })
            .buffer_unordered(options.n_workers);

        while let Some((index, outcome)) = completions.next().await {
            progress.tick();

            if options.raise_on_error {
                if let Err(error) = outcome {
                    progress.abandon();
                    return Err(ExecutorError::Task { index, error });
                }
            }

            slots[index] = Some(outcome);
        }

        progress.finish();
        Ok(slots.into_iter().flatten().collect())
    }
}
