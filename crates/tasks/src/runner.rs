use std::future::Future;
use std::ops::ControlFlow;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use tokio::task::JoinError;
use tracing::debug;

/// Type-erased task factory, handy when the tasks of one run differ in type.
pub type BoxTask<T, E> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, E>> + Send>;

/// Outcome of one task under the settled policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> TaskResult<T, E> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, TaskResult::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, TaskResult::Rejected(_))
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            TaskResult::Fulfilled(v) => Ok(v),
            TaskResult::Rejected(e) => Err(e),
        }
    }
}

impl<T, E> From<Result<T, E>> for TaskResult<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(v) => TaskResult::Fulfilled(v),
            Err(e) => TaskResult::Rejected(e),
        }
    }
}

/// Runs `tasks` with at most `limit` in flight, failing fast.
///
/// Results are returned in input order. On the first failure no further
/// task is launched and that failure is returned; tasks that are already
/// running keep running detached and their results are discarded.
///
/// A `limit` of 0 is treated as 1. A task that panics resumes the panic here.
pub async fn run_limited<T, E, F, Fut>(tasks: Vec<F>, limit: usize) -> Result<Vec<T>, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let total = tasks.len();
    let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
    let mut failure = None;

    drive(tasks, limit, |index, outcome| match outcome {
        Ok(value) => {
            slots[index] = Some(value);
            ControlFlow::Continue(())
        }
        Err(e) => {
            failure = Some(e);
            ControlFlow::Break(())
        }
    })
    .await;

    if let Some(e) = failure {
        return Err(e);
    }
    // Without a failure every slot has been filled.
    Ok(slots.into_iter().flatten().collect())
}

/// Runs `tasks` with at most `limit` in flight and waits for all of them.
///
/// Never fails: every outcome is reported at its input index.
pub async fn run_settled<T, E, F, Fut>(tasks: Vec<F>, limit: usize) -> Vec<TaskResult<T, E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let total = tasks.len();
    let mut slots: Vec<Option<TaskResult<T, E>>> = (0..total).map(|_| None).collect();

    drive(tasks, limit, |index, outcome| {
        slots[index] = Some(outcome.into());
        ControlFlow::Continue(())
    })
    .await;

    slots.into_iter().flatten().collect()
}

/// Shared scheduling loop.
///
/// Launches tasks while fewer than `limit` are running, and hands each
/// settled outcome to `settle` with its input index. Stops launching and
/// returns as soon as `settle` breaks; dropping the join handles detaches
/// whatever is still in flight.
async fn drive<T, E, F, Fut, S>(tasks: Vec<F>, limit: usize, mut settle: S)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    S: FnMut(usize, Result<T, E>) -> ControlFlow<()>,
{
    let total = tasks.len();
    let limit = limit.max(1);
    let mut pending = tasks.into_iter().enumerate();
    let mut in_flight = FuturesUnordered::new();
    let mut finished = 0usize;

    loop {
        while in_flight.len() < limit {
            let Some((index, task)) = pending.next() else {
                break;
            };
            let handle = tokio::spawn(task());
            in_flight.push(async move { (index, handle.await) });
        }

        let Some((index, joined)) = in_flight.next().await else {
            break;
        };
        finished += 1;

        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => resume_panic(e),
        };
        if settle(index, outcome).is_break() {
            debug!(
                index,
                finished,
                total,
                detached = in_flight.len(),
                "task failed, no further tasks will be launched"
            );
            return;
        }
    }
}

fn resume_panic(err: JoinError) -> ! {
    match err.try_into_panic() {
        Ok(payload) => std::panic::resume_unwind(payload),
        Err(err) => panic!("task was cancelled by the runtime: {err}"),
    }
}
