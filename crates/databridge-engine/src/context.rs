//! The engine execution context: a dedicated thread that owns the facade.
//!
//! Engine objects are not safe for concurrent mutation, so the facade is
//! moved onto one OS thread and every access is a job sent through a
//! bounded queue. The network side awaits the reply without blocking any
//! other session's I/O.
//!
//! This is the actor pattern: [`EngineContextHandle`] is the cheap,
//! cloneable sender half; the thread loop is the actor.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::{ChangeNotice, EngineError, EngineFacade};

/// Buffered change notices per subscriber before it starts lagging.
const CHANGE_BUFFER: usize = 1024;

enum JobOutcome {
    Ran,
    /// The requester went away before the job reached the front of the
    /// queue.
    Skipped,
}

type Job = Box<dyn FnOnce(&mut dyn EngineFacade) -> JobOutcome + Send>;

enum Task {
    Run(Job),
    Stop,
}

/// Handle to the engine context. Used to run work on it.
///
/// Cheap to clone: it's an `mpsc::Sender` plus a `broadcast::Sender`.
#[derive(Clone)]
pub struct EngineContextHandle {
    sender: mpsc::Sender<Task>,
    changes: broadcast::Sender<ChangeNotice>,
}

impl EngineContextHandle {
    /// Runs `f` on the engine context and returns its result.
    ///
    /// Waits for queue space when the context is saturated. If this future
    /// is dropped before the job starts, the job is skipped; once started
    /// it runs to completion and its result is discarded.
    ///
    /// # Errors
    /// - whatever `f` returns
    /// - [`EngineError::Panicked`] if `f` panicked
    /// - [`EngineError::Unavailable`] if the context has stopped
    pub async fn call<R, F>(&self, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&mut dyn EngineFacade) -> Result<R, EngineError>
            + Send
            + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |facade: &mut dyn EngineFacade| {
            if reply_tx.is_closed() {
                return JobOutcome::Skipped;
            }
            let result = panic::catch_unwind(AssertUnwindSafe(|| f(facade)))
                .unwrap_or_else(|payload| {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(%message, "engine job panicked");
                    Err(EngineError::Panicked(message))
                });
            // The requester may have timed out meanwhile.
            let _ = reply_tx.send(result);
            JobOutcome::Ran
        });

        self.sender.send(Task::Run(job)).await.map_err(|_| {
            EngineError::Unavailable("engine context stopped".into())
        })?;
        reply_rx.await.map_err(|_| {
            EngineError::Unavailable("engine context dropped the job".into())
        })?
    }

    /// Subscribes to change notices published after each job.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.changes.subscribe()
    }

    /// Returns `true` once the context thread has exited.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Owner of the engine context thread.
pub struct EngineContext {
    handle: EngineContextHandle,
    thread: Option<JoinHandle<()>>,
}

impl EngineContext {
    /// Moves `facade` onto a new `engine-context` thread.
    ///
    /// `queue_capacity` bounds the number of waiting jobs; callers beyond
    /// it wait in [`EngineContextHandle::call`].
    ///
    /// # Errors
    /// [`EngineError::Unavailable`] if the thread cannot be spawned.
    pub fn start<F: EngineFacade>(
        facade: F,
        queue_capacity: usize,
    ) -> Result<Self, EngineError> {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        let thread_changes = changes.clone();

        let thread = std::thread::Builder::new()
            .name("engine-context".into())
            .spawn(move || run(Box::new(facade), receiver, thread_changes))
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        Ok(Self {
            handle: EngineContextHandle { sender, changes },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> EngineContextHandle {
        self.handle.clone()
    }

    /// Stops the thread after the jobs already queued, then joins it.
    pub async fn shutdown(mut self) {
        let _ = self.handle.sender.send(Task::Stop).await;
        if let Some(thread) = self.thread.take() {
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => {}
                _ => tracing::error!("engine context thread did not exit cleanly"),
            }
        }
    }
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        if self.thread.is_some() {
            // Not shut down explicitly; let the thread exit on its own.
            let _ = self.handle.sender.try_send(Task::Stop);
        }
    }
}

fn run(
    mut facade: Box<dyn EngineFacade>,
    mut receiver: mpsc::Receiver<Task>,
    changes: broadcast::Sender<ChangeNotice>,
) {
    tracing::info!("engine context started");

    while let Some(task) = receiver.blocking_recv() {
        let job = match task {
            Task::Run(job) => job,
            Task::Stop => break,
        };
        if let JobOutcome::Skipped = job(facade.as_mut()) {
            tracing::debug!("skipped engine job, requester is gone");
        }
        for notice in facade.drain_changes() {
            // No subscribers is fine.
            let _ = changes.send(notice);
        }
    }

    tracing::info!("engine context stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{ChangeTopic, EngineRef, MemoryEngine};

    fn start() -> EngineContext {
        EngineContext::start(MemoryEngine::sample(), 8).expect("should start")
    }

    #[tokio::test]
    async fn test_call_runs_on_engine_thread() {
        let ctx = start();
        let name = ctx
            .handle()
            .call(|_facade| {
                Ok(std::thread::current().name().map(str::to_string))
            })
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some("engine-context"));
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_call_propagates_facade_error() {
        let ctx = start();
        let result = ctx
            .handle()
            .call(|facade| facade.resolve(&EngineRef::Asset("/Game/Nope".into())))
            .await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_call_panicking_job_is_isolated() {
        let ctx = start();
        let handle = ctx.handle();
        let result: Result<(), _> =
            handle.call(|_facade| panic!("corrupt asset")).await;
        assert!(matches!(
            result,
            Err(EngineError::Panicked(ref msg)) if msg.contains("corrupt asset")
        ));
        // The context keeps serving.
        let status = handle.call(|facade| Ok(facade.status())).await.unwrap();
        assert!(status.asset_registry_ready);
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_call_dropped_before_start_is_skipped() {
        let ctx = start();
        let handle = ctx.handle();

        // Occupy the engine thread.
        let busy = tokio::spawn({
            let handle = handle.clone();
            async move {
                handle
                    .call(|_facade| {
                        std::thread::sleep(Duration::from_millis(150));
                        Ok(())
                    })
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Queue a mutation, then give up on it while it is still queued.
        let gave_up = tokio::time::timeout(
            Duration::from_millis(20),
            handle.call(|facade| facade.register_gameplay_tag("Test.Skipped", "")),
        )
        .await;
        assert!(gave_up.is_err());

        busy.await.unwrap().unwrap();
        let tags = handle.call(|facade| Ok(facade.gameplay_tags())).await.unwrap();
        assert!(tags.iter().all(|t| t.tag != "Test.Skipped"));
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_subscribe_receives_changes_after_job() {
        let ctx = start();
        let handle = ctx.handle();
        let mut changes = handle.subscribe();

        handle
            .call(|facade| facade.register_gameplay_tag("Item.Weapon.Axe", "axes"))
            .await
            .unwrap();

        let notice = changes.recv().await.unwrap();
        assert_eq!(notice.topic, ChangeTopic::GameplayTag);
        assert_eq!(notice.path, "Item.Weapon.Axe");
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_call_after_shutdown_returns_unavailable() {
        let ctx = start();
        let handle = ctx.handle();
        ctx.shutdown().await;
        let result = handle.call(|facade| Ok(facade.status())).await;
        assert!(matches!(result, Err(EngineError::Unavailable(_))));
        assert!(handle.is_closed());
    }
}
