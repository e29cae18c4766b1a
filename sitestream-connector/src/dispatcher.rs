//! # Command Dispatcher
//!
//! The `Dispatcher` runs API calls on a fixed pool of background workers so
//! that callers never block on the network.
//!
//! ## Flow
//! A caller submits a [`Command`] through a [`DispatcherHandle`]. The command
//! lands in an unbounded FIFO queue shared by all workers; the first idle
//! worker takes it, awaits [`Transport::invoke`], and runs the command's
//! completion callback on the worker task.
//!
//! ## Guarantees
//! - `submit` never waits; it fails only with `QueueClosed` after `close`.
//! - Every accepted command completes exactly once: one of its callbacks is
//!   invoked, even if the transport panics.
//! - With one worker, commands start in submission order. With more, each
//!   command starts exactly once and nothing else is promised.
//! - No automatic retries. A failure is handed to the failure callback.

use crate::{
    config::ConnectorConfig,
    error::{ConnectorError, FailureKind, TransportFailure},
    transport::{CommandResult, Request, Response, Transport},
};
use futures::FutureExt;
use std::{
    panic::AssertUnwindSafe,
    sync::{Arc, PoisonError, RwLock},
};
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
};

pub type SuccessHandler = Box<dyn FnOnce(Response) + Send + 'static>;
pub type FailureHandler = Box<dyn FnOnce(TransportFailure) + Send + 'static>;

/// How a command reports its outcome.
pub enum Completion {
    /// Separate success and failure callbacks; exactly one of them fires.
    Split {
        on_success: SuccessHandler,
        on_failure: FailureHandler,
    },
    /// A single callback receiving the whole result.
    Result(Box<dyn FnOnce(CommandResult) + Send + 'static>),
}

impl Completion {
    fn complete(self, result: CommandResult) {
        match (self, result) {
            (Completion::Split { on_success, .. }, Ok(response)) => on_success(response),
            (Completion::Split { on_failure, .. }, Err(failure)) => on_failure(failure),
            (Completion::Result(callback), result) => callback(result),
        }
    }
}

/// One asynchronous API invocation plus its completion handler.
pub struct Command {
    request: Request,
    completion: Completion,
}

impl Command {
    pub fn new<S, F>(request: Request, on_success: S, on_failure: F) -> Self
    where
        S: FnOnce(Response) + Send + 'static,
        F: FnOnce(TransportFailure) + Send + 'static,
    {
        Self {
            request,
            completion: Completion::Split {
                on_success: Box::new(on_success),
                on_failure: Box::new(on_failure),
            },
        }
    }

    pub fn with_callback<C>(request: Request, callback: C) -> Self
    where
        C: FnOnce(CommandResult) + Send + 'static,
    {
        Self {
            request,
            completion: Completion::Result(Box::new(callback)),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

struct Shared {
    /// `None` once the dispatcher has been closed.
    queue_tx: RwLock<Option<mpsc::UnboundedSender<Command>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

/// A clonable handle for submitting commands and shutting the pool down.
#[derive(Clone)]
pub struct DispatcherHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl DispatcherHandle {
    /// Enqueues a command without waiting for it to start.
    pub fn submit(&self, command: Command) -> Result<(), ConnectorError> {
        let queue_tx = self
            .shared
            .queue_tx
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = queue_tx.as_ref() else {
            return Err(ConnectorError::QueueClosed);
        };
        tx.send(command).map_err(|_| ConnectorError::QueueClosed)
    }

    /// Submits `request`; exactly one of the callbacks fires on a worker.
    pub fn submit_async<S, F>(
        &self,
        request: Request,
        on_success: S,
        on_failure: F,
    ) -> Result<(), ConnectorError>
    where
        S: FnOnce(Response) + Send + 'static,
        F: FnOnce(TransportFailure) + Send + 'static,
    {
        self.submit(Command::new(request, on_success, on_failure))
    }

    /// Submits `request` and returns a receiver for its result.
    pub fn call(&self, request: Request) -> Result<oneshot::Receiver<CommandResult>, ConnectorError> {
        let (tx, rx) = oneshot::channel();
        self.submit(Command::with_callback(request, move |result| {
            // The caller may have stopped waiting.
            let _ = tx.send(result);
        }))?;
        Ok(rx)
    }

    pub fn is_closed(&self) -> bool {
        self.shared
            .queue_tx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Rejects further submissions, lets every accepted command finish, and
    /// waits for the workers to exit. Safe to call more than once; every
    /// caller returns only after the drain.
    pub async fn close(&self) {
        let queue_tx = self
            .shared
            .queue_tx
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if queue_tx.is_some() {
            tracing::info!("Dispatcher closing, draining queued commands.");
        }
        drop(queue_tx);

        let mut workers = self.shared.workers.lock().await;
        for worker in workers.drain(..) {
            if let Err(e) = worker.await {
                tracing::error!("Dispatcher worker exited abnormally: {}", e);
            }
        }
    }
}

/// The background worker pool executing commands against a [`Transport`].
pub struct Dispatcher;

impl Dispatcher {
    /// Spawns `config.dispatcher.worker_count` workers and returns the handle
    /// used to feed them. Must be called from within a tokio runtime.
    pub fn spawn(config: &ConnectorConfig, transport: Arc<dyn Transport>) -> DispatcherHandle {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let rest_base_url: Arc<str> = Arc::from(config.endpoints.rest_base_url.as_str());
        let worker_count = config.dispatcher.worker_count.max(1);

        let workers = (0..worker_count)
            .map(|id| {
                let worker = Worker {
                    id,
                    queue_rx: queue_rx.clone(),
                    transport: transport.clone(),
                    rest_base_url: rest_base_url.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        tracing::info!(workers = worker_count, "Dispatcher started.");
        DispatcherHandle {
            shared: Arc::new(Shared {
                queue_tx: RwLock::new(Some(queue_tx)),
                workers: Mutex::new(workers),
            }),
        }
    }
}

struct Worker {
    id: usize,
    queue_rx: Arc<Mutex<mpsc::UnboundedReceiver<Command>>>,
    transport: Arc<dyn Transport>,
    rest_base_url: Arc<str>,
}

impl Worker {
    async fn run(self) {
        loop {
            // The lock is released as soon as a command has been taken.
            let next = self.queue_rx.lock().await.recv().await;
            match next {
                Some(command) => self.execute(command).await,
                None => break,
            }
        }
        tracing::debug!(worker = self.id, "Dispatcher worker stopped.");
    }

    async fn execute(&self, command: Command) {
        let Command {
            mut request,
            completion,
        } = command;
        if request.base_url.is_empty() {
            request.base_url = self.rest_base_url.to_string();
        }
        tracing::debug!(worker = self.id, operation = %request.operation, "Executing command");

        let result = AssertUnwindSafe(self.transport.invoke(&request))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(TransportFailure::new(
                    FailureKind::Other,
                    "transport panicked while handling the request",
                ))
            });

        if let Err(failure) = &result {
            tracing::debug!(
                worker = self.id,
                operation = %request.operation,
                error = %failure,
                "Command failed"
            );
        }

        let completed =
            std::panic::catch_unwind(AssertUnwindSafe(move || completion.complete(result)));
        if completed.is_err() {
            tracing::error!(
                worker = self.id,
                operation = %request.operation,
                "Completion handler panicked"
            );
        }
    }
}
