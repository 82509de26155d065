//! Strict FIFO serialization in front of the injection backend.
//!
//! The backend steals focus and types into whatever is in front, so two
//! commands must never interleave. `InjectionQueue` owns the backend inside a
//! single worker task; callers enqueue an `Injection` and await its reply.
//! Order is fixed when `submit` is called, not when the returned future is
//! first polled.
//!
//! Every operation is bounded by the configured timeout; an elapsed timeout
//! is reported as `PlatformError::Injection` and the queue moves on.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::platform::{InputInjector, PlatformError};

// ---------------------------------------------------------------------------
// Injection
// ---------------------------------------------------------------------------

/// One backend operation, as requested by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injection {
    Escape,
    TextAndReturn(String),
    OptionWithMessage { option: String, message: String },
}

impl Injection {
    async fn run<I: InputInjector>(&self, backend: &mut I) -> Result<(), PlatformError> {
        match self {
            Injection::Escape => backend.send_escape().await,
            Injection::TextAndReturn(text) => backend.send_text_and_return(text).await,
            Injection::OptionWithMessage { option, message } => {
                backend.send_option_with_message(option, message).await
            }
        }
    }
}

struct Job {
    injection: Injection,
    reply: oneshot::Sender<Result<(), PlatformError>>,
}

// ---------------------------------------------------------------------------
// Queue handle
// ---------------------------------------------------------------------------

/// Cloneable handle to the single backend worker.
#[derive(Clone)]
pub struct InjectionQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl InjectionQueue {
    /// Moves `backend` into a worker task and returns the handle.
    ///
    /// The worker exits once every handle has been dropped.
    pub fn spawn<I>(backend: I, timeout: Duration) -> (Self, JoinHandle<()>)
    where
        I: InputInjector + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_queue(backend, rx, timeout));
        (Self { tx }, worker)
    }

    /// Enqueues `injection` now and returns a ticket for its outcome.
    pub fn submit(&self, injection: Injection) -> Ticket {
        let (reply, outcome) = oneshot::channel();
        let outcome = self
            .tx
            .send(Job { injection, reply })
            .ok()
            .map(|()| outcome);
        Ticket { outcome }
    }
}

/// A queued injection. Dropping it does not cancel the job.
pub struct Ticket {
    /// `None` when the worker was already gone at submission.
    outcome: Option<oneshot::Receiver<Result<(), PlatformError>>>,
}

impl Ticket {
    /// Waits for the backend to finish this job.
    pub async fn outcome(self) -> Result<(), PlatformError> {
        let Some(outcome) = self.outcome else {
            return Err(PlatformError::Injection("injection queue closed".into()));
        };
        outcome
            .await
            .map_err(|_| PlatformError::Injection("injection queue dropped the job".into()))?
    }
}

async fn run_queue<I: InputInjector>(
    mut backend: I,
    mut rx: mpsc::UnboundedReceiver<Job>,
    timeout: Duration,
) {
    while let Some(job) = rx.recv().await {
        let started = std::time::Instant::now();
        let result = match tokio::time::timeout(timeout, job.injection.run(&mut backend)).await {
            Ok(result) => result,
            Err(_) => Err(PlatformError::Injection(format!(
                "timed out after {:.1}s",
                timeout.as_secs_f64()
            ))),
        };
        log::debug!(
            "queue: {:?} finished in {:.2}ms",
            job.injection,
            started.elapsed().as_secs_f64() * 1000.0
        );
        let _ = job.reply.send(result);
    }
    log::debug!("queue: all handles dropped, worker exiting");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
