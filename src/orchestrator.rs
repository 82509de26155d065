//! Inbound message handling.
//!
//! Per message: filter (bot authors, allow-list, restricted channel) → parse →
//! pending marker → enqueue injection → outcome marker → audit log.
//! Filtered messages and unrecognized text end silently: no marker, no log.
//!
//! The listening loop enqueues injections in arrival order and then awaits
//! their outcomes on separate tasks, so the transport keeps reading while the
//! queue works. Only a backend initialization failure stops the loop.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;

use crate::command::{self, Command};
use crate::config::AuthorizationPolicy;
use crate::feedback::{FeedbackReporter, Marker};
use crate::messaging::{InboundMessage, MessageSource, Reactions};
use crate::platform::PlatformError;
use crate::queue::{Injection, InjectionQueue, Ticket};

/// Log target for the one-line-per-command audit trail.
pub const AUDIT_TARGET: &str = "keyrelay::audit";

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("keystroke backend unusable: {0}")]
    Backend(PlatformError),
}

/// Result of one injection, as reported to the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionResult {
    pub success: bool,
    pub error: Option<String>,
}

impl From<&Result<(), PlatformError>> for InjectionResult {
    fn from(result: &Result<(), PlatformError>) -> Self {
        match result {
            Ok(()) => Self {
                success: true,
                error: None,
            },
            Err(e) => Self {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Why the listening loop returned without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    Shutdown,
    SourceEnded,
}

/// Terminal state of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ignored,
    Completed(InjectionResult),
}

// ---------------------------------------------------------------------------
// Dispatch table
// ---------------------------------------------------------------------------

/// Maps a command to the backend operation that answers the prompt.
pub fn injection_for(command: &Command) -> Option<Injection> {
    match command {
        Command::Escape => Some(Injection::Escape),
        Command::Approve => Some(Injection::TextAndReturn("1".into())),
        Command::ApproveAll => Some(Injection::TextAndReturn("2".into())),
        // Nothing to type after the option: choose it and stop.
        Command::Deny(message) if message.is_empty() => {
            Some(Injection::TextAndReturn("3".into()))
        }
        Command::Deny(message) => Some(Injection::OptionWithMessage {
            option: "3".into(),
            message: message.clone(),
        }),
        Command::Unknown => None,
    }
}

fn describe(injection: &Injection) -> String {
    match injection {
        Injection::Escape => "sent escape".to_owned(),
        Injection::TextAndReturn(option) => format!("sent option {option}"),
        Injection::OptionWithMessage { option, message } => {
            format!("sent option {option} with message: {message:?}")
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<R> {
    policy: AuthorizationPolicy,
    queue: InjectionQueue,
    feedback: FeedbackReporter<R>,
}

impl<R: Reactions + 'static> Orchestrator<R> {
    pub fn new(policy: AuthorizationPolicy, queue: InjectionQueue, reactions: Arc<R>) -> Self {
        Self {
            policy,
            queue,
            feedback: FeedbackReporter::new(reactions),
        }
    }

    /// Filters and parses. `None` means the message is ignored.
    fn screen(&self, message: &InboundMessage) -> Option<(Command, Injection)> {
        if message.author_is_bot
            || !self.policy.sender_allowed(&message.author_id)
            || !self.policy.channel_allowed(&message.channel_id)
        {
            return None;
        }
        let command = command::parse(&message.content);
        let injection = injection_for(&command)?;
        Some((command, injection))
    }

    /// Screens `message` and, when it carries a command, marks it pending,
    /// writes the audit line, and enqueues the injection.
    ///
    /// The queue position is fixed when this returns. `None` means the
    /// message was ignored: nothing was marked, logged, or queued.
    async fn accept(&self, message: InboundMessage) -> Option<Accepted> {
        let (command, injection) = self.screen(&message)?;
        self.feedback.mark(&message, Marker::Pending).await;
        log::info!(
            target: AUDIT_TARGET,
            "[{}] command from {} ({}): {}",
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            message.author_name,
            message.author_id,
            message.content.trim()
        );
        let label = describe(&injection);
        let ticket = self.queue.submit(injection);
        Some(Accepted {
            message,
            command,
            label,
            ticket,
        })
    }

    /// Handles one message to completion.
    #[cfg(test)]
    async fn handle(&self, message: &InboundMessage) -> Result<Outcome, RelayError> {
        match self.accept(message.clone()).await {
            Some(accepted) => accepted.complete(self.feedback.clone()).await,
            None => Ok(Outcome::Ignored),
        }
    }

    /// Serves messages until the source ends, `shutdown` resolves, or the
    /// backend becomes unusable.
    ///
    /// Transport errors are logged and the loop keeps listening. Commands
    /// already enqueued always run to a final marker before this returns,
    /// including after a fatal backend error.
    pub async fn run<S, F>(&self, mut source: S, shutdown: F) -> Result<Stop, RelayError>
    where
        S: MessageSource,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut in_flight: JoinSet<Result<Outcome, RelayError>> = JoinSet::new();

        let mut result = loop {
            tokio::select! {
                () = &mut shutdown => {
                    log::info!("relay: shutdown requested");
                    break Ok(Stop::Shutdown);
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = check_joined(joined) {
                        break Err(e);
                    }
                }
                next = source.next_message() => match next {
                    Ok(Some(message)) => {
                        if let Some(accepted) = self.accept(message).await {
                            in_flight.spawn(accepted.complete(self.feedback.clone()));
                        }
                    }
                    Ok(None) => {
                        log::info!("relay: message source ended");
                        break Ok(Stop::SourceEnded);
                    }
                    Err(e) => log::error!("relay: transport error: {e}"),
                },
            }
        };

        if !in_flight.is_empty() {
            log::info!("relay: waiting for {} queued command(s)", in_flight.len());
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = check_joined(joined) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

/// A command whose injection is queued and whose message carries the
/// pending marker.
struct Accepted {
    message: InboundMessage,
    command: Command,
    label: String,
    ticket: Ticket,
}

impl Accepted {
    /// Waits for the injection, then places the outcome marker.
    async fn complete<R: Reactions>(
        self,
        feedback: FeedbackReporter<R>,
    ) -> Result<Outcome, RelayError> {
        let result = self.ticket.outcome().await;
        finish(&feedback, &self.message, &self.command, &self.label, result).await
    }
}

/// Marks the outcome and logs it. A fatal backend error is returned after the
/// failure marker is placed.
async fn finish<R: Reactions>(
    feedback: &FeedbackReporter<R>,
    message: &InboundMessage,
    command: &Command,
    label: &str,
    result: Result<(), PlatformError>,
) -> Result<Outcome, RelayError> {
    let report = InjectionResult::from(&result);
    match result {
        Ok(()) => {
            feedback.mark(message, Marker::Success).await;
            log::info!(target: AUDIT_TARGET, "  -> {label}");
        }
        Err(e) => {
            feedback.mark(message, Marker::Failure).await;
            log::error!(target: AUDIT_TARGET, "  -> failed ({}): {e}", command.label());
            if e.is_fatal() {
                return Err(RelayError::Backend(e));
            }
        }
    }
    Ok(Outcome::Completed(report))
}

fn check_joined(
    joined: Result<Result<Outcome, RelayError>, tokio::task::JoinError>,
) -> Result<(), RelayError> {
    match joined {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(e) => {
            log::error!("relay: command task failed: {e}");
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
