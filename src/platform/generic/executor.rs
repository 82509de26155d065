//! Generic executor: enigo keyboard on a dedicated worker thread.
//!
//! `GenericBackend` implements `InputInjector`. Nothing heavy happens in
//! `new()`. The first operation spawns a background thread that opens the
//! platform keyboard connection and then loops waiting for key jobs. Each job
//! carries a `oneshot` reply so the async caller learns the outcome.
//!
//! If the connection cannot be opened, the failure is remembered and every
//! later call returns the same `PlatformError::Initialization`.

use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use tokio::sync::{mpsc, oneshot};

use super::keycodes::{name_to_key, resolve_verbatim, KeyName};
use crate::platform::{InputInjector, PlatformError};

/// Pause after every synthetic input so slow targets keep up.
const AUTO_DELAY: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Keyboard seam
// ---------------------------------------------------------------------------

/// The subset of a synthetic keyboard the worker needs.
///
/// Lives on the worker thread only, so it need not be `Send`.
trait KeySink {
    fn text(&mut self, text: &str) -> Result<(), String>;
    fn click(&mut self, key: Key) -> Result<(), String>;
}

impl KeySink for Enigo {
    fn text(&mut self, text: &str) -> Result<(), String> {
        Keyboard::text(self, text).map_err(|e| e.to_string())
    }

    fn click(&mut self, key: Key) -> Result<(), String> {
        self.key(key, Direction::Click).map_err(|e| e.to_string())
    }
}

/// Opens the keyboard connection. Runs on the worker thread.
type Connect = fn() -> Result<Box<dyn KeySink>, String>;

fn connect_enigo() -> Result<Box<dyn KeySink>, String> {
    Enigo::new(&Settings::default())
        .map(|e| Box::new(e) as Box<dyn KeySink>)
        .map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Internal job type
// ---------------------------------------------------------------------------

enum KeyOp {
    Text(String),
    Key(KeyName),
}

struct KeyJob {
    op: KeyOp,
    reply: oneshot::Sender<Result<(), PlatformError>>,
}

// ---------------------------------------------------------------------------
// Public struct
// ---------------------------------------------------------------------------

enum State {
    /// No connection attempted yet.
    Idle,
    Ready(mpsc::UnboundedSender<KeyJob>),
    /// Connection failed; the message is replayed on every call.
    Failed(String),
}

/// Injects keys through enigo, connecting lazily on first use.
pub struct GenericBackend {
    connect: Connect,
    state: State,
}

impl GenericBackend {
    pub fn new() -> Self {
        log::info!("generic: synthetic keyboard backend (connects on first command)");
        Self::with_connector(connect_enigo)
    }

    fn with_connector(connect: Connect) -> Self {
        Self {
            connect,
            state: State::Idle,
        }
    }

    /// Returns the job channel, starting the worker on first call.
    async fn worker(&mut self) -> Result<&mpsc::UnboundedSender<KeyJob>, PlatformError> {
        if let State::Idle = self.state {
            self.state = match start_worker(self.connect).await {
                Ok(tx) => {
                    log::info!("generic: keyboard connection ready");
                    State::Ready(tx)
                }
                Err(detail) => {
                    let message = format!("{detail}. {}", remediation());
                    log::error!("generic: {message}");
                    State::Failed(message)
                }
            };
        }

        match &self.state {
            State::Ready(tx) => Ok(tx),
            State::Failed(message) => Err(PlatformError::Initialization(message.clone())),
            State::Idle => Err(PlatformError::Initialization(
                "keyboard worker not started".into(),
            )),
        }
    }

    async fn submit(&mut self, op: KeyOp) -> Result<(), PlatformError> {
        let tx = self.worker().await?;
        let (reply, outcome) = oneshot::channel();
        tx.send(KeyJob { op, reply })
            .map_err(|_| PlatformError::Injection("keyboard worker stopped".into()))?;
        outcome
            .await
            .map_err(|_| PlatformError::Injection("keyboard worker stopped".into()))?
    }
}

impl Default for GenericBackend {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// InputInjector trait impl
// ---------------------------------------------------------------------------

#[async_trait]
impl InputInjector for GenericBackend {
    async fn send_escape(&mut self) -> Result<(), PlatformError> {
        self.submit(KeyOp::Key(KeyName::Mapped(Key::Escape))).await
    }

    async fn send_text(&mut self, text: &str) -> Result<(), PlatformError> {
        self.submit(KeyOp::Text(text.to_owned())).await
    }

    async fn send_return(&mut self) -> Result<(), PlatformError> {
        self.submit(KeyOp::Key(KeyName::Mapped(Key::Return))).await
    }

    async fn send_key(&mut self, name: &str) -> Result<(), PlatformError> {
        self.submit(KeyOp::Key(name_to_key(name))).await
    }
}

// ---------------------------------------------------------------------------
// Worker thread
// ---------------------------------------------------------------------------

/// Spawns the worker and waits until it reports whether the keyboard opened.
async fn start_worker(connect: Connect) -> Result<mpsc::UnboundedSender<KeyJob>, String> {
    let (job_tx, job_rx) = mpsc::unbounded_channel::<KeyJob>();
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();

    thread::Builder::new()
        .name("keyrelay-keyboard".into())
        .spawn(move || run_worker(connect, job_rx, ready_tx))
        .map_err(|e| format!("failed to start keyboard thread: {e}"))?;

    match ready_rx.await {
        Ok(Ok(())) => Ok(job_tx),
        Ok(Err(detail)) => Err(format!("failed to open keyboard: {detail}")),
        Err(_) => Err("keyboard thread exited during startup".into()),
    }
}

/// Owns the keyboard until the job channel closes (backend dropped).
fn run_worker(
    connect: Connect,
    mut job_rx: mpsc::UnboundedReceiver<KeyJob>,
    ready_tx: oneshot::Sender<Result<(), String>>,
) {
    let mut sink = match connect() {
        Ok(sink) => {
            let _ = ready_tx.send(Ok(()));
            sink
        }
        Err(detail) => {
            let _ = ready_tx.send(Err(detail));
            return;
        }
    };

    while let Some(job) = job_rx.blocking_recv() {
        // The caller gave up (operation timeout) while this job waited behind
        // a slow one. Typing it now would land after the failure was reported.
        if job.reply.is_closed() {
            log::warn!("generic: dropping abandoned key job");
            continue;
        }
        let result = match job.op {
            KeyOp::Text(text) => sink.text(&text).map_err(PlatformError::Injection),
            KeyOp::Key(KeyName::Mapped(key)) => sink.click(key).map_err(PlatformError::Injection),
            KeyOp::Key(KeyName::Verbatim(name)) => resolve_verbatim(&name)
                .and_then(|key| sink.click(key).map_err(PlatformError::Injection)),
        };
        thread::sleep(AUTO_DELAY);
        if job.reply.send(result).is_err() {
            log::warn!("generic: key job finished after its caller timed out");
        }
    }

    log::debug!("generic: job channel closed, keyboard worker exiting");
}

/// Platform-specific hint appended to initialization failures.
fn remediation() -> &'static str {
    if cfg!(target_os = "macos") {
        "Grant Accessibility permission in System Settings > Privacy & Security > Accessibility"
    } else if cfg!(target_os = "linux") {
        "An X11 session or Wayland with XWayland is required (check that DISPLAY is set)"
    } else {
        "Check that the process runs in an interactive desktop session"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
