//! Platform abstraction layer.
//!
//! Defines the `InputInjector` trait (the keystroke capability every backend
//! provides) and `Backend`, the closed set of concrete implementations.
//! `select_backend` turns a `PlatformInfo` plus `BackendConfig` into exactly
//! one `Backend`.

mod detect;
mod generic;
mod macos;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::BackendConfig;

pub use detect::{choose_backend, BackendKind, PlatformInfo};
pub use generic::GenericBackend;
pub use macos::NativeBackend;

/// Pause between typing a line and pressing Return.
pub const TEXT_RETURN_DELAY: Duration = Duration::from_millis(100);

/// Pause between choosing an option and typing the follow-up message,
/// long enough for the target application to render its text prompt.
pub const FOLLOW_UP_DELAY: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// The backend cannot be used at all. Fatal for the process.
    #[error("backend initialization failed: {0}")]
    Initialization(String),

    /// One operation failed. The backend stays usable.
    #[error("injection failed: {0}")]
    Injection(String),
}

impl PlatformError {
    /// True when no further commands can be served.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlatformError::Initialization(_))
    }
}

// ---------------------------------------------------------------------------
// Injection capability
// ---------------------------------------------------------------------------

/// Keystroke injection into the foreground interactive session.
///
/// Operations are not idempotent: calling one twice sends the keys twice.
/// Callers must serialize access (see `queue::InjectionQueue`).
#[async_trait]
pub trait InputInjector: Send {
    async fn send_escape(&mut self) -> Result<(), PlatformError>;

    async fn send_text(&mut self, text: &str) -> Result<(), PlatformError>;

    async fn send_return(&mut self) -> Result<(), PlatformError>;

    /// Sends one logical key by name (`escape`, `enter`, `tab`, `up`, ...).
    async fn send_key(&mut self, name: &str) -> Result<(), PlatformError>;

    async fn send_text_and_return(&mut self, text: &str) -> Result<(), PlatformError> {
        self.send_text(text).await?;
        tokio::time::sleep(TEXT_RETURN_DELAY).await;
        self.send_return().await
    }

    /// Picks `option`, waits for the follow-up prompt, then types `message`.
    async fn send_option_with_message(
        &mut self,
        option: &str,
        message: &str,
    ) -> Result<(), PlatformError> {
        self.send_text_and_return(option).await?;
        tokio::time::sleep(FOLLOW_UP_DELAY).await;
        self.send_text_and_return(message).await
    }
}

// ---------------------------------------------------------------------------
// Concrete backends
// ---------------------------------------------------------------------------

/// The backend chosen at startup.
pub enum Backend {
    Native(NativeBackend),
    Generic(GenericBackend),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Native(_) => BackendKind::Native,
            Backend::Generic(_) => BackendKind::Generic,
        }
    }
}

#[async_trait]
impl InputInjector for Backend {
    async fn send_escape(&mut self) -> Result<(), PlatformError> {
        match self {
            Backend::Native(b) => b.send_escape().await,
            Backend::Generic(b) => b.send_escape().await,
        }
    }

    async fn send_text(&mut self, text: &str) -> Result<(), PlatformError> {
        match self {
            Backend::Native(b) => b.send_text(text).await,
            Backend::Generic(b) => b.send_text(text).await,
        }
    }

    async fn send_return(&mut self) -> Result<(), PlatformError> {
        match self {
            Backend::Native(b) => b.send_return().await,
            Backend::Generic(b) => b.send_return().await,
        }
    }

    async fn send_key(&mut self, name: &str) -> Result<(), PlatformError> {
        match self {
            Backend::Native(b) => b.send_key(name).await,
            Backend::Generic(b) => b.send_key(name).await,
        }
    }

    async fn send_text_and_return(&mut self, text: &str) -> Result<(), PlatformError> {
        match self {
            Backend::Native(b) => b.send_text_and_return(text).await,
            Backend::Generic(b) => b.send_text_and_return(text).await,
        }
    }

    async fn send_option_with_message(
        &mut self,
        option: &str,
        message: &str,
    ) -> Result<(), PlatformError> {
        match self {
            Backend::Native(b) => b.send_option_with_message(option, message).await,
            Backend::Generic(b) => b.send_option_with_message(option, message).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Builds the backend for this host.
///
/// The choice is final: construction errors are returned to the caller rather
/// than retried with the other backend.
pub fn select_backend(
    info: &PlatformInfo,
    config: &BackendConfig,
) -> Result<Backend, PlatformError> {
    let selection = choose_backend(info.os, config.method);
    if let Some(warning) = &selection.warning {
        log::warn!("selector: {warning}");
    }
    log::info!(
        "selector: platform {}, method {}, using {} backend",
        info.os,
        config.method,
        selection.kind
    );

    match selection.kind {
        BackendKind::Native => NativeBackend::new(&config.target_app).map(Backend::Native),
        BackendKind::Generic => Ok(Backend::Generic(GenericBackend::new())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
