//! macOS injection via AppleScript and `osascript`.
//!
//! `NativeBackend` implements `InputInjector`. Every operation composes one
//! AppleScript that activates the target application (a focus-steal), waits
//! for it to come forward, then sends keys through System Events. The script
//! is handed to `/bin/sh -c "osascript -e '<script>'"`.
//!
//! Interpolated values pass through two escaping layers:
//!   1. AppleScript string literal: `\` and `"` are backslash-escaped.
//!   2. Shell single quotes: `'` becomes `'"'"'`.
//!
//! The backend does not serialize its own calls. Two concurrent operations
//! would each activate the target and interleave their keys.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use super::keycodes::{name_to_script_key, ScriptKey};
use crate::platform::{InputInjector, PlatformError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const OSASCRIPT: &str = "/usr/bin/osascript";

const SHELL: &str = "/bin/sh";

/// kVK_Escape
const ESCAPE_KEY_CODE: u16 = 0x35;

// ---------------------------------------------------------------------------
// Public struct
// ---------------------------------------------------------------------------

/// Sends keys to a named application through AppleScript.
pub struct NativeBackend {
    target_app: String,
}

impl NativeBackend {
    /// Creates the backend after checking that `osascript` is installed.
    pub fn new(target_app: &str) -> Result<Self, PlatformError> {
        if !Path::new(OSASCRIPT).exists() {
            return Err(PlatformError::Initialization(format!(
                "{OSASCRIPT} not found; native injection needs macOS (set INJECTION_METHOD=generic)"
            )));
        }
        log::info!("native: AppleScript injection targeting {target_app:?}");
        Ok(Self {
            target_app: target_app.to_owned(),
        })
    }

    /// Activates the target application and runs `body` inside System Events.
    async fn run_in_target(&self, body: &str) -> Result<(), PlatformError> {
        let script = target_script(&self.target_app, body);
        let started = std::time::Instant::now();

        let output = Command::new(SHELL)
            .arg("-c")
            .arg(osascript_command_line(&script))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PlatformError::Injection(format!("failed to run osascript: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(PlatformError::Injection(if detail.is_empty() {
                format!("osascript exited with {}", output.status)
            } else {
                format!("AppleScript error: {detail}")
            }));
        }

        log::debug!(
            "native: script finished in {:.2}ms",
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// InputInjector trait impl
// ---------------------------------------------------------------------------

#[async_trait]
impl InputInjector for NativeBackend {
    async fn send_escape(&mut self) -> Result<(), PlatformError> {
        self.run_in_target(&format!("key code {ESCAPE_KEY_CODE}")).await
    }

    async fn send_text(&mut self, text: &str) -> Result<(), PlatformError> {
        self.run_in_target(&keystroke(text)).await
    }

    async fn send_return(&mut self) -> Result<(), PlatformError> {
        self.run_in_target("keystroke return").await
    }

    async fn send_key(&mut self, name: &str) -> Result<(), PlatformError> {
        let body = match name_to_script_key(name) {
            Some(ScriptKey::Code(code)) => format!("key code {code}"),
            Some(ScriptKey::Char(c)) => keystroke(&c.to_string()),
            None => {
                return Err(PlatformError::Injection(format!(
                    "no macOS key code for {name:?}"
                )))
            }
        };
        self.run_in_target(&body).await
    }

    /// One script for the whole line so the target is activated only once.
    async fn send_text_and_return(&mut self, text: &str) -> Result<(), PlatformError> {
        self.run_in_target(&text_and_return_body(text)).await
    }
}

// ---------------------------------------------------------------------------
// Script composition
// ---------------------------------------------------------------------------

/// Escapes `value` for use inside an AppleScript double-quoted string.
fn escape_applescript(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Wraps `value` in POSIX shell single quotes.
fn shell_single_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\"'\"'"))
}

fn keystroke(text: &str) -> String {
    format!("keystroke \"{}\"", escape_applescript(text))
}

fn text_and_return_body(text: &str) -> String {
    format!("{}\n        delay 0.1\n        keystroke return", keystroke(text))
}

fn target_script(app: &str, body: &str) -> String {
    format!(
        "tell application \"{}\"\n    activate\n    delay 0.2\n    tell application \"System Events\"\n        {}\n    end tell\nend tell",
        escape_applescript(app),
        body
    )
}

fn osascript_command_line(script: &str) -> String {
    format!("osascript -e {}", shell_single_quote(script))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applescript_escaping() {
        assert_eq!(escape_applescript("plain"), "plain");
        assert_eq!(escape_applescript(r#"say "hi""#), r#"say \"hi\""#);
        assert_eq!(escape_applescript(r"C:\dir"), r"C:\\dir");
        // Backslash first, so an escaped quote is not double-escaped.
        assert_eq!(escape_applescript(r#"\""#), r#"\\\""#);
    }

    #[test]
    fn shell_quoting() {
        assert_eq!(shell_single_quote("abc"), "'abc'");
        assert_eq!(shell_single_quote("it's"), r#"'it'"'"'s'"#);
        assert_eq!(shell_single_quote("$(rm -rf /)"), "'$(rm -rf /)'");
    }

    #[test]
    fn target_script_activates_before_keys() {
        let script = target_script("Terminal", "key code 53");
        let activate = script.find("activate").unwrap();
        let key = script.find("key code 53").unwrap();
        assert!(script.starts_with("tell application \"Terminal\""));
        assert!(activate < key);
        assert!(script.contains("delay 0.2"));
        assert!(script.contains("tell application \"System Events\""));
    }

    #[test]
    fn hostile_app_name_cannot_close_the_string() {
        let script = target_script(r#"Evil" to do shell script "id"#, "keystroke return");
        assert!(script.starts_with(r#"tell application "Evil\" to do shell script \"id""#));
    }

    #[test]
    fn text_and_return_is_one_script() {
        let body = text_and_return_body("1");
        assert!(body.starts_with("keystroke \"1\""));
        assert!(body.contains("delay 0.1"));
        assert!(body.ends_with("keystroke return"));
    }

    #[test]
    fn hostile_message_stays_inside_both_layers() {
        let message = r#"no' ; echo "pwned" \ '"#;
        let line = osascript_command_line(&target_script("Terminal", &keystroke(message)));
        assert!(line.starts_with("osascript -e '"));
        assert!(line.ends_with('\''));
        // Every single quote in the payload is re-opened by the shell escape.
        let quote_count = message.matches('\'').count();
        assert_eq!(line.matches(r#"'"'"'"#).count(), quote_count);
        assert!(line.contains(r#"\"pwned\""#));
    }

    #[test]
    fn missing_osascript_is_an_initialization_error() {
        if Path::new(OSASCRIPT).exists() {
            return;
        }
        match NativeBackend::new("Terminal") {
            Err(e) => assert!(e.is_fatal()),
            Ok(_) => panic!("expected initialization error"),
        }
    }
}
