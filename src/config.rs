//! Startup configuration: TOML file plus environment overrides.
//!
//! The file is optional. Every key can be overridden by an environment
//! variable of the same name in upper case (`BOT_TOKEN`, `ALLOWED_SENDER_IDS`,
//! `CHANNEL_ID`, `INJECTION_METHOD`, `NATIVE_TARGET_APP_NAME`,
//! `OPERATION_TIMEOUT_SECS`). The resolved `Settings` are immutable.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default config file, resolved against the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "keyrelay.toml";

/// Application the native backend activates when none is configured.
pub const DEFAULT_TARGET_APP: &str = "Terminal";

/// Upper bound for a single backend operation.
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BOT_TOKEN is required (set it in the environment or as `bot_token` in the config file)")]
    MissingToken,

    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid injection method {0:?} (expected auto, native or generic)")]
    InvalidMethod(String),

    #[error("invalid operation timeout {0:?} (expected a positive number of seconds)")]
    InvalidTimeout(String),
}

// ---------------------------------------------------------------------------
// Injection method
// ---------------------------------------------------------------------------

/// Which backend the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum InjectionMethod {
    #[default]
    Auto,
    /// Script-based OS automation (macOS only).
    Native,
    /// Synthetic keyboard events (all platforms).
    Generic,
}

impl FromStr for InjectionMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            // Older deployments named the methods after the underlying tool.
            "native" | "applescript" => Ok(Self::Native),
            "generic" | "nutjs" => Ok(Self::Generic),
            other => Err(ConfigError::InvalidMethod(other.to_owned())),
        }
    }
}

impl TryFrom<String> for InjectionMethod {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for InjectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Native => "native",
            Self::Generic => "generic",
        })
    }
}

// ---------------------------------------------------------------------------
// Resolved settings
// ---------------------------------------------------------------------------

/// Backend choice and parameters. Fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub method: InjectionMethod,
    pub target_app: String,
    pub operation_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            method: InjectionMethod::Auto,
            target_app: DEFAULT_TARGET_APP.to_owned(),
            operation_timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
        }
    }
}

/// Who may issue commands, and where.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    /// Permitted sender ids. Empty means anyone.
    pub allowed_senders: HashSet<String>,
    /// Only accept commands from this channel when set.
    pub channel_id: Option<String>,
}

impl AuthorizationPolicy {
    pub fn sender_allowed(&self, sender_id: &str) -> bool {
        self.allowed_senders.is_empty() || self.allowed_senders.contains(sender_id)
    }

    pub fn channel_allowed(&self, channel_id: &str) -> bool {
        self.channel_id.as_deref().map_or(true, |c| c == channel_id)
    }
}

/// Everything `main` needs after validation.
pub struct Settings {
    pub bot_token: String,
    pub backend: BackendConfig,
    pub policy: AuthorizationPolicy,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("bot_token", &"<redacted>")
            .field("backend", &self.backend)
            .field("policy", &self.policy)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    bot_token: Option<String>,
    #[serde(default)]
    allowed_sender_ids: Vec<String>,
    channel_id: Option<String>,
    injection_method: Option<InjectionMethod>,
    native_target_app_name: Option<String>,
    operation_timeout_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Loads settings from `path` (if it exists) and the process environment.
///
/// A missing file is not an error when `required` is false; an explicit
/// `--config` path must exist.
pub fn load(path: &Path, required: bool) -> Result<Settings, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(text) => {
            log::debug!("config: loaded {}", path.display());
            toml::from_str(&text)?
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
            log::debug!("config: {} not found, using environment only", path.display());
            RawConfig::default()
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    resolve(raw, |key| std::env::var(key).ok())
}

/// Parses settings from TOML text and the given environment lookup.
#[cfg(test)]
fn from_toml_str(
    text: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Settings, ConfigError> {
    resolve(toml::from_str(text)?, env)
}

/// Applies environment overrides and validates.
///
/// Takes the environment as a lookup function so it can be tested without
/// mutating process environment variables.
fn resolve(
    raw: RawConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Settings, ConfigError> {
    let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    let bot_token = env("BOT_TOKEN")
        .or(raw.bot_token)
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
        .ok_or(ConfigError::MissingToken)?;

    let allowed_senders: HashSet<String> = match env("ALLOWED_SENDER_IDS") {
        Some(list) => split_list(&list),
        None => raw
            .allowed_sender_ids
            .iter()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect(),
    };

    let channel_id = env("CHANNEL_ID")
        .or(raw.channel_id)
        .map(|c| c.trim().to_owned())
        .filter(|c| !c.is_empty());

    let method = match env("INJECTION_METHOD") {
        Some(m) => m.parse()?,
        None => raw.injection_method.unwrap_or_default(),
    };

    let target_app = env("NATIVE_TARGET_APP_NAME")
        .or(raw.native_target_app_name)
        .map(|a| a.trim().to_owned())
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| DEFAULT_TARGET_APP.to_owned());

    let timeout_secs = match env("OPERATION_TIMEOUT_SECS") {
        Some(v) => v
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidTimeout(v.clone()))?,
        None => raw
            .operation_timeout_secs
            .unwrap_or(DEFAULT_OPERATION_TIMEOUT_SECS),
    };
    if timeout_secs == 0 {
        return Err(ConfigError::InvalidTimeout(timeout_secs.to_string()));
    }

    Ok(Settings {
        bot_token,
        backend: BackendConfig {
            method,
            target_app,
            operation_timeout: Duration::from_secs(timeout_secs),
        },
        policy: AuthorizationPolicy {
            allowed_senders,
            channel_id,
        },
    })
}

/// Splits a comma-separated list, dropping blanks.
fn split_list(list: &str) -> HashSet<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn no_env() -> impl Fn(&str) -> Option<String> {
        |_| None
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = from_toml_str("", no_env()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingToken));
    }

    #[test]
    fn blank_token_is_an_error() {
        let err = from_toml_str("bot_token = \"   \"", no_env()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingToken));
    }

    #[test]
    fn defaults_apply() {
        let s = from_toml_str("bot_token = \"abc\"", no_env()).unwrap();
        assert_eq!(s.bot_token, "abc");
        assert_eq!(s.backend, BackendConfig::default());
        assert!(s.policy.allowed_senders.is_empty());
        assert_eq!(s.policy.channel_id, None);
    }

    #[test]
    fn file_values_are_read() {
        let s = from_toml_str(
            r#"
            bot_token = "abc"
            allowed_sender_ids = ["111", " 222 ", ""]
            channel_id = "999"
            injection_method = "generic"
            native_target_app_name = "iTerm"
            operation_timeout_secs = 3
            "#,
            no_env(),
        )
        .unwrap();
        assert_eq!(s.policy.allowed_senders.len(), 2);
        assert!(s.policy.allowed_senders.contains("222"));
        assert_eq!(s.policy.channel_id.as_deref(), Some("999"));
        assert_eq!(s.backend.method, InjectionMethod::Generic);
        assert_eq!(s.backend.target_app, "iTerm");
        assert_eq!(s.backend.operation_timeout, Duration::from_secs(3));
    }

    #[test]
    fn environment_overrides_file() {
        let s = from_toml_str(
            r#"
            bot_token = "from-file"
            injection_method = "generic"
            allowed_sender_ids = ["1"]
            "#,
            env_of(&[
                ("BOT_TOKEN", "from-env"),
                ("INJECTION_METHOD", "native"),
                ("ALLOWED_SENDER_IDS", "7, 8,,9 "),
                ("CHANNEL_ID", "42"),
                ("NATIVE_TARGET_APP_NAME", "Cursor"),
            ]),
        )
        .unwrap();
        assert_eq!(s.bot_token, "from-env");
        assert_eq!(s.backend.method, InjectionMethod::Native);
        let expected: HashSet<String> = ["7", "8", "9"].iter().map(|s| s.to_string()).collect();
        assert_eq!(s.policy.allowed_senders, expected);
        assert_eq!(s.policy.channel_id.as_deref(), Some("42"));
        assert_eq!(s.backend.target_app, "Cursor");
    }

    #[test]
    fn blank_environment_values_are_ignored() {
        let s = from_toml_str(
            "bot_token = \"abc\"\nchannel_id = \"5\"",
            env_of(&[("CHANNEL_ID", ""), ("BOT_TOKEN", "  ")]),
        )
        .unwrap();
        assert_eq!(s.bot_token, "abc");
        assert_eq!(s.policy.channel_id.as_deref(), Some("5"));
    }

    #[test]
    fn method_aliases_parse() {
        assert_eq!("AUTO".parse::<InjectionMethod>().unwrap(), InjectionMethod::Auto);
        assert_eq!(
            "AppleScript".parse::<InjectionMethod>().unwrap(),
            InjectionMethod::Native
        );
        assert_eq!("nutjs".parse::<InjectionMethod>().unwrap(), InjectionMethod::Generic);
        assert!(matches!(
            "xdotool".parse::<InjectionMethod>(),
            Err(ConfigError::InvalidMethod(_))
        ));
    }

    #[test]
    fn invalid_method_in_file_is_a_parse_error() {
        let err = from_toml_str(
            "bot_token = \"abc\"\ninjection_method = \"magic\"",
            no_env(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = from_toml_str("bot_token = \"abc\"\nterminal = \"x\"", no_env()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = from_toml_str(
            "bot_token = \"abc\"",
            env_of(&[("OPERATION_TIMEOUT_SECS", "0")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout(_)));
    }

    #[test]
    fn missing_optional_file_falls_back_to_environment() {
        // The token is taken from the real environment here, so only the
        // error kind is asserted when it is absent.
        let path = Path::new("/nonexistent/keyrelay-test.toml");
        match load(path, false) {
            Ok(_) | Err(ConfigError::MissingToken) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_required_file_is_a_read_error() {
        let path = Path::new("/nonexistent/keyrelay-test.toml");
        assert!(matches!(load(path, true), Err(ConfigError::Read { .. })));
    }

    #[test]
    fn policy_filters() {
        let open = AuthorizationPolicy::default();
        assert!(open.sender_allowed("anyone"));
        assert!(open.channel_allowed("anywhere"));

        let closed = AuthorizationPolicy {
            allowed_senders: ["1".to_string()].into_iter().collect(),
            channel_id: Some("c".into()),
        };
        assert!(closed.sender_allowed("1"));
        assert!(!closed.sender_allowed("2"));
        assert!(closed.channel_allowed("c"));
        assert!(!closed.channel_allowed("d"));
    }

    #[test]
    fn debug_output_redacts_token() {
        let s = from_toml_str("bot_token = \"secret-value\"", no_env()).unwrap();
        let text = format!("{s:?}");
        assert!(!text.contains("secret-value"));
        assert!(text.contains("<redacted>"));
    }
}
