//! Host platform detection and backend decision table.
//!
//! `PlatformInfo::detect()` inspects the compile-time OS/arch constants and the
//! running kernel release once at startup. The backend choice itself lives in
//! `choose_backend`, a pure function of (os family, configured method), so the
//! decision table can be unit-tested without depending on the host.

use std::fmt;

use sysinfo::System;

use crate::config::InjectionMethod;

// ---------------------------------------------------------------------------
// OS family
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    MacOs,
    Windows,
    Linux,
    Other,
}

impl OsFamily {
    /// Maps a `std::env::consts::OS` value to a family.
    pub fn from_os_name(name: &str) -> Self {
        match name {
            "macos" => OsFamily::MacOs,
            "windows" => OsFamily::Windows,
            "linux" => OsFamily::Linux,
            _ => OsFamily::Other,
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OsFamily::MacOs => "macos",
            OsFamily::Windows => "windows",
            OsFamily::Linux => "linux",
            OsFamily::Other => "other",
        })
    }
}

// ---------------------------------------------------------------------------
// Backend kind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// AppleScript driving the target application (macOS).
    Native,
    /// Synthetic keyboard events (any OS).
    Generic,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Native => "native",
            BackendKind::Generic => "generic",
        })
    }
}

// ---------------------------------------------------------------------------
// Platform info
// ---------------------------------------------------------------------------

/// Host description. Computed once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    pub os: OsFamily,
    pub arch: String,
    /// Kernel release, or `"unknown"` when the host does not report one.
    pub release: String,
    pub supported: Vec<BackendKind>,
    pub default_method: BackendKind,
    pub notes: Option<&'static str>,
}

impl PlatformInfo {
    /// Detects the running host.
    pub fn detect() -> Self {
        let mut info = Self::for_os(OsFamily::from_os_name(std::env::consts::OS));
        info.release = System::kernel_version().unwrap_or_else(|| "unknown".to_owned());
        info
    }

    /// Static capabilities of an OS family, with this build's architecture.
    pub fn for_os(os: OsFamily) -> Self {
        let (supported, default_method, notes) = match os {
            OsFamily::MacOs => (
                vec![BackendKind::Native, BackendKind::Generic],
                BackendKind::Native,
                None,
            ),
            OsFamily::Linux => (
                vec![BackendKind::Generic],
                BackendKind::Generic,
                Some("requires X11 or Wayland with XWayland"),
            ),
            OsFamily::Windows | OsFamily::Other => {
                (vec![BackendKind::Generic], BackendKind::Generic, None)
            }
        };
        Self {
            os,
            arch: std::env::consts::ARCH.to_owned(),
            release: "unknown".to_owned(),
            supported,
            default_method,
            notes,
        }
    }
}

impl fmt::Display for PlatformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<String> = self.supported.iter().map(ToString::to_string).collect();
        write!(
            f,
            "{} {} (release {}), methods [{}], default {}",
            self.os,
            self.arch,
            self.release,
            methods.join(", "),
            self.default_method
        )?;
        if let Some(notes) = self.notes {
            write!(f, "; {notes}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Decision table
// ---------------------------------------------------------------------------

/// Outcome of the backend decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub kind: BackendKind,
    /// Set when the configured method could not be honored.
    pub warning: Option<String>,
}

/// Decides which backend to build.
///
/// | method  | os     | backend |
/// |---------|--------|---------|
/// | native  | macOS  | native  |
/// | native  | other  | generic (with warning) |
/// | generic | any    | generic |
/// | auto    | macOS  | native  |
/// | auto    | other  | generic |
pub fn choose_backend(os: OsFamily, method: InjectionMethod) -> Selection {
    match (method, os) {
        // AppleScript activation gives the most reliable focus handling on macOS.
        (InjectionMethod::Native | InjectionMethod::Auto, OsFamily::MacOs) => Selection {
            kind: BackendKind::Native,
            warning: None,
        },
        (InjectionMethod::Native, other) => Selection {
            kind: BackendKind::Generic,
            warning: Some(format!(
                "native injection is only available on macOS (running on {other}); \
                 falling back to generic"
            )),
        },
        (InjectionMethod::Generic | InjectionMethod::Auto, _) => Selection {
            kind: BackendKind::Generic,
            warning: None,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
