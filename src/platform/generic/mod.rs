//! Cross-platform generic backend: synthetic keyboard events via enigo.
//!
//! Works on macOS (CoreGraphics, needs Accessibility permission), Windows
//! (SendInput) and Linux (XTest; needs X11 or Wayland with XWayland).
//! Unlike the native backend it does not activate any application: keys go
//! to whatever window has focus.

mod executor;
mod keycodes;

pub use executor::GenericBackend;
