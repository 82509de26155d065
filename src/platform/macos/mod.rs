//! macOS native backend.
//!
//! Injection: AppleScript run through `osascript`, which activates the target
//! application (Terminal, iTerm, ...) and sends keys via System Events.
//!
//! Requires Automation and Accessibility permission for the process that runs
//! the relay. Guide the user to:
//!   System Settings > Privacy & Security > Accessibility

mod executor;
mod keycodes;

pub use executor::NativeBackend;
