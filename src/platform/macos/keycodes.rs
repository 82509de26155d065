//! macOS virtual key codes (CGKeyCode) for the logical keys the relay sends.
//!
//! Key codes are physical key positions per Apple HIToolbox/Events.h and are
//! layout-independent. Only the small closed set of navigation and editing
//! keys is mapped; printable characters go through `keystroke` instead.

/// What a logical key name turns into inside an AppleScript `System Events` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptKey {
    /// `key code <n>`
    Code(u16),
    /// `keystroke "<c>"` for a single printable character.
    Char(char),
}

/// Resolves a logical key name (case-insensitive).
///
/// Unmapped names pass through: a single character becomes a keystroke,
/// anything else is returned as `None` and reported by the caller at
/// execution time.
pub fn name_to_script_key(name: &str) -> Option<ScriptKey> {
    let code = match name.to_ascii_lowercase().as_str() {
        "escape" | "esc" => 0x35,
        "return" | "enter" => 0x24,
        "tab" => 0x30,
        "space" => 0x31,
        "backspace" => 0x33,
        "delete" => 0x75,
        "left" => 0x7B,
        "right" => 0x7C,
        "down" => 0x7D,
        "up" => 0x7E,
        _ => {
            let mut chars = name.chars();
            return match (chars.next(), chars.next()) {
                (Some(c), None) => Some(ScriptKey::Char(c)),
                _ => None,
            };
        }
    };
    Some(ScriptKey::Code(code))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
