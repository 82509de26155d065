//! Logical key name -> enigo `Key` conversions.
//!
//! - `name_to_key`: resolves the closed set of named keys at mapping time;
//!   anything else is carried through verbatim.
//! - `resolve_verbatim`: runs on the worker thread at execution time, so a bad
//!   name fails as an injection error rather than at mapping time.

use enigo::Key;

use crate::platform::PlatformError;

/// A key request after mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyName {
    Mapped(Key),
    /// Unrecognized name, passed through unchanged.
    Verbatim(String),
}

/// Maps a logical key name (case-insensitive) to an enigo key.
pub fn name_to_key(name: &str) -> KeyName {
    let key = match name.to_ascii_lowercase().as_str() {
        "escape" | "esc" => Key::Escape,
        "return" | "enter" => Key::Return,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" => Key::Delete,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        _ => return KeyName::Verbatim(name.to_owned()),
    };
    KeyName::Mapped(key)
}

/// Turns a verbatim name into something the keyboard can press.
///
/// A single character is sent as a unicode key; longer names have no
/// equivalent and fail.
pub fn resolve_verbatim(name: &str) -> Result<Key, PlatformError> {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Key::Unicode(c)),
        _ => Err(PlatformError::Injection(format!("unknown key name {name:?}"))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_keys_are_mapped() {
        let cases: &[(&str, Key)] = &[
            ("escape", Key::Escape),
            ("Return", Key::Return),
            ("ENTER", Key::Return),
            ("tab", Key::Tab),
            ("space", Key::Space),
            ("backspace", Key::Backspace),
            ("delete", Key::Delete),
            ("up", Key::UpArrow),
            ("down", Key::DownArrow),
            ("left", Key::LeftArrow),
            ("right", Key::RightArrow),
        ];
        for (name, key) in cases {
            assert_eq!(name_to_key(name), KeyName::Mapped(*key), "{name}");
        }
    }

    #[test]
    fn other_names_pass_through_unchanged() {
        assert_eq!(name_to_key("F13"), KeyName::Verbatim("F13".into()));
        assert_eq!(name_to_key("x"), KeyName::Verbatim("x".into()));
    }

    #[test]
    fn verbatim_single_char_resolves() {
        assert_eq!(resolve_verbatim("x"), Ok(Key::Unicode('x')));
    }

    #[test]
    fn verbatim_word_fails_at_execution() {
        let err = resolve_verbatim("F13").unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("F13"));
    }
}
