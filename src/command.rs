//! Chat text -> `Command` translation.
//!
//! Matching is case-insensitive and runs on the trimmed message. Precedence:
//!   1. `0`, `esc`, `escape`            → `Escape`
//!   2. `1`, `y`, `yes`                 → `Approve`
//!   3. `2`                             → `ApproveAll`
//!   4. `3 <msg>` or `3\n<msg>`         → `Deny(msg)`
//!   5. `n <msg>` or `no <msg>`         → `Deny(msg)`
//!   6. anything else                   → `Unknown`
//!
//! Parsing never fails; unrecognized text is `Unknown`.

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// Intent of one inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Dismiss the prompt.
    Escape,
    /// Option 1: approve once.
    Approve,
    /// Option 2: approve for the rest of the session.
    ApproveAll,
    /// Option 3 followed by a free-text reply.
    Deny(String),
    /// Not a command. Handled as a silent no-op.
    Unknown,
}

impl Command {
    /// Short label used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Command::Escape => "escape",
            Command::Approve => "approve",
            Command::ApproveAll => "approve-all",
            Command::Deny(_) => "deny",
            Command::Unknown => "unknown",
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses raw message text into a `Command`.
pub fn parse(raw: &str) -> Command {
    let content = raw.trim();
    let lower = content.to_lowercase();

    match lower.as_str() {
        "0" | "esc" | "escape" => return Command::Escape,
        "1" | "y" | "yes" => return Command::Approve,
        "2" => return Command::ApproveAll,
        _ => {}
    }

    // "3" is ASCII, so byte offset 2 is always a char boundary here.
    if content.starts_with("3 ") || content.starts_with("3\n") {
        return Command::Deny(content[2..].trim().to_owned());
    }

    if lower.starts_with("n ") || lower.starts_with("no ") {
        // Both prefixes contain exactly one space before the payload.
        let rest = content
            .split_once(' ')
            .map(|(_, rest)| rest)
            .unwrap_or_default();
        return Command::Deny(rest.trim().to_owned());
    }

    Command::Unknown
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_aliases() {
        assert_eq!(parse("0"), Command::Escape);
        assert_eq!(parse("ESC"), Command::Escape);
        assert_eq!(parse("Escape"), Command::Escape);
        assert_eq!(parse("  esc \n"), Command::Escape);
    }

    #[test]
    fn approve_aliases() {
        assert_eq!(parse("1"), Command::Approve);
        assert_eq!(parse("y"), Command::Approve);
        assert_eq!(parse("Y"), Command::Approve);
        assert_eq!(parse("YES"), Command::Approve);
    }

    #[test]
    fn approve_all_is_exactly_two() {
        assert_eq!(parse("2"), Command::ApproveAll);
        assert_eq!(parse(" 2 "), Command::ApproveAll);
        assert_eq!(parse("22"), Command::Unknown);
        assert_eq!(parse("2 please"), Command::Unknown);
    }

    #[test]
    fn option_three_with_message() {
        assert_eq!(parse("3 abort now"), Command::Deny("abort now".into()));
        assert_eq!(parse("3   spaced out  "), Command::Deny("spaced out".into()));
    }

    #[test]
    fn option_three_with_newline_separator() {
        assert_eq!(
            parse("3\nuse the other file"),
            Command::Deny("use the other file".into())
        );
    }

    #[test]
    fn option_three_keeps_inner_newlines() {
        assert_eq!(
            parse("3 first line\nsecond line"),
            Command::Deny("first line\nsecond line".into())
        );
    }

    #[test]
    fn no_shortcuts() {
        assert_eq!(parse("n stop"), Command::Deny("stop".into()));
        assert_eq!(parse("no stop"), Command::Deny("stop".into()));
        assert_eq!(parse("NO Stop Right There"), Command::Deny("Stop Right There".into()));
        assert_eq!(parse("N  wait"), Command::Deny("wait".into()));
    }

    #[test]
    fn message_case_is_preserved() {
        assert_eq!(parse("3 Use CAPS"), Command::Deny("Use CAPS".into()));
    }

    #[test]
    fn bare_prefixes_are_unknown() {
        // Trimming removes the separator, so nothing is left to send.
        assert_eq!(parse("3 "), Command::Unknown);
        assert_eq!(parse("3"), Command::Unknown);
        assert_eq!(parse("n "), Command::Unknown);
        assert_eq!(parse("no"), Command::Unknown);
        assert_eq!(parse("n"), Command::Unknown);
    }

    #[test]
    fn unrecognized_text_is_unknown() {
        assert_eq!(parse("hello"), Command::Unknown);
        assert_eq!(parse(""), Command::Unknown);
        assert_eq!(parse("42"), Command::Unknown);
        assert_eq!(parse("nope"), Command::Unknown);
        assert_eq!(parse("none of that"), Command::Unknown);
        assert_eq!(parse("escape now"), Command::Unknown);
        assert_eq!(parse("3x"), Command::Unknown);
    }

    #[test]
    fn escape_takes_precedence_over_other_rules() {
        // "0" must never fall through to a later rule.
        assert_eq!(parse("0"), Command::Escape);
        assert_ne!(parse("0"), Command::Unknown);
    }

    #[test]
    fn non_ascii_input_never_panics() {
        assert_eq!(parse("é"), Command::Unknown);
        assert_eq!(parse("3 ✅ done"), Command::Deny("✅ done".into()));
        assert_eq!(parse("n 日本語"), Command::Deny("日本語".into()));
    }

    #[test]
    fn labels_are_distinct() {
        let labels = [
            Command::Escape.label(),
            Command::Approve.label(),
            Command::ApproveAll.label(),
            Command::Deny(String::new()).label(),
            Command::Unknown.label(),
        ];
        for (i, a) in labels.iter().enumerate() {
            for b in &labels[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
