//! Error message cleanup and stack-trace location parsing.

use std::sync::OnceLock;

use regex::Regex;

use super::event::RawError;
use crate::record::{ErrorDetail, ErrorLocation};

/// Upper bound on a stored error message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 500;

const ESC: char = '\u{1b}';

fn ansi_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").expect("static ANSI pattern"))
}

fn location_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"at.*\(([^)]+):(\d+):(\d+)\)").expect("static location pattern"))
}

/// Reduce an engine error message to a single ANSI-free line of at most
/// [`MAX_MESSAGE_CHARS`] characters.
///
/// Applying it to its own output is a no-op.
pub fn sanitize_message(raw: &str) -> String {
    let stripped = ansi_pattern().replace_all(raw, "");
    let first_line = stripped.split('\n').next().unwrap_or_default();
    // Stray escapes left behind by malformed or nested sequences.
    let no_escapes: String = first_line.chars().filter(|c| *c != ESC).collect();
    let truncated: String = no_escapes.trim().chars().take(MAX_MESSAGE_CHARS).collect();
    truncated.trim_end().to_string()
}

/// First `at ... (<file>:<line>:<column>)` frame of a stack trace, if any.
pub fn parse_location(stack: &str) -> Option<ErrorLocation> {
    let caps = location_pattern().captures(stack)?;
    Some(ErrorLocation {
        file: caps.get(1)?.as_str().to_string(),
        line: caps.get(2)?.as_str().parse().ok()?,
        column: caps.get(3)?.as_str().parse().ok()?,
    })
}

/// Build the stored error detail from the first engine error.
pub fn error_detail(errors: &[RawError]) -> Option<ErrorDetail> {
    let first = errors.first()?;
    let message = first
        .message
        .as_deref()
        .filter(|m| !m.is_empty())
        .unwrap_or("Unknown error");

    Some(ErrorDetail {
        message: sanitize_message(message),
        location: first.stack.as_deref().and_then(parse_location),
        stack: first.stack.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_ansi_and_keeps_first_line() {
        let raw = "\u{1b}[31mexpect(received).toBe(expected)\u{1b}[39m\n\nExpected: 1\nReceived: 2";
        assert_eq!(sanitize_message(raw), "expect(received).toBe(expected)");
    }

    #[test]
    fn test_truncates_to_limit() {
        let raw = "x".repeat(2 * MAX_MESSAGE_CHARS);
        let cleaned = sanitize_message(&raw);
        assert_eq!(cleaned.chars().count(), MAX_MESSAGE_CHARS);
    }

    #[test]
    fn test_truncation_counts_characters_not_bytes() {
        let raw = "é".repeat(MAX_MESSAGE_CHARS + 10);
        assert_eq!(sanitize_message(&raw).chars().count(), MAX_MESSAGE_CHARS);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let samples = [
            "plain message",
            "  padded  \n second",
            "\u{1b}[\u{1b}[0mm nested escape",
            "\u{1b}[1;31mbold red\u{1b}[0m",
            "\u{1b} lone escape",
            "",
        ];
        for raw in samples {
            let once = sanitize_message(raw);
            assert_eq!(sanitize_message(&once), once, "input {:?}", raw);
            assert!(!once.contains(ESC));
            assert!(!once.contains('\n'));
        }

        let long = format!("{}{}", "a".repeat(MAX_MESSAGE_CHARS - 1), " tail");
        let once = sanitize_message(&long);
        assert_eq!(sanitize_message(&once), once);
        assert!(once.chars().count() <= MAX_MESSAGE_CHARS);
    }

    #[test]
    fn test_parse_location_from_stack() {
        let stack = "Error: boom\n    at Context.<anonymous> (/repo/tests/auth.spec.ts:14:7)\n    at next (/repo/node_modules/x.js:1:1)";
        let loc = parse_location(stack).unwrap();
        assert_eq!(loc.file, "/repo/tests/auth.spec.ts");
        assert_eq!(loc.line, 14);
        assert_eq!(loc.column, 7);
    }

    #[test]
    fn test_parse_location_windows_path() {
        let loc = parse_location("    at fn (C:/repo/a.spec.ts:3:9)").unwrap();
        assert_eq!(loc.file, "C:/repo/a.spec.ts");
        assert_eq!((loc.line, loc.column), (3, 9));
    }

    #[test]
    fn test_parse_location_absent() {
        assert!(parse_location("Error: boom\n    at /repo/a.spec.ts:3:9").is_none());
        assert!(parse_location("").is_none());
    }

    #[test]
    fn test_error_detail_defaults_message() {
        let detail = error_detail(&[RawError { message: None, stack: None }]).unwrap();
        assert_eq!(detail.message, "Unknown error");
        assert!(detail.location.is_none());
        assert!(error_detail(&[]).is_none());
    }
}
