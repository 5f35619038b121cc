//! Display-text assembly: directive markup removal and command de-duplication.

use regex::Regex;
use std::sync::OnceLock;

use super::tags::Scan;

fn fenced_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)```.*?(```|\z)").expect("static fence pattern"))
}

fn inline_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"`[^`\n]*`").expect("static inline-code pattern"))
}

fn blank_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+\n").expect("static blank-run pattern"))
}

/// Build display text for `text` given its scan.
///
/// Closed directives are removed. Everything from an unclosed known open tag
/// onward is withheld, and while `streaming` a trailing fragment that could
/// still become an open tag is withheld too. `commands` holds the accepted
/// CMD_CARD commands; when non-empty, code spans and literal command
/// repetitions are stripped.
pub(super) fn render_display(
    text: &str,
    scan: &Scan,
    streaming: bool,
    commands: &[String],
) -> String {
    let partial = if streaming { scan.partial_from } else { None };
    let limit = [scan.unclosed_from, partial]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(text.len());

    let mut out = String::with_capacity(limit);
    let mut pos = 0;
    for m in &scan.matches {
        if m.span.start >= limit {
            break;
        }
        out.push_str(&text[pos..m.span.start]);
        pos = m.span.end;
    }
    if pos < limit {
        out.push_str(&text[pos..limit]);
    }

    if !commands.is_empty() {
        out = strip_command_echoes(&out, commands);
    }
    collapse_blank_lines(&out)
}

fn strip_command_echoes(text: &str, commands: &[String]) -> String {
    let without_fences = fenced_block_pattern().replace_all(text, "");
    let mut out = inline_code_pattern()
        .replace_all(&without_fences, "")
        .into_owned();
    for command in commands {
        if let Some(pattern) = command_echo_pattern(command) {
            out = pattern.replace_all(&out, "${1}${2}").into_owned();
        }
    }
    out
}

/// Matches `command` only as a standalone token, so `ls` leaves `tools` alone.
fn command_echo_pattern(command: &str) -> Option<Regex> {
    let command = command.trim();
    if command.is_empty() {
        return None;
    }
    Regex::new(&format!(
        r"(?m)(^|\s){}([\s.,;:!?)]|$)",
        regex::escape(command)
    ))
    .ok()
}

fn collapse_blank_lines(text: &str) -> String {
    blank_run_pattern()
        .replace_all(text, "\n\n")
        .trim()
        .to_string()
}
