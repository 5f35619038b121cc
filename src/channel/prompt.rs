//! Scrollback parsing: prompt heuristic, cursor and output slicing.

/// Characters that end a typical shell prompt.
const PROMPT_ENDINGS: [char; 3] = ['$', '#', '>'];

/// Whether `line` looks like an idle shell prompt.
///
/// This is a heuristic: output that happens to end with `$`, `#` or `>`
/// is indistinguishable from a prompt.
pub(crate) fn looks_like_prompt(line: &str, suffixes: &[String]) -> bool {
    let trimmed = line.trim_end();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.ends_with(&PROMPT_ENDINGS[..]) {
        return true;
    }
    suffixes.iter().any(|suffix| {
        let suffix = suffix.trim_end();
        !suffix.is_empty() && trimmed.ends_with(suffix)
    })
}

/// Number of lines up to and including the last non-blank one.
pub(crate) fn content_len(lines: &[String]) -> usize {
    lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map_or(0, |idx| idx + 1)
}

/// Output of a completed command, or `None` while it is still running.
///
/// Complete means the cursor advanced past `start` and the last content
/// line is a prompt.
pub(crate) fn completed_output(
    lines: &[String],
    start: usize,
    command: &str,
    suffixes: &[String],
) -> Option<String> {
    let end = content_len(lines);
    if end <= start || !looks_like_prompt(&lines[end - 1], suffixes) {
        return None;
    }
    Some(slice_output(&lines[start..end - 1], command))
}

/// Whatever was printed after `start`, prompt or not.
pub(crate) fn partial_output(lines: &[String], start: usize, command: &str) -> String {
    let end = content_len(lines);
    if end <= start {
        return String::new();
    }
    slice_output(&lines[start..end], command)
}

fn slice_output(lines: &[String], command: &str) -> String {
    let mut output = lines.to_vec();
    drop_echoed_command_line(&mut output, command);
    while output.first().is_some_and(|line| line.trim().is_empty()) {
        output.remove(0);
    }
    while output.last().is_some_and(|line| line.trim().is_empty()) {
        output.pop();
    }
    output.join("\n")
}

fn drop_echoed_command_line(lines: &mut Vec<String>, command: &str) {
    let trimmed_command = command.trim();
    if trimmed_command.is_empty() {
        return;
    }
    if let Some(first) = lines.first() {
        if first.trim_end().ends_with(trimmed_command) {
            lines.remove(0);
        }
    }
}
