//! Aggregated result report sent back into the conversation.

use std::fmt::Write as _;

use crate::textutil::truncate_head_tail;

use super::item::{ItemStatus, Queue, QueueItem};

/// Note attached to skipped items.
pub const SKIPPED_NOTE: &str = "The user chose to skip this command.";

/// Status glyph for one item.
pub fn status_glyph(item: &QueueItem) -> char {
    match (item.status, item.exit_code) {
        (ItemStatus::Skipped, _) => '⊘',
        (ItemStatus::Executed, Some(0)) => '✓',
        (ItemStatus::Executed, Some(_)) => '✗',
        _ => '•',
    }
}

fn target_label(item: &QueueItem) -> &str {
    if item.server.is_empty() {
        "default target"
    } else {
        &item.server
    }
}

/// Render the fixed report template for a settled queue.
///
/// Executed output is bounded to `head` + `tail` characters.
pub fn build_report(queue: &Queue, head: usize, tail: usize) -> String {
    let executed = queue
        .items
        .iter()
        .filter(|item| item.status == ItemStatus::Executed)
        .count();
    let mut out = format!(
        "Results for {} queued command(s) ({executed} executed, {} skipped):\n",
        queue.items.len(),
        queue
            .items
            .iter()
            .filter(|item| item.status == ItemStatus::Skipped)
            .count()
    );

    for item in &queue.items {
        let _ = write!(
            out,
            "\n{} `{}` on {}",
            status_glyph(item),
            item.command,
            target_label(item)
        );
        match item.status {
            ItemStatus::Executed => {
                match item.exit_code {
                    Some(code) => {
                        let _ = writeln!(out, " (exit {code})");
                    }
                    None => out.push_str(" (exit unknown)\n"),
                }
                let output = item.output.as_deref().unwrap_or_default().trim_end();
                if output.is_empty() {
                    out.push_str("(no output)\n");
                } else {
                    let _ = writeln!(out, "```\n{}\n```", truncate_head_tail(output, head, tail));
                }
            }
            ItemStatus::Skipped => {
                let _ = writeln!(out, "\n{SKIPPED_NOTE}");
            }
            ItemStatus::Pending => out.push_str(" (not run)\n"),
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ExecutionResult;
    use crate::directive::CommandSuggestion;
    use crate::textutil::TRUNCATION_MARKER;

    fn queue(specs: &[(&str, &str)]) -> Queue {
        let items = specs
            .iter()
            .enumerate()
            .map(|(idx, (server, command))| {
                QueueItem::from_suggestion(
                    idx as u32 + 1,
                    CommandSuggestion {
                        server: server.to_string(),
                        command: command.to_string(),
                        explanation: String::new(),
                    },
                )
            })
            .collect();
        Queue::new("q1".into(), items)
    }

    #[test]
    fn report_uses_glyph_per_outcome() {
        let mut q = queue(&[("web-1", "df -h"), ("web-2", "false"), ("", "uptime"), ("db", "rm x")]);
        q.item_mut(1).unwrap().mark_executed(ExecutionResult::completed("/dev/sda1 40%", 0));
        q.item_mut(2).unwrap().mark_executed(ExecutionResult::completed("", 1));
        q.item_mut(3).unwrap().mark_executed(ExecutionResult {
            output: "partial".into(),
            exit_code: None,
            timed_out: false,
        });
        q.item_mut(4).unwrap().mark_skipped();

        let report = build_report(&q, 400, 400);
        assert!(report.starts_with("Results for 4 queued command(s) (3 executed, 1 skipped):"));
        assert!(report.contains("✓ `df -h` on web-1 (exit 0)\n```\n/dev/sda1 40%\n```"));
        assert!(report.contains("✗ `false` on web-2 (exit 1)\n(no output)"));
        assert!(report.contains("• `uptime` on default target (exit unknown)"));
        assert!(report.contains(&format!("⊘ `rm x` on db\n{SKIPPED_NOTE}")));
    }

    #[test]
    fn long_output_is_bounded_head_and_tail() {
        let mut q = queue(&[("web-1", "journalctl")]);
        let output = format!("{}{}{}", "a".repeat(500), "b".repeat(500), "c".repeat(500));
        q.item_mut(1).unwrap().mark_executed(ExecutionResult::completed(output, 0));

        let report = build_report(&q, 400, 400);
        assert!(report.contains(TRUNCATION_MARKER));
        assert!(report.contains(&format!("```\n{}\n{TRUNCATION_MARKER}\n{}\n```", "a".repeat(400), "c".repeat(400))));
        assert!(!report.contains("bbb"));
    }
}
