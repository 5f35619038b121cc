//! Tag vocabulary and buffer scanning.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::OnceLock;

/// Known directive tag names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectiveTag {
    CmdCard,
    Suggestions,
    FileOpen,
    ChangesetId,
    Progress,
    Reasoning,
}

impl DirectiveTag {
    pub const ALL: [DirectiveTag; 6] = [
        Self::CmdCard,
        Self::Suggestions,
        Self::FileOpen,
        Self::ChangesetId,
        Self::Progress,
        Self::Reasoning,
    ];

    /// Wire name between the brackets.
    pub fn name(self) -> &'static str {
        match self {
            Self::CmdCard => "CMD_CARD",
            Self::Suggestions => "SUGGESTIONS",
            Self::FileOpen => "FILE_OPEN",
            Self::ChangesetId => "CHANGESET_ID",
            Self::Progress => "PROGRESS",
            Self::Reasoning => "REASONING",
        }
    }

    fn open_marker(self) -> String {
        format!("[{}]", self.name())
    }

    fn pattern(self) -> &'static Regex {
        static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
        let patterns = PATTERNS.get_or_init(|| {
            Self::ALL
                .iter()
                .map(|tag| {
                    let name = regex::escape(tag.name());
                    Regex::new(&format!(r"(?s)\[{name}\](.*?)\[/{name}\]"))
                        .expect("static directive pattern")
                })
                .collect()
        });
        let idx = Self::ALL
            .iter()
            .position(|tag| *tag == self)
            .unwrap_or_default();
        &patterns[idx]
    }
}

impl fmt::Display for DirectiveTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One fully closed tag instance inside the scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct TagMatch {
    pub(super) tag: DirectiveTag,
    /// Whole `[NAME]...[/NAME]` span.
    pub(super) span: Range<usize>,
    pub(super) payload: Range<usize>,
}

/// Result of scanning the full buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct Scan {
    /// Closed tags ordered by the position of their closing marker.
    pub(super) matches: Vec<TagMatch>,
    /// Offset of a known open tag that has not been closed yet.
    pub(super) unclosed_from: Option<usize>,
    /// Offset of a trailing fragment that may still grow into an open tag.
    pub(super) partial_from: Option<usize>,
}

/// Scan `text` for closed directives, unclosed openings and a trailing
/// partial opening marker.
pub(super) fn scan(text: &str) -> Scan {
    let mut found = Vec::new();
    for tag in DirectiveTag::ALL {
        for caps in tag.pattern().captures_iter(text) {
            let (Some(whole), Some(payload)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            found.push(TagMatch {
                tag,
                span: whole.range(),
                payload: payload.range(),
            });
        }
    }

    // Different tags can overlap (a directive quoted inside another one).
    // The earliest opening wins.
    found.sort_by_key(|m| (m.span.start, m.span.end));
    let mut matches: Vec<TagMatch> = Vec::with_capacity(found.len());
    for candidate in found {
        if matches
            .last()
            .is_some_and(|prev| candidate.span.start < prev.span.end)
        {
            continue;
        }
        matches.push(candidate);
    }

    let covered = |offset: usize| matches.iter().any(|m| m.span.contains(&offset));
    let unclosed_from = DirectiveTag::ALL
        .iter()
        .flat_map(|tag| {
            let marker = tag.open_marker();
            text.match_indices(&marker)
                .map(|(idx, _)| idx)
                .collect::<Vec<_>>()
        })
        .filter(|idx| !covered(*idx))
        .min();

    let partial_from = text.rfind('[').filter(|idx| {
        let tail = &text[*idx..];
        !covered(*idx)
            && DirectiveTag::ALL.iter().any(|tag| {
                let marker = tag.open_marker();
                tail.len() < marker.len() && marker.starts_with(tail)
            })
    });

    matches.sort_by_key(|m| m.span.end);
    Scan {
        matches,
        unclosed_from,
        partial_from,
    }
}
