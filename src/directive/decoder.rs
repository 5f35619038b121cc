//! Incremental decoder over the accumulated reply buffer.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::DecoderConfig;
use crate::error::DirectiveError;

use super::display::render_display;
use super::payload::{is_hallucinated_tool, parse_payload};
use super::tags::{scan, DirectiveTag};
use super::DirectiveEvent;

/// How the caller should update the rendered reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayUpdate {
    Unchanged,
    /// New text to append after what was already shown.
    Append(String),
    /// Cleanup rewrote already-shown text; re-render with this full text.
    Replace(String),
}

/// Output of one [`DirectiveDecoder::feed`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeUpdate {
    pub display: DisplayUpdate,
    /// Events whose closing tag completed since the previous call.
    pub events: Vec<DirectiveEvent>,
}

/// Output of [`DirectiveDecoder::finalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct Finalized {
    pub display_text: String,
    /// Every event in the text, in closing-tag order.
    pub events: Vec<DirectiveEvent>,
    /// The subset of `events` not previously returned by this decoder.
    pub fresh: Vec<DirectiveEvent>,
}

/// Emission key: the tag plus the offset of its opening marker.
type TagKey = (DirectiveTag, usize);

struct Decoded {
    display: String,
    entries: Vec<(TagKey, Result<DirectiveEvent, DirectiveError>)>,
}

/// Stateful directive decoder for one reply turn.
///
/// Every call re-scans the whole buffer so tags split across chunks are
/// recombined. The buffer is append-only, which keeps tag offsets stable and
/// makes them usable as emission keys.
#[derive(Debug, Default)]
pub struct DirectiveDecoder {
    buffer: String,
    emitted: HashSet<TagKey>,
    shown: String,
    deny_list: Vec<String>,
}

impl DirectiveDecoder {
    pub fn new(deny_list: Vec<String>) -> Self {
        Self {
            deny_list,
            ..Self::default()
        }
    }

    pub fn from_config(config: &DecoderConfig) -> Self {
        Self::new(config.tool_deny_list.clone())
    }

    /// Accumulated raw text.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Display text as of the last call.
    pub fn display_text(&self) -> &str {
        &self.shown
    }

    /// Append one chunk and return the display change plus newly closed events.
    pub fn feed(&mut self, chunk: &str) -> DecodeUpdate {
        self.buffer.push_str(chunk);
        let decoded = decode(&self.buffer, true, &self.deny_list);
        let events = self.take_fresh(decoded.entries);
        let display = self.update_shown(decoded.display);
        DecodeUpdate { display, events }
    }

    /// Decode the complete reply once the stream ended.
    ///
    /// Repeated calls with the same text return the same `events`; `fresh`
    /// only lists events this decoder has not handed out before.
    pub fn finalize(&mut self, full_text: &str) -> Finalized {
        if full_text != self.buffer {
            if !full_text.starts_with(self.buffer.as_str()) {
                debug!("final text diverges from streamed buffer; emission keys reset");
                self.emitted.clear();
            }
            self.buffer = full_text.to_string();
        }
        let decoded = decode(&self.buffer, false, &self.deny_list);
        let events = decoded
            .entries
            .iter()
            .filter_map(|(_, result)| result.as_ref().ok().cloned())
            .collect::<Vec<_>>();
        let fresh = self.take_fresh(decoded.entries);
        self.shown = decoded.display.clone();
        Finalized {
            display_text: decoded.display,
            events,
            fresh,
        }
    }

    fn take_fresh(
        &mut self,
        entries: Vec<(TagKey, Result<DirectiveEvent, DirectiveError>)>,
    ) -> Vec<DirectiveEvent> {
        let mut fresh = Vec::new();
        for (key, result) in entries {
            if !self.emitted.insert(key) {
                continue;
            }
            match result {
                Ok(event) => fresh.push(event),
                Err(err) => warn!(offset = key.1, "dropping directive: {err}"),
            }
        }
        fresh
    }

    fn update_shown(&mut self, next: String) -> DisplayUpdate {
        if next == self.shown {
            return DisplayUpdate::Unchanged;
        }
        let update = match next.strip_prefix(self.shown.as_str()) {
            Some(delta) => DisplayUpdate::Append(delta.to_string()),
            None => DisplayUpdate::Replace(next.clone()),
        };
        self.shown = next;
        update
    }
}

/// Pure decode of `text`: display text plus one entry per closed tag.
fn decode(text: &str, streaming: bool, deny_list: &[String]) -> Decoded {
    let scan = scan(text);
    // A closed tag after a still-open one may be part of its payload.
    let held_after = if streaming { scan.unclosed_from } else { None };
    let mut entries = Vec::with_capacity(scan.matches.len());
    let mut commands = Vec::new();
    for m in &scan.matches {
        if held_after.is_some_and(|open| m.span.start > open) {
            continue;
        }
        let key = (m.tag, m.span.start);
        let mut result = parse_payload(m.tag, &text[m.payload.clone()]);
        if let Ok(DirectiveEvent::CommandSuggestion(card)) = &result {
            if is_hallucinated_tool(&card.command, deny_list) {
                result = Err(DirectiveError::new(
                    m.tag.name(),
                    format!("`{}` names an internal tool, not a shell command", card.command),
                ));
            } else {
                commands.push(card.command.clone());
            }
        }
        entries.push((key, result));
    }

    if !streaming {
        if let Some(offset) = scan.unclosed_from {
            warn!(offset, "dropping unclosed directive at end of reply");
        }
    }

    Decoded {
        display: render_display(text, &scan, streaming, &commands),
        entries,
    }
}
