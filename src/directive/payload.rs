//! Payload parsing for each directive tag.
//!
//! Payloads are JSON records, with a few lenient shapes the generator is
//! known to produce (bare strings, arrays of plain strings, fenced JSON).

use serde::Deserialize;
use serde_json::Value;

use crate::error::DirectiveError;

use super::tags::DirectiveTag;
use super::{CommandSuggestion, DirectiveEvent, FollowUp, ReasoningStep};

#[derive(Debug, Deserialize)]
struct CmdCardPayload {
    command: String,
    #[serde(default, alias = "target", alias = "host")]
    server: String,
    #[serde(default, alias = "reason", alias = "description")]
    explanation: String,
}

/// Parse one tag payload into its event.
pub(super) fn parse_payload(tag: DirectiveTag, raw: &str) -> Result<DirectiveEvent, DirectiveError> {
    let body = strip_code_fence(raw.trim());
    match tag {
        DirectiveTag::CmdCard => parse_cmd_card(body),
        DirectiveTag::Suggestions => parse_suggestions(body),
        DirectiveTag::FileOpen => parse_keyed_text(tag, body, &["path", "file"])
            .map(|path| DirectiveEvent::FileOpen { path }),
        DirectiveTag::ChangesetId => parse_keyed_text(tag, body, &["id", "changeset_id"])
            .map(|id| DirectiveEvent::ChangesetRef { id }),
        DirectiveTag::Progress => serde_json::from_str::<Value>(body)
            .map(|payload| DirectiveEvent::ProgressUpdate { payload })
            .map_err(|e| DirectiveError::new(tag.name(), e.to_string())),
        DirectiveTag::Reasoning => serde_json::from_str::<ReasoningStep>(body)
            .map(DirectiveEvent::ReasoningStep)
            .map_err(|e| DirectiveError::new(tag.name(), e.to_string())),
    }
}

fn parse_cmd_card(body: &str) -> Result<DirectiveEvent, DirectiveError> {
    let tag = DirectiveTag::CmdCard.name();
    let card: CmdCardPayload =
        serde_json::from_str(body).map_err(|e| DirectiveError::new(tag, e.to_string()))?;
    let command = card.command.trim().to_string();
    if command.is_empty() {
        return Err(DirectiveError::new(tag, "empty command"));
    }
    Ok(DirectiveEvent::CommandSuggestion(CommandSuggestion {
        server: card.server.trim().to_string(),
        command,
        explanation: card.explanation.trim().to_string(),
    }))
}

fn parse_suggestions(body: &str) -> Result<DirectiveEvent, DirectiveError> {
    let tag = DirectiveTag::Suggestions.name();
    let value: Value =
        serde_json::from_str(body).map_err(|e| DirectiveError::new(tag, e.to_string()))?;
    let list = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("suggestions").or_else(|| map.get("items")) {
            Some(Value::Array(items)) => items,
            _ => return Err(DirectiveError::new(tag, "expected an array of suggestions")),
        },
        _ => return Err(DirectiveError::new(tag, "expected an array of suggestions")),
    };

    let mut items = Vec::with_capacity(list.len());
    for entry in list {
        let text = match entry {
            Value::String(text) => text.as_str(),
            Value::Object(map) => map.get("text").and_then(Value::as_str).ok_or_else(|| {
                DirectiveError::new(tag, "suggestion object is missing `text`")
            })?,
            _ => return Err(DirectiveError::new(tag, "unsupported suggestion entry")),
        };
        let text = text.trim();
        if !text.is_empty() {
            items.push(FollowUp {
                text: text.to_string(),
            });
        }
    }
    Ok(DirectiveEvent::FollowUpSuggestions { items })
}

/// Accept `{"<key>": "..."}`, a JSON string/number, or bare text.
fn parse_keyed_text(
    tag: DirectiveTag,
    body: &str,
    keys: &[&str],
) -> Result<String, DirectiveError> {
    let text = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => keys
            .iter()
            .find_map(|key| match map.get(*key) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| {
                DirectiveError::new(tag.name(), format!("missing field `{}`", keys[0]))
            })?,
        Ok(Value::String(s)) => s,
        Ok(Value::Number(n)) => n.to_string(),
        Ok(_) => return Err(DirectiveError::new(tag.name(), "unsupported payload shape")),
        Err(_) if !body.starts_with('{') && !body.starts_with('[') => body.to_string(),
        Err(e) => return Err(DirectiveError::new(tag.name(), e.to_string())),
    };
    let text = text.trim();
    if text.is_empty() {
        return Err(DirectiveError::new(tag.name(), "empty payload"));
    }
    Ok(text.to_string())
}

/// Remove a surrounding ```json fence the generator sometimes adds.
fn strip_code_fence(body: &str) -> &str {
    let Some(rest) = body.strip_prefix("```") else {
        return body;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return body;
    };
    match inner.split_once('\n') {
        Some((lang, code)) if lang.trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
            code.trim()
        }
        _ => inner.trim(),
    }
}

/// True when the command names one of the assistant's internal tools.
///
/// Matches on the first whitespace-separated token, with any `(...)` call
/// suffix removed, so `query_grafana_metrics(cpu)` is caught as well.
pub fn is_hallucinated_tool(command: &str, deny_list: &[String]) -> bool {
    let Some(first) = command.split_whitespace().next() else {
        return false;
    };
    let name = first.split('(').next().unwrap_or(first);
    deny_list
        .iter()
        .any(|tool| tool.eq_ignore_ascii_case(name))
}
