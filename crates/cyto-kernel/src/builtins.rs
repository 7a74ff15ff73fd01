//! Built-in kernel tools: erase, summarize, promote
//!
//! These three operate on the kernel state itself, so the loop dispatches
//! them directly instead of going through the tool registry. Summarize
//! and promote are pure signaling tools; neither generates content.

use cyto_core::{FunctionSpec, Message, Role};
use serde_json::{Value, json};

use crate::state::{KernelState, Stage};

pub const ERASE: &str = "erase";
pub const SUMMARIZE: &str = "summarize";
pub const PROMOTE: &str = "promote";

/// Schemas for the built-in tools, in registration order
pub fn function_specs() -> Vec<FunctionSpec> {
    vec![erase_spec(), summarize_spec(), promote_spec()]
}

fn erase_spec() -> FunctionSpec {
    FunctionSpec::new(
        ERASE,
        "Erase messages from the current conversation context by index/range/role.",
        json!({
            "type": "object",
            "properties": {
                "targets": {
                    "type": "array",
                    "description": "Selectors: index, range, or role+last.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "index": {"type": "integer"},
                            "range": {
                                "type": "object",
                                "properties": {
                                    "start": {"type": "integer"},
                                    "end": {"type": "integer"},
                                },
                            },
                            "role": {"type": "string"},
                            "last": {"type": "integer"},
                        },
                    },
                },
                "reason": {"type": "string"},
                "strategy": {"type": "string", "enum": ["summarize", "drop"]},
            },
            "required": ["targets", "reason"],
        }),
    )
}

fn summarize_spec() -> FunctionSpec {
    FunctionSpec::new(
        SUMMARIZE,
        "Request a summarize step (outline → select → summarize → load).",
        json!({
            "type": "object",
            "properties": {
                "reason": {"type": "string", "description": "Why a summary is needed."},
            },
            "required": ["reason"],
        }),
    )
}

fn promote_spec() -> FunctionSpec {
    FunctionSpec::new(
        PROMOTE,
        "Promote the last summary into working context (outline → select → summarize → load).",
        json!({
            "type": "object",
            "properties": {
                "reason": {"type": "string", "description": "Why this summary should be loaded."},
                "target": {
                    "type": "string",
                    "description": "Summary target to promote.",
                    "default": "last_summary",
                },
            },
            "required": ["reason"],
        }),
    )
}

const ERASABLE_ROLES: &[Role] = &[Role::Assistant, Role::Function, Role::User];

fn snip(text: &str, limit: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= limit {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(limit).collect();
    format!("{}...", cut.trim_end())
}

/// Help payload returned when `targets` is empty: a worked example
/// against the most recent assistant message and a preview of the tail
/// of the conversation.
fn help_response(messages: &[Message]) -> Value {
    let last_assistant = messages
        .iter()
        .rposition(|m| m.is_role(Role::Assistant));
    let example = last_assistant.map(|idx| {
        json!({
            "targets": [{"index": idx}],
            "reason": "Remove last assistant message to reduce context.",
            "strategy": "summarize",
        })
    });

    let start = messages.len().saturating_sub(6);
    let recent: Vec<Value> = messages[start..]
        .iter()
        .enumerate()
        .map(|(offset, msg)| {
            json!({
                "index": start + offset,
                "role": msg.role.as_str(),
                "text": snip(&msg.text(), 80),
            })
        })
        .collect();

    json!({
        "erased": [],
        "summary": "No targets provided. Specify indices or ranges within the current conversation.",
        "help": {
            "hint": "Provide targets like {\"index\": 5} or {\"range\": {\"start\": 3, \"end\": 6}}.",
            "example": example,
            "recent": recent,
        },
    })
}

/// Erase messages by index/range/role and repair turn order.
///
/// Mutates `messages` in place, then notifies the kernel. System
/// messages are immutable; `strategy` is informational and both values
/// hard-drop.
pub fn erase(args: &Value, messages: &mut Vec<Message>, state: &mut KernelState) -> Value {
    let reason = args.get("reason").and_then(Value::as_str).unwrap_or("");
    let strategy = args
        .get("strategy")
        .and_then(Value::as_str)
        .unwrap_or("summarize");
    let targets = match args.get("targets").and_then(Value::as_array) {
        Some(targets) if !targets.is_empty() => targets,
        _ => return help_response(messages),
    };

    fn consider(
        idx: usize,
        messages: &[Message],
        to_erase: &mut Vec<usize>,
        skipped: &mut Vec<usize>,
        skipped_reasons: &mut Vec<Value>,
        record_skip: bool,
    ) {
        if ERASABLE_ROLES.contains(&messages[idx].role) {
            if !to_erase.contains(&idx) {
                to_erase.push(idx);
            }
        } else if record_skip {
            skipped.push(idx);
            skipped_reasons.push(json!({
                "index": idx,
                "role": messages[idx].role.as_str(),
                "reason": "role_not_erasable",
            }));
        }
    }

    let mut to_erase: Vec<usize> = Vec::new();
    let mut skipped: Vec<usize> = Vec::new();
    let mut skipped_reasons: Vec<Value> = Vec::new();

    for target in targets {
        if let Some(idx) = target.get("index").and_then(Value::as_i64) {
            if idx >= 0 && (idx as usize) < messages.len() {
                consider(
                    idx as usize,
                    messages,
                    &mut to_erase,
                    &mut skipped,
                    &mut skipped_reasons,
                    true,
                );
            }
            continue;
        }
        if let Some(range) = target.get("range") {
            let mut start = range.get("start").and_then(Value::as_i64).unwrap_or(0);
            let mut end = range.get("end").and_then(Value::as_i64).unwrap_or(-1);
            if start > end {
                std::mem::swap(&mut start, &mut end);
            }
            let lo = start.max(0) as usize;
            let hi = ((end + 1).max(0) as usize).min(messages.len());
            for idx in lo..hi {
                consider(
                    idx,
                    messages,
                    &mut to_erase,
                    &mut skipped,
                    &mut skipped_reasons,
                    true,
                );
            }
            continue;
        }
        if let (Some(role), Some(last)) = (
            target.get("role").and_then(Value::as_str),
            target.get("last").and_then(Value::as_u64),
        ) {
            let indices: Vec<usize> = messages
                .iter()
                .enumerate()
                .filter(|(_, m)| m.role.as_str() == role)
                .map(|(i, _)| i)
                .collect();
            // last == 0 selects every matching index
            let keep_from = if last == 0 {
                0
            } else {
                indices.len().saturating_sub(last as usize)
            };
            for &idx in &indices[keep_from..] {
                consider(
                    idx,
                    messages,
                    &mut to_erase,
                    &mut skipped,
                    &mut skipped_reasons,
                    false,
                );
            }
        }
    }

    if to_erase.is_empty() {
        return json!({
            "erased": [],
            "skipped": skipped,
            "skipped_reasons": skipped_reasons,
            "summary": format!("No erasable messages matched. Reason: {reason}"),
        });
    }
    to_erase.sort_unstable();

    let mut kept: Vec<Message> = Vec::with_capacity(messages.len() - to_erase.len());
    let mut erased: Vec<usize> = Vec::with_capacity(to_erase.len());
    for (idx, msg) in messages.drain(..).enumerate() {
        if to_erase.binary_search(&idx).is_ok() {
            erased.push(idx);
        } else {
            kept.push(msg);
        }
    }

    // Valid turn order: the first non-system message must be a user
    // message.
    if let Some(first) = kept.iter().position(|m| !m.is_role(Role::System)) {
        if !kept[first].is_role(Role::User) {
            kept.insert(first, Message::user("[deleted]"));
        }
    }

    *messages = kept;
    state.update_working_context(messages);
    state.mark_erased();

    json!({
        "erased": erased,
        "skipped": skipped,
        "skipped_reasons": skipped_reasons,
        "summary": format!(
            "Erased {} messages via {strategy}. Reason: {reason}. Erased indices: {erased:?}",
            erased.len()
        ),
    })
}

/// Signal that a summarize step is wanted; the next plain assistant
/// output will be captured as the summary.
pub fn summarize(_args: &Value, state: &mut KernelState) -> Value {
    state.request_summary();
    json!({"requested": true})
}

/// Promote the pending summary into durable working context.
pub fn promote(_args: &Value, state: &mut KernelState) -> Value {
    if state.import_stage() != Stage::Summarize {
        return json!({
            "promoted": false,
            "error": "Promote requires outline → select → summarize → load.",
        });
    }
    let Some(summary) = state.last_summary() else {
        return json!({"promoted": false, "error": "No summary candidate found."});
    };
    let content = summary.text();
    if state.import_cap_chars > 0 && content.chars().count() > state.import_cap_chars {
        return json!({
            "promoted": false,
            "error": format!(
                "Summary exceeds import cap of {} chars.",
                state.import_cap_chars
            ),
        });
    }
    let preview: String = content.chars().take(200).collect();
    state.promote_last_summary();
    state.set_import_stage(Stage::Idle);
    json!({"promoted": true, "summary_preview": preview})
}
