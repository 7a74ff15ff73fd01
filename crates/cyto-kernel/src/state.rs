//! Kernel state: working context, audit journal, ephemeral lifetimes,
//! the promoted set, and the reintegration stage machine.

use cyto_core::{Content, Message, MessageId, Role};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;

/// Position in the mandatory reintegration pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Idle,
    Outline,
    Select,
    Summarize,
}

/// Why a message was flagged ephemeral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EphemeralKind {
    Auto,
    Tool,
    Summary,
    Policy,
}

/// One tracked ephemeral lifetime. Identity is the message id, so two
/// messages with identical content remain distinct.
#[derive(Debug, Clone)]
pub struct EphemeralEntry {
    pub id: MessageId,
    pub expires_at: u64,
    pub kind: EphemeralKind,
}

/// Kernel tuning knobs
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// System prompt injected when the caller supplies none
    pub system_prompt: String,
    /// Call budget per run
    pub max_llm_calls: u32,
    /// Max turns a non-idle stage may persist
    pub import_stage_ttl_calls: u64,
    /// Truncation cap for tool outputs and summary text, in characters
    pub import_cap_chars: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            system_prompt: crate::kernel::SYSTEM_PROMPT.to_string(),
            max_llm_calls: crate::kernel::MAX_LLM_CALL_PER_RUN,
            import_stage_ttl_calls: 2,
            import_cap_chars: 1200,
        }
    }
}

/// One completed turn in the audit journal
#[derive(Debug, Clone, Serialize)]
pub struct TurnRecord {
    pub messages: Vec<Message>,
    pub responses: Vec<Message>,
}

/// In-memory kernel state for the working context and audit events
pub struct KernelState {
    /// Ordered message sequence forming the current LLM prompt
    pub working_context: Vec<Message>,
    /// Derived projection keeping only user/assistant messages
    pub public_history: Vec<Message>,
    /// Append-only record of completed turns
    pub audit_journal: Vec<TurnRecord>,
    /// Set after an erase until the next reset
    pub erased_last_call: bool,
    /// Set when a summarize step has been requested but not yet produced
    pub summary_requested: bool,
    pub import_stage_ttl_calls: u64,
    pub import_cap_chars: usize,
    ephemeral_entries: Vec<EphemeralEntry>,
    promoted: HashSet<MessageId>,
    last_summary: Option<Message>,
    call_index: u64,
    import_stage: Stage,
    import_stage_started_at: u64,
}

impl KernelState {
    pub fn new(config: &KernelConfig) -> Self {
        Self {
            working_context: Vec::new(),
            public_history: Vec::new(),
            audit_journal: Vec::new(),
            erased_last_call: false,
            summary_requested: false,
            import_stage_ttl_calls: config.import_stage_ttl_calls,
            import_cap_chars: config.import_cap_chars,
            ephemeral_entries: Vec::new(),
            promoted: HashSet::new(),
            last_summary: None,
            call_index: 0,
            import_stage: Stage::Idle,
            import_stage_started_at: 0,
        }
    }

    /// Clear everything atomically; configuration caps survive.
    pub fn reset(&mut self) {
        self.working_context.clear();
        self.public_history.clear();
        self.audit_journal.clear();
        self.erased_last_call = false;
        self.summary_requested = false;
        self.ephemeral_entries.clear();
        self.promoted.clear();
        self.last_summary = None;
        self.call_index = 0;
        self.import_stage = Stage::Idle;
        self.import_stage_started_at = 0;
    }

    pub fn call_index(&self) -> u64 {
        self.call_index
    }

    pub fn import_stage(&self) -> Stage {
        self.import_stage
    }

    pub fn import_stage_started_at(&self) -> u64 {
        self.import_stage_started_at
    }

    pub fn last_summary(&self) -> Option<&Message> {
        self.last_summary.as_ref()
    }

    pub fn is_promoted(&self, id: MessageId) -> bool {
        self.promoted.contains(&id)
    }

    pub fn ephemeral_entry(&self, id: MessageId) -> Option<&EphemeralEntry> {
        self.ephemeral_entries.iter().find(|e| e.id == id)
    }

    pub fn ephemeral_entries(&self) -> &[EphemeralEntry] {
        &self.ephemeral_entries
    }

    /// Keep the stored working context and its public projection in sync
    /// with the loop's message list.
    pub fn update_working_context(&mut self, messages: &[Message]) {
        self.working_context = messages.to_vec();
        self.public_history = messages
            .iter()
            .filter(|m| m.is_role(Role::User) || m.is_role(Role::Assistant))
            .cloned()
            .collect();
    }

    /// Record a completed turn and rebuild the working context as
    /// `initial + responses`.
    pub fn record_turn(&mut self, initial: &[Message], responses: &[Message]) {
        self.audit_journal.push(TurnRecord {
            messages: initial.to_vec(),
            responses: responses.to_vec(),
        });
        let mut rebuilt = initial.to_vec();
        rebuilt.extend(responses.iter().cloned());
        self.update_working_context(&rebuilt);
    }

    pub fn mark_erased(&mut self) {
        self.erased_last_call = true;
    }

    /// Flag a message ephemeral. Promoted messages are exempt; marking an
    /// already-tracked message is a no-op.
    pub fn mark_ephemeral(&mut self, message: &Message, ttl: u64, kind: EphemeralKind) {
        if self.promoted.contains(&message.id) {
            return;
        }
        if self.ephemeral_entries.iter().any(|e| e.id == message.id) {
            return;
        }
        self.ephemeral_entries.push(EphemeralEntry {
            id: message.id,
            expires_at: self.call_index + ttl,
            kind,
        });
    }

    /// Remember `message` as the summary candidate and put it on a
    /// one-turn fuse.
    pub fn mark_summary_candidate(&mut self, message: &Message) {
        self.last_summary = Some(message.clone());
        if self.promoted.contains(&message.id) {
            return;
        }
        match self
            .ephemeral_entries
            .iter_mut()
            .find(|e| e.id == message.id)
        {
            Some(entry) => {
                entry.kind = EphemeralKind::Summary;
                entry.expires_at = self.call_index + 1;
            }
            None => self.ephemeral_entries.push(EphemeralEntry {
                id: message.id,
                expires_at: self.call_index + 1,
                kind: EphemeralKind::Summary,
            }),
        }
    }

    /// Exempt the current summary candidate from pruning. Returns the
    /// promoted message, if any.
    pub fn promote_last_summary(&mut self) -> Option<Message> {
        let summary = self.last_summary.clone()?;
        self.promoted.insert(summary.id);
        self.ephemeral_entries.retain(|e| e.id != summary.id);
        Some(summary)
    }

    /// Rewrite the working context to keep only {user, system} messages,
    /// promoted messages, and `summary`; drop ephemeral entries for
    /// anything no longer present.
    pub fn replace_with_summary(&mut self, messages: &mut Vec<Message>, summary: &Message) {
        messages.retain(|m| {
            m.is_role(Role::User)
                || m.is_role(Role::System)
                || self.promoted.contains(&m.id)
                || m.id == summary.id
        });
        if !messages.iter().any(|m| m.id == summary.id) {
            messages.push(summary.clone());
        }
        let kept: HashSet<MessageId> = messages.iter().map(|m| m.id).collect();
        self.ephemeral_entries.retain(|e| kept.contains(&e.id));
        self.last_summary = Some(summary.clone());
        self.update_working_context(messages);
    }

    /// Ask for a summarize step; moves the pipeline into `summarize`.
    pub fn request_summary(&mut self) {
        self.summary_requested = true;
        self.set_import_stage(Stage::Summarize);
    }

    /// All stage transitions go through here so the `started_at`
    /// timestamp stays truthful.
    pub fn set_import_stage(&mut self, stage: Stage) {
        if self.import_stage != stage {
            self.import_stage = stage;
            self.import_stage_started_at = self.call_index;
        }
    }

    /// Begin a new LLM call: advance the call counter, enforce the stage
    /// TTL, pick up untracked intermediates as ephemeral, and prune
    /// whatever has expired. Returns the number of pruned entries.
    pub fn begin_llm_call(&mut self, messages: &mut Vec<Message>) -> usize {
        self.call_index += 1;
        self.enforce_stage_ttl(messages);

        for message in messages.iter() {
            if message.is_role(Role::User) || message.is_role(Role::System) {
                continue;
            }
            if self.promoted.contains(&message.id) {
                continue;
            }
            if self.ephemeral_entries.iter().any(|e| e.id == message.id) {
                continue;
            }
            self.ephemeral_entries.push(EphemeralEntry {
                id: message.id,
                expires_at: self.call_index + 1,
                kind: EphemeralKind::Auto,
            });
        }

        let expired: HashSet<MessageId> = self
            .ephemeral_entries
            .iter()
            .filter(|e| e.expires_at < self.call_index)
            .map(|e| e.id)
            .collect();
        let expired_count = expired.len();
        if expired_count > 0 {
            tracing::debug!(expired = expired_count, call = self.call_index, "pruning ephemera");
            messages.retain(|m| !expired.contains(&m.id));
            self.ephemeral_entries.retain(|e| !expired.contains(&e.id));

            if let Some(summary) = &self.last_summary {
                if expired.contains(&summary.id) {
                    self.last_summary = None;
                    if self.import_stage == Stage::Summarize {
                        self.set_import_stage(Stage::Idle);
                    }
                }
            }

            let notice = Message::function(
                "policy_notice",
                Content::Data(json!({
                    "expired_entries": expired_count,
                    "message": format!("{expired_count} entries expired"),
                })),
                None,
            );
            self.mark_ephemeral(&notice, 1, EphemeralKind::Policy);
            messages.push(notice);
        }

        self.update_working_context(messages);
        expired_count
    }

    /// Hard circuit-breaker: a stage that has outlived its TTL wipes
    /// every non-{user, system} message, all bookkeeping included.
    fn enforce_stage_ttl(&mut self, messages: &mut Vec<Message>) {
        if self.import_stage == Stage::Idle {
            return;
        }
        if self.call_index.saturating_sub(self.import_stage_started_at) < self.import_stage_ttl_calls
        {
            return;
        }
        tracing::warn!(
            stage = ?self.import_stage,
            started_at = self.import_stage_started_at,
            call = self.call_index,
            "import stage exceeded its TTL; resetting working context"
        );
        messages.retain(|m| m.is_role(Role::User) || m.is_role(Role::System));
        self.ephemeral_entries.clear();
        self.promoted.clear();
        self.last_summary = None;
        self.summary_requested = false;
        self.import_stage = Stage::Idle;
        self.import_stage_started_at = self.call_index;

        let notice = Message::function(
            "policy_notice",
            Content::Data(json!({
                "stage_expired": true,
                "message": "import stage expired; working context reset",
            })),
            None,
        );
        self.mark_ephemeral(&notice, 1, EphemeralKind::Policy);
        messages.push(notice);
    }
}
