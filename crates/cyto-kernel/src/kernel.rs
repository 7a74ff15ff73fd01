//! The kernel loop: per-turn scheduler for LLM calls and tool dispatch

use std::collections::HashMap;
use std::sync::Arc;

use cyto_core::{Content, ContentItem, Error, Message, MessageId, Result, Role};
use serde_json::{Value, json};
use tokio_stream::StreamExt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::builtins;
use crate::events::KernelEvent;
use crate::state::{EphemeralKind, KernelConfig, KernelState, Stage};
use crate::tool::{BoxedTool, to_function_spec};
use crate::transport::{GenerateConfig, ToolCall, Transport};

/// Call budget per run
pub const MAX_LLM_CALL_PER_RUN: u32 = 16;

/// The metabolic-discipline prompt injected when the caller supplies no
/// system message.
pub const SYSTEM_PROMPT: &str = "\
You operate under a finite, non-replayable working context.
If the context exceeds limits, execution halts.

Efficient operation requires selective attention, summarization, and erasure.
Intermediate reasoning and tool outputs are disposable unless explicitly preserved.

Use tools to inspect structure before ingesting content.
Prefer outlines, previews, and selectors over raw reads.

External storage is not working memory.
Reintegration is partial, costly, and must begin with summaries or outlines.
No single action may import large external state verbatim.

Erase low-value intermediate state proactively to preserve operational capacity.
Treat context pressure as a hard constraint, not a suggestion.

Proceed by:
   - scanning before loading
   - summarizing before retaining
   - pruning before continuing

Tooling runs on the local filesystem; absolute paths are valid.
The erase tool operates on the current conversation messages.";

/// Tools whose success moves the pipeline into `outline`
const OUTLINE_TOOLS: &[&str] = &["describe_file", "storage.scan"];
/// Tools gated on `outline`; success moves the pipeline into `select`
const SELECT_TOOLS: &[&str] = &["extract_section", "storage.get", "retrieval"];

/// The desktop tool gets its function content rebuilt around the
/// screenshot so multimodal models see the image inline
const DESKTOP_TOOL: &str = "computer_use";

/// Per-run options
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Response language hint forwarded to the transport
    pub lang: String,
    /// Optional sampling seed
    pub seed: Option<u64>,
    /// Knowledge preamble supplied by the surrounding assistant; appended
    /// to the system message when present
    pub knowledge: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            seed: None,
            knowledge: None,
        }
    }
}

/// The context-metabolism kernel.
///
/// Owns the working-context state, the tool registry, and a handle to
/// the LLM transport. Not reentrant: one run at a time.
pub struct Kernel {
    config: KernelConfig,
    state: KernelState,
    tools: Vec<BoxedTool>,
    transport: Arc<dyn Transport>,
    event_tx: broadcast::Sender<KernelEvent>,
    cancel: CancellationToken,
    /// Compiled parameter-schema validators keyed by tool name
    schema_cache: HashMap<String, Arc<jsonschema::Validator>>,
}

impl Kernel {
    /// Create a new kernel
    pub fn new(config: KernelConfig, transport: Arc<dyn Transport>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let state = KernelState::new(&config);
        let mut kernel = Self {
            config,
            state,
            tools: vec![],
            transport,
            event_tx,
            cancel: CancellationToken::new(),
            schema_cache: HashMap::new(),
        };
        for spec in builtins::function_specs() {
            kernel.cache_schema(&spec.name, &spec.parameters);
        }
        kernel
    }

    /// Subscribe to kernel events
    pub fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.event_tx.subscribe()
    }

    /// Current kernel state
    pub fn state(&self) -> &KernelState {
        &self.state
    }

    /// Kernel configuration
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Register a tool
    pub fn add_tool(&mut self, tool: BoxedTool) {
        self.cache_schema(tool.name(), &tool.parameters_schema());
        self.tools.push(tool);
    }

    /// Registered tool names, built-ins excluded
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Clear all kernel state
    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Abort the current run
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    fn cache_schema(&mut self, name: &str, schema: &Value) {
        match jsonschema::validator_for(schema) {
            Ok(validator) => {
                self.schema_cache
                    .insert(name.to_string(), Arc::new(validator));
            }
            Err(e) => {
                tracing::warn!(
                    "Invalid tool parameter schema for '{}', skipping validation: {}",
                    name,
                    e
                );
            }
        }
    }

    /// Function schemas exposed to the model: built-ins plus registry
    fn function_specs(&self) -> Vec<cyto_core::FunctionSpec> {
        let mut specs = builtins::function_specs();
        specs.extend(self.tools.iter().map(|t| to_function_spec(t.as_ref())));
        specs
    }

    /// Drive one user invocation to quiescence.
    ///
    /// Streams cumulative response snapshots through the event channel
    /// and returns the final response. Transport errors propagate;
    /// tool errors are folded into the conversation instead.
    pub async fn run(&mut self, input: Vec<Message>, opts: RunOptions) -> Result<Vec<Message>> {
        let mut messages = input;
        if !messages.iter().any(|m| m.is_role(Role::System)) {
            messages.insert(0, Message::system(self.config.system_prompt.clone()));
        }
        if let Some(knowledge) = opts.knowledge.as_deref() {
            if !knowledge.is_empty() {
                if let Some(system) = messages.iter_mut().find(|m| m.is_role(Role::System)) {
                    let mut text = system.text();
                    text.push_str("\n\n");
                    text.push_str(knowledge);
                    system.content = Content::Text(text);
                }
            }
        }

        let initial = messages.clone();
        let mut calls_available = self.config.max_llm_calls;
        let mut response: Vec<Message> = Vec::new();
        let mut finished = false;
        let _ = self.event_tx.send(KernelEvent::RunStart);

        while !finished && calls_available > 0 {
            calls_available -= 1;

            let expired = self.state.begin_llm_call(&mut messages);
            let _ = self.event_tx.send(KernelEvent::CallStart {
                call_index: self.state.call_index(),
            });
            if expired > 0 {
                let _ = self.event_tx.send(KernelEvent::ContextPruned {
                    expired_entries: expired,
                });
            }

            let generate = GenerateConfig {
                lang: opts.lang.clone(),
                seed: opts.seed,
            };
            let mut stream = self
                .transport
                .call_llm(
                    messages.clone(),
                    self.function_specs(),
                    &generate,
                    self.cancel.clone(),
                )
                .await?;

            let mut output: Vec<Message> = Vec::new();
            while let Some(partial) = stream.next().await {
                if !partial.is_empty() {
                    output = partial;
                    let mut snapshot = response.clone();
                    snapshot.extend(output.iter().cloned());
                    let _ = self
                        .event_tx
                        .send(KernelEvent::ResponseUpdate { messages: snapshot });
                }
            }
            if output.is_empty() {
                break;
            }

            response.extend(output.iter().cloned());
            messages.extend(output.iter().cloned());
            for out in &output {
                if !(out.is_role(Role::User) || out.is_role(Role::System)) {
                    self.state.mark_ephemeral(out, 1, EphemeralKind::Auto);
                }
            }
            self.state.update_working_context(&messages);

            let mut used_any_tool = false;
            let mut summary_taken = false;
            for out in output.clone() {
                match self.transport.detect_tool(&out) {
                    Some(call) => {
                        used_any_tool = true;
                        self.dispatch_tool(call, &mut messages, &mut response).await;
                    }
                    None => {
                        if !summary_taken
                            && out.is_role(Role::Assistant)
                            && self.state.import_stage() == Stage::Summarize
                            && self.state.summary_requested
                        {
                            summary_taken = true;
                            self.capture_summary(&out, &mut messages, &mut response);
                        }
                    }
                }
            }
            if !used_any_tool {
                finished = true;
            }
        }

        if !finished && calls_available == 0 {
            // The model was still mid-pipeline when the budget ran out
            let notice = Message::function(
                "policy_notice",
                Content::Data(json!({"budget_exhausted": true})),
                None,
            );
            self.state.mark_ephemeral(&notice, 1, EphemeralKind::Policy);
            messages.push(notice.clone());
            response.push(notice);
            self.state.update_working_context(&messages);
        }

        if !response.is_empty() {
            self.state.record_turn(&initial, &response);
        }
        let _ = self.event_tx.send(KernelEvent::ResponseUpdate {
            messages: response.clone(),
        });
        let _ = self.event_tx.send(KernelEvent::RunEnd {
            calls_used: self.config.max_llm_calls - calls_available,
        });
        Ok(response)
    }

    /// Capture a plain assistant output as the pending summary: truncate
    /// it to the import cap, collapse the working context around it, and
    /// put it on the summary fuse.
    fn capture_summary(
        &mut self,
        out: &Message,
        messages: &mut Vec<Message>,
        response: &mut Vec<Message>,
    ) {
        let truncated = truncate_chars(&out.text(), self.state.import_cap_chars);
        let content = Content::Text(truncated);
        set_content_by_id(messages, out.id, &content);
        set_content_by_id(response, out.id, &content);
        let summary = messages
            .iter()
            .find(|m| m.id == out.id)
            .cloned()
            .unwrap_or_else(|| {
                let mut fallback = out.clone();
                fallback.content = content.clone();
                fallback
            });
        self.state.replace_with_summary(messages, &summary);
        self.state.mark_summary_candidate(&summary);
        self.state.summary_requested = false;
    }

    /// Gate, validate, execute, and fold one tool call back into the
    /// conversation as a function message.
    async fn dispatch_tool(
        &mut self,
        call: ToolCall,
        messages: &mut Vec<Message>,
        response: &mut Vec<Message>,
    ) {
        let _ = self.event_tx.send(KernelEvent::ToolExecutionStart {
            tool_name: call.name.clone(),
            arguments: serde_json::from_str(&call.arguments).unwrap_or(Value::Null),
        });

        let (result, is_error) = match self.stage_gate(&call.name) {
            Err(err) => (err.wire(), true),
            Ok(()) => match parse_arguments(&call.arguments) {
                Err(err) => (err.wire(), true),
                Ok(args) => match self.validate_args(&call.name, &args) {
                    Some(detail) => (Error::MissingArgument(detail).wire(), true),
                    None => match self.execute_tool(&call.name, &args, messages).await {
                        Ok(value) => {
                            self.apply_stage_transition(&call.name, &value);
                            (value, false)
                        }
                        Err(err) => (err.wire(), true),
                    },
                },
            },
        };

        let _ = self.event_tx.send(KernelEvent::ToolExecutionEnd {
            tool_name: call.name.clone(),
            result: result.clone(),
            is_error,
        });

        let content = self.function_content(&call.name, result);
        let function_id = call.function_id.unwrap_or_else(|| "1".to_string());
        let fn_msg = Message::function(&call.name, content, Some(function_id));
        messages.push(fn_msg.clone());
        response.push(fn_msg.clone());
        self.state.mark_ephemeral(&fn_msg, 1, EphemeralKind::Tool);
        self.state.update_working_context(messages);
        let _ = self.event_tx.send(KernelEvent::ResponseUpdate {
            messages: response.clone(),
        });
    }

    /// Enforce the reintegration pipeline on tool names
    fn stage_gate(&self, name: &str) -> Result<()> {
        let stage = self.state.import_stage();
        if SELECT_TOOLS.contains(&name) && stage != Stage::Outline {
            return Err(Error::StageViolation {
                detail: format!("Select step \"{name}\" called before outline."),
            });
        }
        if name == builtins::SUMMARIZE && stage != Stage::Select {
            return Err(Error::StageViolation {
                detail: format!("Summarize step \"{name}\" called before select."),
            });
        }
        if name == builtins::PROMOTE && stage != Stage::Summarize {
            return Err(Error::StageViolation {
                detail: format!("Promote step \"{name}\" called before summarize."),
            });
        }
        Ok(())
    }

    fn validate_args(&self, name: &str, args: &Value) -> Option<String> {
        let validator = self.schema_cache.get(name)?;
        let errors: Vec<String> = validator
            .iter_errors(args)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{path}: {e}")
                }
            })
            .collect();
        if errors.is_empty() {
            None
        } else {
            Some(format!(
                "Tool argument validation failed:\n{}",
                errors.join("\n")
            ))
        }
    }

    async fn execute_tool(
        &mut self,
        name: &str,
        args: &Value,
        messages: &mut Vec<Message>,
    ) -> Result<Value> {
        match name {
            builtins::ERASE => Ok(builtins::erase(args, messages, &mut self.state)),
            builtins::SUMMARIZE => Ok(builtins::summarize(args, &mut self.state)),
            builtins::PROMOTE => Ok(builtins::promote(args, &mut self.state)),
            _ => {
                let tool = self.tools.iter().find(|t| t.name() == name).cloned();
                match tool {
                    Some(tool) => tool.execute(args.clone(), self.cancel.clone()).await,
                    None => Err(Error::UnsupportedOperation(format!("Tool not found: {name}"))),
                }
            }
        }
    }

    /// Successful tools advance the pipeline
    fn apply_stage_transition(&mut self, name: &str, result: &Value) {
        let stage = if OUTLINE_TOOLS.contains(&name) {
            Some(Stage::Outline)
        } else if SELECT_TOOLS.contains(&name) {
            Some(Stage::Select)
        } else if name == builtins::SUMMARIZE {
            // request_summary already moved the stage
            Some(Stage::Summarize)
        } else if name == builtins::PROMOTE && result["promoted"] == json!(true) {
            Some(Stage::Idle)
        } else {
            None
        };
        if let Some(stage) = stage {
            self.state.set_import_stage(stage);
            let _ = self.event_tx.send(KernelEvent::StageChanged { stage });
        }
    }

    /// Shape the function-message content for a tool result: desktop
    /// results are rebuilt around their screenshot; everything else stays
    /// structured while it fits the import cap and is truncated as text
    /// beyond it.
    fn function_content(&self, name: &str, result: Value) -> Content {
        let cap = self.state.import_cap_chars;
        if name == DESKTOP_TOOL {
            if let Some(shot) = result
                .get("screenshot")
                .and_then(Value::as_str)
                .map(str::to_string)
            {
                let mut sans = result.clone();
                if let Some(obj) = sans.as_object_mut() {
                    obj.remove("screenshot");
                }
                let serialized = serde_json::to_string(&sans).unwrap_or_default();
                return Content::Items(vec![
                    ContentItem::image(shot),
                    ContentItem::text(truncate_chars(&serialized, cap)),
                ]);
            }
        }
        let serialized = serde_json::to_string(&result).unwrap_or_default();
        if serialized.chars().count() > cap {
            Content::Text(truncate_chars(&serialized, cap))
        } else {
            Content::Data(result)
        }
    }
}

fn parse_arguments(raw: &str) -> Result<Value> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw)
        .map_err(|e| Error::MissingArgument(format!("Tool arguments are not valid JSON: {e}")))
}

/// Truncate to at most `cap` characters on a char boundary
fn truncate_chars(text: &str, cap: usize) -> String {
    if cap == 0 || text.chars().count() <= cap {
        return text.to_string();
    }
    text.chars().take(cap).collect()
}

fn set_content_by_id(list: &mut [Message], id: MessageId, content: &Content) {
    if let Some(message) = list.iter_mut().find(|m| m.id == id) {
        message.content = content.clone();
    }
}
