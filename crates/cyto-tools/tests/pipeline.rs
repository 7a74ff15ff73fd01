//! End-to-end scenarios: the kernel loop driving the real file tools
//! against files on disk, with a scripted transport standing in for the
//! model.

use async_trait::async_trait;
use cyto_core::{Content, FunctionSpec, Message, Result, Role};
use cyto_kernel::{
    GenerateConfig, Kernel, KernelConfig, RunOptions, Stage, Transport,
    transport::AssistantStream,
};
use cyto_tools::files::file_tools;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct ScriptedTransport {
    scripts: Mutex<VecDeque<Vec<Message>>>,
}

impl ScriptedTransport {
    fn new(scripts: Vec<Vec<Message>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
        })
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call_llm(
        &self,
        _messages: Vec<Message>,
        _functions: Vec<FunctionSpec>,
        _config: &GenerateConfig,
        _cancel: CancellationToken,
    ) -> Result<AssistantStream> {
        let output = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| vec![Message::assistant("done")]);
        Ok(Box::pin(async_stream::stream! {
            yield output;
        }))
    }
}

fn kernel_with_file_tools(scripts: Vec<Vec<Message>>) -> Kernel {
    let mut kernel = Kernel::new(KernelConfig::default(), ScriptedTransport::new(scripts));
    for tool in file_tools() {
        kernel.add_tool(tool);
    }
    kernel
}

fn temp_json(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn function_payload(response: &[Message], name: &str) -> Value {
    let message = response
        .iter()
        .find(|m| m.is_role(Role::Function) && m.name.as_deref() == Some(name))
        .unwrap_or_else(|| panic!("no function message named {name}"));
    match &message.content {
        Content::Data(v) => v.clone(),
        Content::Text(t) => serde_json::from_str(t).expect("function payload parses"),
        Content::Items(_) => panic!("unexpected multimodal function content"),
    }
}

#[tokio::test]
async fn test_select_before_outline_rejected_end_to_end() {
    let file = temp_json(r#"{"a": 1}"#);
    let path = file.path().to_string_lossy().into_owned();
    let mut kernel = kernel_with_file_tools(vec![vec![Message::assistant_call(
        "extract_section",
        json!({"path": path, "selector": ["a"]}).to_string(),
        "c1",
    )]]);

    let response = kernel
        .run(
            vec![Message::user("read the file at key a")],
            RunOptions::default(),
        )
        .await
        .unwrap();

    let reply = function_payload(&response, "extract_section");
    assert_eq!(
        reply["error"],
        "Reintegration requires outline → select → summarize → load."
    );
    assert_eq!(
        reply["detail"],
        "Select step \"extract_section\" called before outline."
    );
    // The file was never touched
    assert_eq!(
        std::fs::read_to_string(file.path()).unwrap(),
        r#"{"a": 1}"#
    );
}

#[tokio::test]
async fn test_full_reintegration_pipeline_with_real_files() {
    let file = temp_json(r#"{"a": {"threshold": 40}, "b": 2}"#);
    let path = file.path().to_string_lossy().into_owned();
    let scripts = vec![
        vec![Message::assistant_call(
            "describe_file",
            json!({"path": path}).to_string(),
            "d1",
        )],
        vec![Message::assistant_call(
            "extract_section",
            json!({"path": path, "selector": ["a"]}).to_string(),
            "e1",
        )],
        vec![Message::assistant_call(
            "summarize",
            json!({"reason": "keep only the threshold"}).to_string(),
            "s1",
        )],
        vec![
            Message::assistant("a.threshold is 40"),
            Message::assistant_call("promote", json!({"reason": "keep"}).to_string(), "p1"),
        ],
    ];
    let mut kernel = kernel_with_file_tools(scripts);

    let response = kernel
        .run(vec![Message::user("study the config")], RunOptions::default())
        .await
        .unwrap();

    let outline = function_payload(&response, "describe_file");
    assert_eq!(outline["kind"], "map");
    assert_eq!(outline["outline"]["keys"], json!(["a", "b"]));

    let extracted = function_payload(&response, "extract_section");
    assert_eq!(extracted["value"], json!({"threshold": 40}));

    assert_eq!(
        function_payload(&response, "summarize"),
        json!({"requested": true})
    );

    let promoted = function_payload(&response, "promote");
    assert_eq!(promoted["promoted"], true);
    assert_eq!(promoted["summary_preview"], "a.threshold is 40");

    let summary = response
        .iter()
        .find(|m| m.is_role(Role::Assistant) && m.text() == "a.threshold is 40")
        .expect("summary message present");
    assert!(kernel.state().is_promoted(summary.id));
    assert_eq!(kernel.state().import_stage(), Stage::Idle);
}

#[tokio::test]
async fn test_shape_round_trip_through_the_loop() {
    let file = temp_json(r#"{"a": {"b": [1, 2, 3]}}"#);
    let path = file.path().to_string_lossy().into_owned();
    let scripts = vec![
        vec![Message::assistant_call(
            "describe_file",
            json!({"path": path}).to_string(),
            "d1",
        )],
        vec![Message::assistant_call(
            "replace_section",
            json!({"path": path, "selector": "a.b[1]", "value": 99}).to_string(),
            "r1",
        )],
        vec![Message::assistant_call(
            "extract_section",
            json!({"path": path, "selector": ["a", "b"]}).to_string(),
            "e1",
        )],
    ];
    let mut kernel = kernel_with_file_tools(scripts);

    let response = kernel
        .run(vec![Message::user("bump the second entry")], RunOptions::default())
        .await
        .unwrap();

    assert_eq!(
        function_payload(&response, "replace_section"),
        json!({"changed": true, "kind": "map"})
    );
    assert_eq!(
        function_payload(&response, "extract_section"),
        json!({"value": [1, 99, 3], "kind": "map"})
    );
}

#[tokio::test]
async fn test_unknown_extension_blob_then_select_error() {
    let mut file = tempfile::Builder::new().suffix(".xyz").tempfile().unwrap();
    file.write_all(b"opaque").unwrap();
    let path = file.path().to_string_lossy().into_owned();
    let scripts = vec![
        vec![Message::assistant_call(
            "describe_file",
            json!({"path": path}).to_string(),
            "d1",
        )],
        vec![Message::assistant_call(
            "extract_section",
            json!({"path": path, "selector": "a"}).to_string(),
            "e1",
        )],
    ];
    let mut kernel = kernel_with_file_tools(scripts);

    let response = kernel
        .run(vec![Message::user("inspect")], RunOptions::default())
        .await
        .unwrap();

    // Outline falls back to an identifying blob summary
    let outline = function_payload(&response, "describe_file");
    assert_eq!(outline["kind"], "blob");
    assert_eq!(outline["outline"]["size"], 6);

    // Selection on a blob is a structured error listing the registry
    let reply = function_payload(&response, "extract_section");
    assert_eq!(reply["error"], "unsupported_file_type");
    assert!(reply["detail"].as_str().unwrap().contains("Supported extensions"));
}

#[tokio::test]
async fn test_erase_help_through_the_loop() {
    let mut kernel = kernel_with_file_tools(vec![vec![Message::assistant_call(
        "erase",
        json!({"targets": [], "reason": "survey"}).to_string(),
        "x1",
    )]]);
    let response = kernel
        .run(
            vec![Message::user("what can I erase?")],
            RunOptions::default(),
        )
        .await
        .unwrap();

    let help = function_payload(&response, "erase");
    assert_eq!(help["erased"], json!([]));
    let recent = help["help"]["recent"].as_array().unwrap();
    assert!(!recent.is_empty());
    assert!(recent.len() <= 6);
    for entry in recent {
        assert!(entry["text"].as_str().unwrap().chars().count() <= 83);
    }
}

#[tokio::test]
async fn test_ephemeral_tool_outputs_decay_over_turns() {
    let file = temp_json(r#"{"a": 1}"#);
    let path = file.path().to_string_lossy().into_owned();
    // Three outline calls in a row keep resetting nothing; outputs from
    // the first call must be pruned by the third.
    let scripts = (0..3)
        .map(|i| {
            vec![Message::assistant_call(
                "describe_file",
                json!({"path": path}).to_string(),
                format!("d{i}"),
            )]
        })
        .collect::<Vec<_>>();
    let mut kernel = kernel_with_file_tools(scripts);
    let mut events = kernel.subscribe();

    kernel
        .run(vec![Message::user("keep looking")], RunOptions::default())
        .await
        .unwrap();

    let mut pruned = 0usize;
    while let Ok(event) = events.try_recv() {
        if let cyto_kernel::KernelEvent::ContextPruned { expired_entries } = event {
            pruned += expired_entries;
        }
    }
    assert!(pruned > 0, "first call's intermediates should have expired");
}
