//! Shared fakes for runtime tests.
//!
//! Compiled unconditionally so the fakes stay usable from downstream test
//! suites as well as this crate's own.

use crate::cancel::CancellationGate;
use crate::errors::{CostError, StreamOpenError};
use crate::traits::{
    AgentTemplate, ChunkStream, CostSink, DelegateResponse, FileProvider, StreamRequest,
    StreamSource, TemplateSource, ToolDelegate,
};
use crate::types::RunContext;
use async_trait::async_trait;
use drover_core::events::StreamChunk;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// A run context with one user, input, and session, all pre-registered by
/// [`open_gate`].
pub fn run_context() -> RunContext {
    RunContext::new("agent-1", "user-1", "input-1", "sess-1")
}

/// A gate where [`run_context`]'s input is live.
pub fn open_gate() -> CancellationGate {
    let gate = CancellationGate::new();
    gate.start("user-1", "input-1");
    gate.set_session_connected("sess-1", true);
    gate
}

/// Delegate that records call order and plays back a configured response.
pub struct RecordingDelegate {
    calls: Mutex<Vec<String>>,
    response: Mutex<Result<DelegateResponse, String>>,
}

impl RecordingDelegate {
    /// A delegate that acknowledges every call with `{"ok": true}`.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            response: Mutex::new(Ok(DelegateResponse {
                success: true,
                output: json!({"ok": true}),
            })),
        }
    }

    /// Succeed with the given payload from now on.
    pub fn respond_with(&self, output: Value) {
        *self.response.lock() = Ok(DelegateResponse {
            success: true,
            output,
        });
    }

    /// Report a tool-level failure from now on.
    pub fn fail_with(&self, message: &str) {
        *self.response.lock() = Ok(DelegateResponse {
            success: false,
            output: Value::String(message.to_owned()),
        });
    }

    /// Fail at the transport level from now on.
    pub fn break_transport(&self, message: &str) {
        *self.response.lock() = Err(message.to_owned());
    }

    /// Tool names in the order they reached the delegate.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl Default for RecordingDelegate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolDelegate for RecordingDelegate {
    async fn execute(
        &self,
        _user_input_id: &str,
        tool_name: &str,
        _input: &Value,
    ) -> Result<DelegateResponse, String> {
        self.calls.lock().push(tool_name.to_owned());
        self.response.lock().clone()
    }
}

/// Stream source that plays back one scripted chunk list per `open` call.
pub struct ScriptedStreams {
    scripts: Mutex<VecDeque<Vec<StreamChunk>>>,
}

impl ScriptedStreams {
    /// One script per expected model invocation, in order.
    pub fn new(scripts: Vec<Vec<StreamChunk>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
        }
    }

    /// A single invocation's script.
    pub fn single(chunks: Vec<StreamChunk>) -> Self {
        Self::new(vec![chunks])
    }
}

#[async_trait]
impl StreamSource for ScriptedStreams {
    async fn open(&self, _request: StreamRequest) -> Result<ChunkStream, StreamOpenError> {
        let chunks = self
            .scripts
            .lock()
            .pop_front()
            .ok_or_else(|| StreamOpenError("no scripted response left".into()))?;
        Ok(futures::stream::iter(chunks).boxed())
    }
}

/// Text chunk helper.
pub fn text_chunk(text: &str) -> StreamChunk {
    StreamChunk::Text { text: text.into() }
}

/// Terminal chunk helper.
pub fn done_chunk(credits: f64) -> StreamChunk {
    StreamChunk::Done {
        message_id: "msg-1".into(),
        credits,
    }
}

/// A `<tool_call>` block for the given tool, as one text chunk.
pub fn call_chunk(tool_name: &str, input: Value) -> StreamChunk {
    text_chunk(&format!(
        "<tool_call>{}</tool_call>",
        json!({"name": tool_name, "input": input})
    ))
}

/// Template source backed by a fixed map.
pub struct StaticTemplates {
    templates: HashMap<String, Arc<AgentTemplate>>,
}

impl StaticTemplates {
    /// Build from a list of templates, keyed by their ids.
    pub fn new(templates: Vec<AgentTemplate>) -> Self {
        Self {
            templates: templates
                .into_iter()
                .map(|template| (template.id.clone(), Arc::new(template)))
                .collect(),
        }
    }
}

impl TemplateSource for StaticTemplates {
    fn template(&self, agent_type: &str) -> Option<Arc<AgentTemplate>> {
        self.templates.get(agent_type).cloned()
    }
}

/// Cost sink that records spend, optionally failing every call.
pub struct LedgerSpy {
    recorded: Mutex<Vec<(String, f64)>>,
    failing: Mutex<bool>,
}

impl LedgerSpy {
    /// A sink that accepts everything.
    pub fn new() -> Self {
        Self {
            recorded: Mutex::new(Vec::new()),
            failing: Mutex::new(false),
        }
    }

    /// Make every subsequent record fail.
    pub fn start_failing(&self) {
        *self.failing.lock() = true;
    }

    /// Everything recorded so far.
    pub fn recorded(&self) -> Vec<(String, f64)> {
        self.recorded.lock().clone()
    }
}

impl Default for LedgerSpy {
    fn default() -> Self {
        Self::new()
    }
}

impl CostSink for LedgerSpy {
    fn record(&self, agent_id: &str, credits: f64) -> Result<(), CostError> {
        if *self.failing.lock() {
            return Err(CostError("ledger unavailable".into()));
        }
        self.recorded.lock().push((agent_id.to_owned(), credits));
        Ok(())
    }
}

/// File provider backed by a fixed map; unknown paths come back `None`.
pub struct StaticFiles {
    files: HashMap<String, String>,
}

impl StaticFiles {
    /// Provider with no files at all.
    pub fn empty() -> Self {
        Self {
            files: HashMap::new(),
        }
    }

    /// Provider over the given path/content pairs.
    pub fn new(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(path, content)| ((*path).to_owned(), (*content).to_owned()))
                .collect(),
        }
    }
}

#[async_trait]
impl FileProvider for StaticFiles {
    async fn fetch(&self, paths: &[String]) -> HashMap<String, Option<String>> {
        paths
            .iter()
            .map(|path| (path.clone(), self.files.get(path).cloned()))
            .collect()
    }
}
