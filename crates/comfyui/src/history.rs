//! Typed view of the ComfyUI `/history/{prompt_id}` response.
//!
//! ComfyUI answers with `{"<prompt_id>": {"status": {...}, "outputs": {...}}}`
//! once it knows about the prompt, and with `{}` while the prompt is still
//! queued.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

/// Full history response body, keyed by prompt id.
pub type HistoryResponse = HashMap<String, HistoryEntry>;

/// History record for one prompt.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub status: Option<HistoryStatus>,
    /// Per-node outputs, iterated in node-id order.
    #[serde(default)]
    pub outputs: BTreeMap<String, NodeOutput>,
}

/// Execution status block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryStatus {
    /// `"success"`, `"error"`, or absent/other while running.
    #[serde(default)]
    pub status_str: String,
    #[serde(default)]
    pub completed: bool,
    /// Execution log as `[event_name, data]` pairs.
    #[serde(default)]
    pub messages: Vec<(String, serde_json::Value)>,
}

/// Output produced by one node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    #[serde(default)]
    pub images: Option<Vec<ImageRef>>,
}

/// Reference to an image stored by ComfyUI, fetchable via `/view`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ImageRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(rename = "type", default = "default_image_type")]
    pub kind: String,
}

fn default_image_type() -> String {
    "output".to_string()
}

/// Coarse execution state derived from a history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed(String),
}

impl HistoryEntry {
    /// Interpret the status block.
    pub fn execution_status(&self) -> ExecutionStatus {
        let Some(status) = &self.status else {
            return ExecutionStatus::Running;
        };

        match status.status_str.as_str() {
            "error" => ExecutionStatus::Failed(
                status
                    .error_message()
                    .unwrap_or_else(|| "ComfyUI reported an execution error".to_string()),
            ),
            "success" => ExecutionStatus::Succeeded,
            _ if status.completed => ExecutionStatus::Succeeded,
            _ => ExecutionStatus::Running,
        }
    }

    /// Event names of the execution log, in order.
    pub fn message_events(&self) -> impl Iterator<Item = &str> {
        self.status
            .iter()
            .flat_map(|s| s.messages.iter().map(|(event, _)| event.as_str()))
    }

    /// First image of the first node (in node-id order) that lists images.
    pub fn first_image(&self) -> Option<&ImageRef> {
        self.outputs
            .values()
            .filter_map(|output| output.images.as_ref())
            .find_map(|images| images.first())
    }
}

impl HistoryStatus {
    /// `exception_message` of the first `execution_error` event, if any.
    fn error_message(&self) -> Option<String> {
        self.messages
            .iter()
            .find(|(event, _)| event == "execution_error")
            .and_then(|(_, data)| data.get("exception_message"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    }
}
