//! Workflow template rendering.
//!
//! Each style is a ComfyUI API-format node graph stored as JSON, either bare
//! (`{"1": {...}, "2": {...}}`) or wrapped as `{"prompt": {...}}`. The
//! sketch enters the graph through `LoadImage` nodes whose `image` input is
//! the [`SKETCH_PLACEHOLDER`] string.

use serde_json::Value;

use crate::error::CoreError;

/// Marker replaced by the session's sketch path.
pub const SKETCH_PLACEHOLDER: &str = "PLACEHOLDER_PATH";

/// Node class that reads the sketch from disk.
const LOAD_IMAGE_CLASS: &str = "LoadImage";

/// Produce the node graph for one job by substituting `sketch_path` into the
/// template.
///
/// Fails when the template is not an object graph or contains no sketch
/// placeholder, since submitting it would ignore the user's drawing.
pub fn render_workflow(template: &Value, sketch_path: &str) -> Result<Value, CoreError> {
    let mut graph = match template.get("prompt") {
        Some(inner) if inner.is_object() => inner.clone(),
        _ => template.clone(),
    };

    let nodes = graph
        .as_object_mut()
        .ok_or_else(|| CoreError::Internal("workflow template is not a JSON object".into()))?;

    let mut substituted = 0usize;
    for node in nodes.values_mut() {
        if node.get("class_type").and_then(Value::as_str) != Some(LOAD_IMAGE_CLASS) {
            continue;
        }
        if let Some(image) = node.pointer_mut("/inputs/image") {
            if image.as_str() == Some(SKETCH_PLACEHOLDER) {
                *image = Value::String(sketch_path.to_string());
                substituted += 1;
            }
        }
    }

    if substituted == 0 {
        return Err(CoreError::Internal(format!(
            "workflow template has no {LOAD_IMAGE_CLASS} node with {SKETCH_PLACEHOLDER}"
        )));
    }
    Ok(graph)
}
