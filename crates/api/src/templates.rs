//! Per-style workflow templates stored as `{workflow_dir}/{style}.json`.

use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use sketchflow_core::error::CoreError;
use sketchflow_core::validation::DEFAULT_STYLE;
use sketchflow_core::workflow::render_workflow;

/// Loads style templates from disk and renders them for a sketch.
#[derive(Debug, Clone)]
pub struct WorkflowTemplates {
    dir: PathBuf,
}

impl WorkflowTemplates {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Render the template for `style` with `sketch_path` substituted.
    ///
    /// A style without a template file falls back to the default style.
    pub async fn render(&self, style: &str, sketch_path: &Path) -> Result<Value, CoreError> {
        let template = match self.load(style).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound && style != DEFAULT_STYLE => {
                tracing::warn!(style, "No workflow template for style, using default");
                self.load(DEFAULT_STYLE).await
            }
            other => other,
        }
        .map_err(|e| CoreError::Internal(format!("Failed to load workflow template: {e}")))?;

        render_workflow(&template, &sketch_path.to_string_lossy())
    }

    /// Names of every available style, sorted. Falls back to the default
    /// style when the directory holds no templates.
    pub async fn list_styles(&self) -> Vec<String> {
        let mut styles = Vec::new();

        match tokio::fs::read_dir(&self.dir).await {
            Ok(mut entries) => loop {
                match entries.next_entry().await {
                    Ok(Some(entry)) => {
                        let path = entry.path();
                        if path.extension().and_then(|e| e.to_str()) == Some("json") {
                            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                                styles.push(stem.to_string());
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read workflow directory entry");
                        break;
                    }
                }
            },
            Err(e) => {
                tracing::warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "Workflow directory unreadable",
                );
            }
        }

        if styles.is_empty() {
            styles.push(DEFAULT_STYLE.to_string());
        }
        styles.sort();
        styles
    }

    async fn load(&self, style: &str) -> io::Result<Value> {
        let raw = tokio::fs::read(self.dir.join(format!("{style}.json"))).await?;
        serde_json::from_slice(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
