use std::sync::Arc;

use sketchflow_comfyui::engine::GenerationEngine;

use crate::config::ServerConfig;
use crate::engine::JobOrchestrator;
use crate::session::SessionRegistry;
use crate::storage::ArtifactStore;
use crate::templates::WorkflowTemplates;
use crate::ws::ChannelManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Every live session.
    pub registry: Arc<SessionRegistry>,
    /// Push channel attachment and liveness.
    pub channels: Arc<ChannelManager>,
    /// Generation job runner.
    pub orchestrator: Arc<JobOrchestrator>,
    /// Sketch and result files.
    pub store: ArtifactStore,
    /// Per-style workflow templates.
    pub templates: WorkflowTemplates,
}

impl AppState {
    /// Wire the registry, channel manager and orchestrator around `engine`.
    pub fn new(config: ServerConfig, engine: Arc<dyn GenerationEngine>) -> Self {
        let store = ArtifactStore::from_config(&config.storage);
        let templates = WorkflowTemplates::new(&config.storage.workflow_dir);

        let registry = Arc::new(SessionRegistry::new(
            config.sessions.max_active_sessions,
            config.sessions.session_timeout,
            store.clone(),
        ));
        let channels = Arc::new(ChannelManager::new(
            Arc::clone(&registry),
            config.sessions.heartbeat_check_interval,
            config.sessions.heartbeat_timeout,
        ));
        let orchestrator = Arc::new(JobOrchestrator::new(
            engine,
            templates.clone(),
            store.clone(),
            config.sessions.poll_interval,
        ));

        Self {
            config: Arc::new(config),
            registry,
            channels,
            orchestrator,
            store,
            templates,
        }
    }
}
