//! Session registry: one live orchestrator per conversation
//!
//! An explicit service object rather than process-global state. Transports
//! resolve a session id to its orchestrator here; the registry wires each
//! new orchestrator to the shared capabilities and seeds its state from an
//! existing checkpoint when one exists, so a process restart does not lose
//! paused sessions.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::channel::SessionChannel;
use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::events::{EventSink, PipelineEvent};
use crate::model::ModelClient;
use crate::pipeline::{Orchestrator, StageContext};
use crate::platform::PlatformClient;
use crate::registry::NodeTypeRegistry;
use crate::Result;

/// Shared capabilities handed to every session's orchestrator
pub struct SessionServices {
    pub config: Config,
    pub model: Arc<dyn ModelClient>,
    pub platform: Arc<dyn PlatformClient>,
    pub node_types: Arc<NodeTypeRegistry>,
    pub store: Arc<dyn CheckpointStore>,
    pub events: Arc<dyn EventSink>,
}

/// Maps session ids to live orchestrators
pub struct SessionRegistry {
    services: SessionServices,
    sessions: Mutex<HashMap<String, Arc<Orchestrator>>>,
}

impl SessionRegistry {
    pub fn new(services: SessionServices) -> Self {
        Self {
            services,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the orchestrator for a session, creating it on first use.
    ///
    /// The channel is per-session: each transport connection supplies its
    /// own. A session with a persisted checkpoint comes back with that
    /// checkpoint's state, which is how a paused run survives a restart.
    pub async fn get_or_create(
        &self,
        session_id: &str,
        channel: Arc<dyn SessionChannel>,
    ) -> Result<Arc<Orchestrator>> {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(session_id) {
            return Ok(existing.clone());
        }

        let ctx = StageContext {
            config: self.services.config.clone(),
            model: self.services.model.clone(),
            platform: self.services.platform.clone(),
            node_types: self.services.node_types.clone(),
            channel,
            events: self.services.events.clone(),
        };

        let orchestrator = match self.services.store.load(session_id).await? {
            Some(checkpoint) => {
                debug!(session = %session_id, "restoring session from checkpoint");
                Arc::new(Orchestrator::with_state(
                    session_id,
                    ctx,
                    self.services.store.clone(),
                    checkpoint.state,
                ))
            }
            None => {
                info!(session = %session_id, "creating session");
                Arc::new(Orchestrator::new(
                    session_id,
                    ctx,
                    self.services.store.clone(),
                ))
            }
        };

        sessions.insert(session_id.to_string(), orchestrator.clone());
        Ok(orchestrator)
    }

    /// Drop a session's live orchestrator. The checkpoint stays; the session
    /// can be reopened later.
    pub async fn remove(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().await;
        if sessions.remove(session_id).is_some() {
            self.services.events.emit(PipelineEvent::SessionClosed {
                session_id: session_id.to_string(),
            });
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
