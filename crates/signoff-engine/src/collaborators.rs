//! Collaborator boundaries
//!
//! Persistence, notification delivery, and identity resolution are
//! external concerns invoked through these narrow traits. Failures are
//! isolated per call: the orchestrator logs and counts them but never
//! aborts the operation that triggered them.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use uuid::Uuid;

use signoff_core::Workflow;

/// Collaborator call failures
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    /// Persistence backend unavailable; the core continues in memory
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    /// Notification delivery failed; non-fatal for the core
    #[error("notification delivery failed: {0}")]
    DeliveryFailed(String),

    /// Identity could not be resolved
    #[error("unknown identity: {0}")]
    UnknownIdentity(String),
}

/// What a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    StepAssigned,
    TimeoutWarning,
    EscalationOpened,
    EscalationAdvanced,
    WorkflowClosed,
}

/// Durable storage boundary
///
/// Called on every terminal transition and periodically for in-progress
/// workflows. The core tolerates unavailability: operations proceed in
/// memory and the degradation is surfaced as a warning, not a failure.
#[async_trait]
pub trait PersistenceCollaborator: Send + Sync {
    async fn load_active_workflows(&self) -> Result<Vec<Workflow>, CollaboratorError>;
    async fn persist(&self, workflow: &Workflow) -> Result<(), CollaboratorError>;
}

/// Notification delivery boundary; fire-and-forget from the core
#[async_trait]
pub trait NotificationCollaborator: Send + Sync {
    async fn notify(
        &self,
        recipients: &[String],
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), CollaboratorError>;
}

/// Display metadata for an opaque identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub id: String,
    pub display_name: String,
}

/// Identity resolution boundary; identities are opaque strings to the core
#[async_trait]
pub trait IdentityCollaborator: Send + Sync {
    async fn resolve(&self, id: &str) -> Result<IdentityProfile, CollaboratorError>;
}

/// In-memory persistence for tests and examples
///
/// `fail_next` flips the store into an unavailable state so the degraded
/// path can be exercised.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    snapshots: RwLock<HashMap<Uuid, Workflow>>,
    unavailable: AtomicBool,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail until restored
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn snapshot(&self, workflow_id: Uuid) -> Option<Workflow> {
        self.snapshots.read().get(&workflow_id).cloned()
    }
}

#[async_trait]
impl PersistenceCollaborator for InMemoryPersistence {
    async fn load_active_workflows(&self) -> Result<Vec<Workflow>, CollaboratorError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CollaboratorError::PersistenceUnavailable(
                "in-memory store marked unavailable".into(),
            ));
        }
        Ok(self
            .snapshots
            .read()
            .values()
            .filter(|w| !w.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn persist(&self, workflow: &Workflow) -> Result<(), CollaboratorError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CollaboratorError::PersistenceUnavailable(
                "in-memory store marked unavailable".into(),
            ));
        }
        self.snapshots
            .write()
            .insert(workflow.id, workflow.clone());
        Ok(())
    }
}

/// Captured notification for assertions
#[derive(Debug, Clone)]
pub struct RecordedNotification {
    pub recipients: Vec<String>,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
}

/// Notification collaborator that records every call
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: RwLock<Vec<RecordedNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<RecordedNotification> {
        self.sent.read().clone()
    }

    pub fn count_of(&self, kind: NotificationKind) -> usize {
        self.sent.read().iter().filter(|n| n.kind == kind).count()
    }
}

#[async_trait]
impl NotificationCollaborator for RecordingNotifier {
    async fn notify(
        &self,
        recipients: &[String],
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Result<(), CollaboratorError> {
        self.sent.write().push(RecordedNotification {
            recipients: recipients.to_vec(),
            kind,
            payload,
        });
        Ok(())
    }
}

/// Identity collaborator that echoes the opaque id back as display data
#[derive(Debug, Default)]
pub struct StaticIdentity;

#[async_trait]
impl IdentityCollaborator for StaticIdentity {
    async fn resolve(&self, id: &str) -> Result<IdentityProfile, CollaboratorError> {
        Ok(IdentityProfile {
            id: id.to_string(),
            display_name: id.to_string(),
        })
    }
}
