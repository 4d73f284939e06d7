//! Virtual task board, document store and entity status store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use autoflow_app::ports::{DocumentService, NewTask, StatusService, TaskService};
use autoflow_domain::error::ActionError;

use super::{Journal, lock};

/// Hands out `<prefix>-<n>` ids, one per fresh creation.
#[derive(Debug, Clone)]
struct Sequence {
    prefix: &'static str,
    next: Arc<AtomicU64>,
}

impl Sequence {
    fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    fn next_id(&self) -> String {
        format!("{}-{}", self.prefix, self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Tasks created by automations.
#[derive(Debug, Clone)]
pub struct VirtualTaskBoard {
    journal: Journal<String>,
    ids: Sequence,
    tasks: Arc<Mutex<HashMap<String, NewTask>>>,
}

impl Default for VirtualTaskBoard {
    fn default() -> Self {
        Self {
            journal: Journal::default(),
            ids: Sequence::new("task"),
            tasks: Arc::default(),
        }
    }
}

impl VirtualTaskBoard {
    #[must_use]
    pub fn get(&self, task_id: &str) -> Option<NewTask> {
        lock(&self.tasks).get(task_id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.tasks).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaskService for VirtualTaskBoard {
    async fn create(&self, task: NewTask, idempotency_key: &str) -> Result<String, ActionError> {
        if task.title.trim().is_empty() {
            return Err(ActionError::permanent("task title is empty"));
        }
        let title = task.title.clone();
        let (task_id, fresh) = self.journal.once(idempotency_key, || {
            let id = self.ids.next_id();
            lock(&self.tasks).insert(id.clone(), task);
            id
        });
        if fresh {
            tracing::info!(%task_id, %title, idempotency_key, "task created");
        }
        Ok(task_id)
    }
}

/// Stored document, as created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub title: String,
    pub content: String,
}

/// Documents drafted by automations.
#[derive(Debug, Clone)]
pub struct VirtualDocumentStore {
    journal: Journal<String>,
    ids: Sequence,
    documents: Arc<Mutex<HashMap<String, StoredDocument>>>,
}

impl Default for VirtualDocumentStore {
    fn default() -> Self {
        Self {
            journal: Journal::default(),
            ids: Sequence::new("doc"),
            documents: Arc::default(),
        }
    }
}

impl VirtualDocumentStore {
    #[must_use]
    pub fn get(&self, document_id: &str) -> Option<StoredDocument> {
        lock(&self.documents).get(document_id).cloned()
    }
}

impl DocumentService for VirtualDocumentStore {
    async fn create(
        &self,
        title: &str,
        content: &str,
        idempotency_key: &str,
    ) -> Result<String, ActionError> {
        if title.trim().is_empty() {
            return Err(ActionError::permanent("document title is empty"));
        }
        let (document_id, fresh) = self.journal.once(idempotency_key, || {
            let id = self.ids.next_id();
            lock(&self.documents).insert(
                id.clone(),
                StoredDocument {
                    title: title.to_string(),
                    content: content.to_string(),
                },
            );
            id
        });
        if fresh {
            tracing::info!(%document_id, title, idempotency_key, "document created");
        }
        Ok(document_id)
    }
}

type FieldKey = (String, String, String);

/// Field values of domain entities, last write wins.
#[derive(Debug, Clone, Default)]
pub struct VirtualStatusStore {
    journal: Journal<()>,
    fields: Arc<Mutex<HashMap<FieldKey, String>>>,
}

impl VirtualStatusStore {
    /// Current value of `entity/entity_id.field`.
    #[must_use]
    pub fn get(&self, entity: &str, entity_id: &str, field: &str) -> Option<String> {
        lock(&self.fields)
            .get(&(entity.to_string(), entity_id.to_string(), field.to_string()))
            .cloned()
    }
}

impl StatusService for VirtualStatusStore {
    async fn update(
        &self,
        entity: &str,
        entity_id: &str,
        field: &str,
        value: &str,
        idempotency_key: &str,
    ) -> Result<(), ActionError> {
        let ((), fresh) = self.journal.once(idempotency_key, || {
            let previous = lock(&self.fields).insert(
                (entity.to_string(), entity_id.to_string(), field.to_string()),
                value.to_string(),
            );
            tracing::info!(
                entity,
                entity_id,
                field,
                value,
                ?previous,
                idempotency_key,
                "status updated"
            );
        });
        if !fresh {
            tracing::debug!(entity, entity_id, field, idempotency_key, "status update replayed");
        }
        Ok(())
    }
}
