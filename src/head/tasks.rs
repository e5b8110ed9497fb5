//! Supervised continuations that outlive the HTTP request which started them.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::Result;

/// Finished records kept for `/status`
const MAX_FINISHED_RECORDS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Start,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: Uuid,
    pub kind: TaskKind,
    pub label: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Default)]
pub struct BackgroundTasks {
    records: Arc<DashMap<Uuid, TaskRecord>>,
    handles: Arc<DashMap<Uuid, JoinHandle<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` detached and track its outcome
    pub fn spawn<F>(&self, kind: TaskKind, label: impl Into<String>, work: F) -> Uuid
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.prune_finished();

        let id = Uuid::new_v4();
        let label = label.into();
        self.records.insert(
            id,
            TaskRecord {
                id,
                kind,
                label: label.clone(),
                status: TaskStatus::Running,
                error: None,
                started_at: Utc::now(),
                finished_at: None,
            },
        );
        info!(task = %id, ?kind, %label, "Background task started");

        let records = self.records.clone();
        let handle = tokio::spawn(async move {
            let outcome = work.await;
            if let Some(mut record) = records.get_mut(&id) {
                record.finished_at = Some(Utc::now());
                match outcome {
                    Ok(()) => {
                        record.status = TaskStatus::Succeeded;
                        info!(task = %id, ?kind, label = %record.label, "Background task succeeded");
                    }
                    Err(e) => {
                        record.status = TaskStatus::Failed;
                        record.error = Some(e.to_string());
                        error!(task = %id, ?kind, label = %record.label, error = %e, "Background task failed");
                    }
                }
            }
        });
        self.handles.insert(id, handle);
        id
    }

    pub fn get(&self, id: Uuid) -> Option<TaskRecord> {
        self.records.get(&id).map(|r| r.clone())
    }

    /// All known tasks, oldest first
    pub fn snapshots(&self) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> = self.records.iter().map(|r| r.clone()).collect();
        records.sort_by_key(|r| r.started_at);
        records
    }

    pub fn is_running(&self, kind: TaskKind) -> bool {
        self.records
            .iter()
            .any(|r| r.kind == kind && r.status == TaskStatus::Running)
    }

    /// Wait for a task to end and return its final record
    pub async fn join(&self, id: Uuid) -> Option<TaskRecord> {
        if let Some((_, handle)) = self.handles.remove(&id) {
            let _ = handle.await;
        }
        self.get(id)
    }

    /// Abort every running task
    pub fn abort_all(&self) {
        for entry in self.handles.iter() {
            entry.value().abort();
        }
        self.handles.clear();
    }

    fn prune_finished(&self) {
        let mut finished: Vec<(DateTime<Utc>, Uuid)> = self
            .records
            .iter()
            .filter(|r| r.status != TaskStatus::Running)
            .map(|r| (r.started_at, r.id))
            .collect();
        if finished.len() < MAX_FINISHED_RECORDS {
            return;
        }
        finished.sort();
        let excess = finished.len() + 1 - MAX_FINISHED_RECORDS;
        for (_, id) in finished.into_iter().take(excess) {
            self.records.remove(&id);
            self.handles.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EscrowError;
    use std::time::Duration;

    #[tokio::test]
    async fn test_success_recorded() {
        let tasks = BackgroundTasks::new();
        let id = tasks.spawn(TaskKind::Start, "open head", async { Ok(()) });

        let record = tasks.join(id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Succeeded);
        assert!(record.finished_at.is_some());
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_failure_recorded_with_reason() {
        let tasks = BackgroundTasks::new();
        let id = tasks.spawn(TaskKind::Close, "close head", async {
            Err(EscrowError::CloseNotAchieved { attempts: 5 })
        });

        let record = tasks.join(id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.error.unwrap().contains("5 close attempts"));
    }

    #[tokio::test]
    async fn test_is_running_by_kind() {
        let tasks = BackgroundTasks::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let id = tasks.spawn(TaskKind::Start, "open head", async move {
            let _ = rx.await;
            Ok(())
        });

        assert!(tasks.is_running(TaskKind::Start));
        assert!(!tasks.is_running(TaskKind::Close));

        tx.send(()).unwrap();
        tasks.join(id).await;
        assert!(!tasks.is_running(TaskKind::Start));
    }

    #[tokio::test]
    async fn test_snapshot_serializes_camel_case() {
        let tasks = BackgroundTasks::new();
        let id = tasks.spawn(TaskKind::Close, "close head", async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(())
        });
        tasks.join(id).await;

        let json = serde_json::to_value(tasks.snapshots()).unwrap();
        assert_eq!(json[0]["kind"], "close");
        assert_eq!(json[0]["status"], "succeeded");
        assert!(json[0].get("startedAt").is_some());
        assert!(json[0].get("finishedAt").is_some());
    }

    #[tokio::test]
    async fn test_finished_records_are_bounded() {
        let tasks = BackgroundTasks::new();
        for i in 0..(MAX_FINISHED_RECORDS + 5) {
            let id = tasks.spawn(TaskKind::Start, format!("run {i}"), async { Ok(()) });
            tasks.join(id).await;
        }
        assert!(tasks.snapshots().len() <= MAX_FINISHED_RECORDS);
    }
}
