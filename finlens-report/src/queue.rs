//! Background analysis jobs.
//!
//! Jobs go through a bounded channel to a fixed pool of worker tasks. Each
//! worker runs the full report pipeline for one uploaded document, saves the
//! compiled report and records the outcome under the job's task id. Callers
//! poll [`AnalysisQueue::status`] the way they would poll a job endpoint.

use crate::pipeline::{PipelineInput, ReportPipeline};
use crate::store::{NewReport, ReportStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Query used when the caller supplies none.
pub const DEFAULT_QUERY: &str = "Analyze this financial document for investment insights";

/// One document to analyze.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisJob {
    pub query: String,
    /// Where the worker reads the document from
    pub file_path: PathBuf,
    /// Name the report is saved under
    pub file_name: String,
}

impl AnalysisJob {
    pub fn new(query: &str, file_path: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            query: normalize_query(query),
            file_path: file_path.into(),
            file_name: file_name.into(),
        }
    }
}

/// Trimmed query, or [`DEFAULT_QUERY`] when blank.
pub fn normalize_query(query: &str) -> String {
    let query = query.trim();
    if query.is_empty() {
        DEFAULT_QUERY.to_string()
    } else {
        query.to_string()
    }
}

/// Observable state of a submitted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed { report_id: String, report: Value },
    Failed { error: String },
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("analysis queue is shut down")]
    Closed,

    #[error("task {0} did not finish within {1:?}")]
    Timeout(Uuid, Duration),

    #[error("unknown task id: {0}")]
    UnknownTask(Uuid),

    #[error("failed to stage upload in {dir}: {source}")]
    Upload {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub workers: usize,
    /// Delete the uploaded file once its job finishes
    pub cleanup_uploads: bool,
    /// Jobs that may wait in the channel before `submit` blocks
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            cleanup_uploads: true,
            capacity: 64,
        }
    }
}

/// Copy an upload into `upload_dir` under a fresh name.
///
/// Returns the staged path, `financial_document_<uuid>.pdf`.
pub async fn stage_upload(upload_dir: &Path, contents: &[u8]) -> Result<PathBuf, QueueError> {
    let upload_error = |source| QueueError::Upload {
        dir: upload_dir.to_path_buf(),
        source,
    };

    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(upload_error)?;
    let path = upload_dir.join(format!("financial_document_{}.pdf", Uuid::new_v4()));
    tokio::fs::write(&path, contents)
        .await
        .map_err(upload_error)?;

    debug!("Staged {} bytes at {}", contents.len(), path.display());
    Ok(path)
}

type StatusMap = Arc<RwLock<HashMap<Uuid, TaskStatus>>>;

struct QueuedJob {
    id: Uuid,
    job: AnalysisJob,
}

/// Runs analysis jobs on a pool of tokio tasks.
pub struct AnalysisQueue {
    sender: Mutex<Option<mpsc::Sender<QueuedJob>>>,
    statuses: StatusMap,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for AnalysisQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisQueue").finish_non_exhaustive()
    }
}

impl AnalysisQueue {
    /// Spawn the workers. Must be called inside a tokio runtime.
    pub fn start(
        pipeline: Arc<ReportPipeline>,
        store: Arc<dyn ReportStore>,
        config: QueueConfig,
    ) -> Self {
        let workers = config.workers.max(1);
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let statuses: StatusMap = Arc::new(RwLock::new(HashMap::new()));

        let handles = (0..workers)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    pipeline: Arc::clone(&pipeline),
                    store: Arc::clone(&store),
                    statuses: Arc::clone(&statuses),
                    cleanup_uploads: config.cleanup_uploads,
                };
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move { worker.run(receiver).await })
            })
            .collect();

        info!("Started {} analysis workers", workers);

        Self {
            sender: Mutex::new(Some(sender)),
            statuses,
            workers: Mutex::new(handles),
        }
    }

    /// Queue a job and return its task id.
    pub async fn submit(&self, job: AnalysisJob) -> Result<Uuid, QueueError> {
        let sender = self.sender.lock().await.clone().ok_or(QueueError::Closed)?;
        let id = Uuid::new_v4();
        let job = AnalysisJob {
            query: normalize_query(&job.query),
            ..job
        };

        self.statuses.write().await.insert(id, TaskStatus::Queued);
        debug!("Queued task {} for {}", id, job.file_path.display());

        if sender.send(QueuedJob { id, job }).await.is_err() {
            self.statuses.write().await.remove(&id);
            return Err(QueueError::Closed);
        }
        Ok(id)
    }

    pub async fn status(&self, id: Uuid) -> Option<TaskStatus> {
        self.statuses.read().await.get(&id).cloned()
    }

    /// Drop the status of a finished task and return it.
    ///
    /// Queued and running tasks are left alone and yield `None`, as do
    /// unknown ids.
    pub async fn forget(&self, id: Uuid) -> Option<TaskStatus> {
        let mut statuses = self.statuses.write().await;
        if statuses.get(&id).is_some_and(TaskStatus::is_terminal) {
            statuses.remove(&id)
        } else {
            None
        }
    }

    /// Number of task statuses currently held.
    pub async fn tracked_tasks(&self) -> usize {
        self.statuses.read().await.len()
    }

    /// Poll until the task reaches a terminal status.
    pub async fn wait_for(
        &self,
        id: Uuid,
        poll: Duration,
        timeout: Duration,
    ) -> Result<TaskStatus, QueueError> {
        let polling = async {
            loop {
                match self.status(id).await {
                    None => return Err(QueueError::UnknownTask(id)),
                    Some(status) if status.is_terminal() => return Ok(status),
                    Some(_) => tokio::time::sleep(poll).await,
                }
            }
        };

        tokio::time::timeout(timeout, polling)
            .await
            .map_err(|_| QueueError::Timeout(id, timeout))?
    }

    /// Stop accepting jobs, finish queued ones, and wait for the workers.
    pub async fn shutdown(&self) {
        debug!("Shutting down analysis queue");
        self.sender.lock().await.take();

        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Analysis worker panicked: {}", e);
            }
        }
        debug!("Analysis queue shutdown complete");
    }
}

struct Worker {
    id: usize,
    pipeline: Arc<ReportPipeline>,
    store: Arc<dyn ReportStore>,
    statuses: StatusMap,
    cleanup_uploads: bool,
}

impl Worker {
    async fn run(self, receiver: Arc<Mutex<mpsc::Receiver<QueuedJob>>>) {
        loop {
            // Hold the lock only while waiting for the next job
            let next = receiver.lock().await.recv().await;
            let Some(QueuedJob { id, job }) = next else {
                debug!("Worker {} stopping: channel closed", self.id);
                break;
            };

            self.set_status(id, TaskStatus::Processing).await;
            info!("Worker {} processing task {} ({})", self.id, id, job.file_name);

            let status = self.process(&job).await;
            match &status {
                TaskStatus::Completed { report_id, .. } => {
                    info!("Task {} completed, report {}", id, report_id)
                }
                TaskStatus::Failed { error } => warn!("Task {} failed: {}", id, error),
                _ => {}
            }
            self.set_status(id, status).await;

            if self.cleanup_uploads {
                remove_upload(&job.file_path).await;
            }
        }
    }

    async fn process(&self, job: &AnalysisJob) -> TaskStatus {
        let input = PipelineInput {
            path: job.file_path.to_string_lossy().into_owned(),
            query: job.query.clone(),
        };

        let run = match self.pipeline.run(&input).await {
            Ok(run) => run,
            Err(failure) => {
                return TaskStatus::Failed {
                    error: failure.to_string(),
                };
            }
        };

        let report = NewReport {
            file_name: job.file_name.clone(),
            query: job.query.clone(),
            report: run.report_json.clone(),
        };
        match self.store.save_report(report).await {
            Ok(report_id) => TaskStatus::Completed {
                report_id,
                report: run.report_json,
            },
            Err(e) => TaskStatus::Failed {
                error: format!("failed to save report: {e:#}"),
            },
        }
    }

    async fn set_status(&self, id: Uuid, status: TaskStatus) {
        self.statuses.write().await.insert(id, status);
    }
}

async fn remove_upload(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed upload {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove upload {}: {}", path.display(), e),
    }
}
