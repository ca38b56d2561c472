use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::SemesterQuery;
use crate::services::grading::{self, SemesterAverageService};

pub const DEFAULT_MAX_CONCURRENT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 1,
    #[default]
    Normal = 2,
    High = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculationKind {
    Averages,
    Ects,
    All,
    Advanced,
}

impl CalculationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationKind::Averages => "averages",
            CalculationKind::Ects => "ects",
            CalculationKind::All => "all",
            CalculationKind::Advanced => "advanced",
        }
    }
}

impl fmt::Display for CalculationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalculationKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "averages" => Ok(CalculationKind::Averages),
            "ects" => Ok(CalculationKind::Ects),
            "all" => Ok(CalculationKind::All),
            "advanced" => Ok(CalculationKind::Advanced),
            other => Err(AppError::BadRequest(format!("Unknown calculation type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationOptions {
    pub kind: CalculationKind,
    pub query: SemesterQuery,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculationStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationResult {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: CalculationKind,
    pub status: CalculationStatus,
    pub progress: u8,
    pub message: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub details: serde_json::Value,
}

/// What a runner hands back for a successful operation.
#[derive(Debug, Clone)]
pub struct CalculationOutput {
    pub message: String,
    pub details: serde_json::Value,
}

#[async_trait]
pub trait CalculationRunner: Send + Sync {
    async fn run(&self, options: &CalculationOptions) -> Result<CalculationOutput, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub running: usize,
    pub total: usize,
}

type Responder = oneshot::Sender<Result<CalculationResult, AppError>>;

struct QueuedCalculation {
    id: Uuid,
    options: CalculationOptions,
    enqueued_at: DateTime<Utc>,
    responder: Responder,
}

struct RunningCalculation {
    responder: Responder,
    abort: AbortHandle,
}

#[derive(Default)]
struct QueueState {
    pending: Vec<QueuedCalculation>,
    running: HashMap<Uuid, RunningCalculation>,
}

/// Waits for one submitted calculation.
pub struct CalculationHandle {
    pub id: Uuid,
    rx: oneshot::Receiver<Result<CalculationResult, AppError>>,
}

impl CalculationHandle {
    pub async fn outcome(self) -> Result<CalculationResult, AppError> {
        self.rx.await.map_err(|_| AppError::InternalServerError)?
    }
}

/// Priority-ordered task runner with a fixed ceiling on concurrently running items.
#[derive(Clone)]
pub struct CalculationQueue {
    state: Arc<Mutex<QueueState>>,
    runner: Arc<dyn CalculationRunner>,
    max_concurrent: usize,
}

impl CalculationQueue {
    pub fn new(max_concurrent: usize, runner: Arc<dyn CalculationRunner>) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            runner,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Enqueues and starts work if a slot is free. Must be called inside a tokio runtime.
    pub async fn submit(&self, options: CalculationOptions) -> CalculationHandle {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();

        let mut state = self.state.lock().await;
        let priority = options.priority;
        let item = QueuedCalculation {
            id,
            options,
            enqueued_at: Utc::now(),
            responder: tx,
        };

        // Before the first item of strictly lower priority; ties keep submission order.
        let position = state
            .pending
            .iter()
            .position(|queued| queued.options.priority < priority)
            .unwrap_or(state.pending.len());
        state.pending.insert(position, item);
        debug!("Queued calculation {} ({:?}) at position {}", id, priority, position);

        self.drain(&mut state);
        CalculationHandle { id, rx }
    }

    pub async fn add(&self, options: CalculationOptions) -> Result<CalculationResult, AppError> {
        self.submit(options).await.outcome().await
    }

    pub async fn status(&self) -> QueueStatus {
        let state = self.state.lock().await;
        QueueStatus {
            pending: state.pending.len(),
            running: state.running.len(),
            total: state.pending.len() + state.running.len(),
        }
    }

    /// Ids of waiting items in dequeue order.
    pub async fn pending_ids(&self) -> Vec<Uuid> {
        let state = self.state.lock().await;
        state.pending.iter().map(|queued| queued.id).collect()
    }

    /// Rejects every pending and running item with `QueueCleared`. Returns how many were rejected.
    pub async fn clear(&self) -> usize {
        let mut state = self.state.lock().await;
        let mut rejected = 0;

        for queued in state.pending.drain(..) {
            let _ = queued.responder.send(Err(AppError::QueueCleared));
            rejected += 1;
        }
        for (_, running) in state.running.drain() {
            running.abort.abort();
            let _ = running.responder.send(Err(AppError::QueueCleared));
            rejected += 1;
        }

        if rejected > 0 {
            warn!("Calculation queue cleared, {} items rejected", rejected);
        }
        rejected
    }

    fn drain(&self, state: &mut QueueState) {
        while state.running.len() < self.max_concurrent && !state.pending.is_empty() {
            let queued = state.pending.remove(0);
            let id = queued.id;
            let queue = self.clone();
            let options = queued.options;
            let waited = Utc::now() - queued.enqueued_at;

            info!(
                "Starting calculation {} ({}) after {}ms in queue",
                id,
                options.kind,
                waited.num_milliseconds()
            );

            let handle = tokio::spawn(async move {
                let start_time = Utc::now();
                let outcome = queue.runner.run(&options).await;
                queue.finish(id, options.kind, start_time, outcome).await;
            });

            state.running.insert(
                id,
                RunningCalculation {
                    responder: queued.responder,
                    abort: handle.abort_handle(),
                },
            );
        }
    }

    async fn finish(
        &self,
        id: Uuid,
        kind: CalculationKind,
        start_time: DateTime<Utc>,
        outcome: Result<CalculationOutput, AppError>,
    ) {
        let mut state = self.state.lock().await;
        let Some(running) = state.running.remove(&id) else {
            // already rejected by clear()
            return;
        };

        let end_time = Utc::now();
        let (status, message, details) = match outcome {
            Ok(output) => (CalculationStatus::Success, output.message, output.details),
            Err(e) => {
                warn!("Calculation {} ({}) failed: {}", id, kind, e);
                (CalculationStatus::Error, e.to_string(), serde_json::Value::Null)
            }
        };

        let result = CalculationResult {
            id,
            kind,
            status,
            progress: 100,
            message,
            start_time,
            end_time,
            duration_ms: (end_time - start_time).num_milliseconds(),
            details,
        };
        let _ = running.responder.send(Ok(result));

        self.drain(&mut state);
    }
}

/// Runs the grading operations against the semester average service.
pub struct GradingRunner {
    service: SemesterAverageService,
}

impl GradingRunner {
    pub fn new(service: SemesterAverageService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl CalculationRunner for GradingRunner {
    async fn run(&self, options: &CalculationOptions) -> Result<CalculationOutput, AppError> {
        let data = self.service.calculate(&options.query).await?;

        let output = match options.kind {
            CalculationKind::Averages => CalculationOutput {
                message: format!("Averages computed for {} students", data.len()),
                details: serde_json::json!({ "students": data }),
            },
            CalculationKind::Ects => {
                let ects: Vec<_> = data.iter().map(grading::ects_summary).collect();
                CalculationOutput {
                    message: format!("ECTS computed for {} students", ects.len()),
                    details: serde_json::json!({ "ects": ects }),
                }
            }
            CalculationKind::All => {
                let ects: Vec<_> = data.iter().map(grading::ects_summary).collect();
                CalculationOutput {
                    message: format!("Averages and ECTS computed for {} students", data.len()),
                    details: serde_json::json!({ "students": data, "ects": ects }),
                }
            }
            CalculationKind::Advanced => {
                let ects: Vec<_> = data.iter().map(grading::ects_summary).collect();
                let statistics = grading::class_statistics(&data);
                CalculationOutput {
                    message: format!("Advanced calculation completed for {} students", data.len()),
                    details: serde_json::json!({
                        "students": data,
                        "ects": ects,
                        "statistics": statistics,
                    }),
                }
            }
        };
        Ok(output)
    }
}
