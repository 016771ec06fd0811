use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Semaphore};
use uuid::Uuid;

use crate::models::{QuizChange, UnchangedQuiz};

/// Finished jobs stay queryable this long.
const RESULT_TTL_MINUTES: i64 = 60;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Started,
    Processing,
    Complete,
    Failed,
}

/// Progress record a poller sees for a job.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JobMeta {
    pub percent: u8,
    pub status: JobStatus,
    pub status_msg: String,
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_list: Option<Vec<QuizChange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unchanged_list: Option<Vec<UnchangedQuiz>>,
}

/// Where a running job publishes its progress. Each call replaces the previous record.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, meta: &JobMeta);
}

/// Tracks the current record of one run and pushes every change to the sink.
pub struct Progress<'a> {
    sink: &'a dyn ProgressSink,
    meta: JobMeta,
}

impl<'a> Progress<'a> {
    pub fn start(sink: &'a dyn ProgressSink) -> Self {
        let meta = JobMeta {
            percent: 0,
            status: JobStatus::Started,
            status_msg: "Starting...".to_string(),
            error: false,
            quiz_list: None,
            unchanged_list: None,
        };
        sink.publish(&meta);
        Self { sink, meta }
    }

    pub fn processing(&mut self, percent: u8, status_msg: impl Into<String>) {
        self.meta.percent = percent.min(100);
        self.meta.status = JobStatus::Processing;
        self.meta.status_msg = status_msg.into();
        self.meta.error = false;
        self.sink.publish(&self.meta);
    }

    pub fn set_lists(&mut self, quiz_list: Vec<QuizChange>, unchanged_list: Vec<UnchangedQuiz>) {
        self.meta.quiz_list = Some(quiz_list);
        self.meta.unchanged_list = Some(unchanged_list);
    }

    pub fn complete(mut self, status_msg: impl Into<String>) -> JobMeta {
        self.meta.percent = 100;
        self.meta.status = JobStatus::Complete;
        self.meta.status_msg = status_msg.into();
        self.meta.error = false;
        self.sink.publish(&self.meta);
        self.meta
    }

    /// Terminal failure; the percentage stays where the run stopped.
    pub fn fail(mut self, status_msg: impl Into<String>) -> JobMeta {
        self.meta.status = JobStatus::Failed;
        self.meta.status_msg = status_msg.into();
        self.meta.error = true;
        self.sink.publish(&self.meta);
        self.meta
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Finished,
    /// The job's task panicked before returning a result.
    Crashed,
}

#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub state: JobState,
    pub meta: Option<JobMeta>,
}

struct JobEntry {
    state: JobState,
    meta: Option<JobMeta>,
    done: watch::Receiver<bool>,
    finished_at: Option<DateTime<Utc>>,
}

/// In-process job runner. Jobs run on their own tokio tasks, a bounded number at a time.
pub struct JobQueue {
    jobs: Mutex<HashMap<Uuid, JobEntry>>,
    permits: Arc<Semaphore>,
}

impl JobQueue {
    pub fn new(concurrency: usize) -> Arc<Self> {
        Arc::new(Self {
            jobs: Mutex::new(HashMap::new()),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, JobEntry>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedules `job`. With `depends_on`, the job starts only once that job
    /// has finished or crashed.
    pub fn enqueue<F, Fut>(self: &Arc<Self>, name: &'static str, depends_on: Option<Uuid>, job: F) -> Uuid
    where
        F: FnOnce(JobReporter) -> Fut + Send + 'static,
        Fut: Future<Output = JobMeta> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let (done_tx, done_rx) = watch::channel(false);

        let dependency = {
            let mut jobs = self.lock();
            prune(&mut jobs);
            let dependency = depends_on.and_then(|dep| jobs.get(&dep).map(|e| e.done.clone()));
            jobs.insert(
                id,
                JobEntry {
                    state: JobState::Queued,
                    meta: None,
                    done: done_rx,
                    finished_at: None,
                },
            );
            dependency
        };
        tracing::info!(job = %id, name, ?depends_on, "job enqueued");

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(mut dep) = dependency {
                let _ = dep.wait_for(|done| *done).await;
            }
            let _permit = Arc::clone(&queue.permits).acquire_owned().await;
            queue.set_state(id, JobState::Running);

            let reporter = JobReporter { queue: Arc::clone(&queue), id };
            match tokio::spawn(job(reporter)).await {
                Ok(meta) => {
                    tracing::info!(job = %id, name, status = ?meta.status, "job finished");
                    queue.finish(id, JobState::Finished, Some(meta));
                }
                Err(e) => {
                    tracing::error!(job = %id, name, error=%e, "job crashed");
                    queue.finish(id, JobState::Crashed, None);
                }
            }
            let _ = done_tx.send(true);
        });

        id
    }

    fn set_state(&self, id: Uuid, state: JobState) {
        if let Some(entry) = self.lock().get_mut(&id) {
            entry.state = state;
        }
    }

    fn finish(&self, id: Uuid, state: JobState, result: Option<JobMeta>) {
        if let Some(entry) = self.lock().get_mut(&id) {
            entry.state = state;
            entry.finished_at = Some(Utc::now());
            if result.is_some() {
                entry.meta = result;
            }
        }
    }

    pub fn snapshot(&self, id: Uuid) -> Option<JobSnapshot> {
        self.lock().get(&id).map(|e| JobSnapshot {
            state: e.state,
            meta: e.meta.clone(),
        })
    }

    /// Jobs that are queued or running.
    pub fn pending(&self) -> usize {
        self.lock()
            .values()
            .filter(|e| matches!(e.state, JobState::Queued | JobState::Running))
            .count()
    }

    /// Resolves once the job has finished or crashed. Unknown ids resolve immediately.
    pub async fn wait(&self, id: Uuid) -> Option<JobSnapshot> {
        let done = self.lock().get(&id).map(|e| e.done.clone());
        if let Some(mut done) = done {
            let _ = done.wait_for(|done| *done).await;
        }
        self.snapshot(id)
    }
}

fn prune(jobs: &mut HashMap<Uuid, JobEntry>) {
    let cutoff = Utc::now() - Duration::minutes(RESULT_TTL_MINUTES);
    jobs.retain(|_, e| e.finished_at.map_or(true, |at| at > cutoff));
}

/// Progress sink bound to one queued job.
pub struct JobReporter {
    queue: Arc<JobQueue>,
    id: Uuid,
}

impl ProgressSink for JobReporter {
    fn publish(&self, meta: &JobMeta) {
        if let Some(entry) = self.queue.lock().get_mut(&self.id) {
            entry.meta = Some(meta.clone());
        }
    }
}
