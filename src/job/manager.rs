//! Owner of all streaming jobs, one per client.
//!
//! The job map sits behind a single async mutex so start, update and stop
//! are serialized against each other. Failures building or tearing down one
//! client's job are logged and never propagate to the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::state::StreamingJobState;
use super::{JobContext, JobFactory, StreamingJob};
use crate::client::ClientConfig;

/// How long a stopped job gets to finish before its task is aborted.
const STOP_GRACE: Duration = Duration::from_secs(2);

struct JobEntry {
    job: Arc<StreamingJob>,
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

pub struct StreamingJobManager {
    factory: Arc<dyn JobFactory>,
    context: JobContext,
    jobs: Mutex<HashMap<Uuid, JobEntry>>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl StreamingJobManager {
    pub fn new(factory: Arc<dyn JobFactory>, context: JobContext) -> Self {
        Self {
            factory,
            context,
            jobs: Mutex::new(HashMap::new()),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn context(&self) -> &JobContext {
        &self.context
    }

    /// Start streaming to a client, restarting any job it already has.
    pub async fn start_job(&self, client: &ClientConfig) {
        let mut jobs = self.jobs.lock().await;
        if let Some(existing) = jobs.remove(&client.uuid) {
            debug!(client = %client.uuid, "restarting job");
            stop_entry(client.uuid, existing).await;
        }
        if self.shutdown.is_cancelled() {
            warn!(client = %client.uuid, "manager shut down, job not started");
            return;
        }

        let job = match self.factory.create(client, &self.context) {
            Ok(job) => job,
            Err(e) => {
                error!(client = %client.uuid, name = %client.name, error = %e, "failed to create job");
                return;
            }
        };
        let cancel = self.shutdown.child_token();
        let task = self.tracker.spawn(Arc::clone(&job).run(cancel.clone()));
        info!(client = %client.uuid, name = %client.name, kind = %client.kind, "job started");
        jobs.insert(client.uuid, JobEntry { job, task, cancel });
    }

    /// Push changed client settings to a running job without reconnecting.
    pub async fn update_job(&self, client: &ClientConfig) {
        let jobs = self.jobs.lock().await;
        match jobs.get(&client.uuid) {
            Some(entry) => entry.job.on_client_updated(client.clone()),
            None => debug!(client = %client.uuid, "no job to update"),
        }
    }

    /// Stop a client's job. No-op if it has none.
    pub async fn stop_job(&self, client: Uuid) {
        let mut jobs = self.jobs.lock().await;
        match jobs.remove(&client) {
            Some(entry) => {
                stop_entry(client, entry).await;
                info!(client = %client, "job stopped");
            }
            None => debug!(client = %client, "no job to stop"),
        }
    }

    pub async fn stop_all(&self) {
        let mut jobs = self.jobs.lock().await;
        let count = jobs.len();
        let stops = jobs.drain().map(|(client, entry)| stop_entry(client, entry));
        join_all(stops).await;
        info!(count, "all jobs stopped");
    }

    /// Stop everything and wait for all job tasks to finish.
    pub async fn shutdown(&self) {
        self.stop_all().await;
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    pub async fn job_state(&self, client: Uuid) -> Option<StreamingJobState> {
        self.jobs.lock().await.get(&client).map(|e| e.job.state())
    }

    pub async fn subscribe(&self, client: Uuid) -> Option<watch::Receiver<StreamingJobState>> {
        self.jobs.lock().await.get(&client).map(|e| e.job.subscribe())
    }

    pub async fn job(&self, client: Uuid) -> Option<Arc<StreamingJob>> {
        self.jobs.lock().await.get(&client).map(|e| Arc::clone(&e.job))
    }

    pub async fn running_jobs(&self) -> Vec<Uuid> {
        self.jobs.lock().await.keys().copied().collect()
    }
}

/// Dispose first so nothing more is sent, then cancel and join the task.
async fn stop_entry(client: Uuid, entry: JobEntry) {
    entry.job.dispose().await;
    entry.cancel.cancel();

    let mut task = entry.task;
    match tokio::time::timeout(STOP_GRACE, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.is_cancelled() => {}
        Ok(Err(e)) => error!(client = %client, error = %e, "job task failed"),
        Err(_) => {
            warn!(client = %client, "job did not stop in time, aborting");
            task.abort();
        }
    }
}
