//! Submit-once job client with incremental, out-of-order result merging.
//!
//! A single spawned task owns the job: it submits, polls, merges results by
//! variation id and enforces the wall-clock deadline. Everyone else observes
//! [`JobSnapshot`]s through a watch channel.

use super::outcome::{completion_percent, JobOutcome};
use super::service::{GenerationService, JobTicket, ServiceError};
use super::types::{AuthToken, JobRequest, JobStatus, JobUpdate, VariationResult};
use crate::capture::JobConfig;
use crate::metrics::PipelineMetrics;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Observable state of one job.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub job_id: Option<String>,
    pub results: BTreeMap<u32, VariationResult>,
    pub total: u32,
    pub error: Option<String>,
    pub submitted_at: Option<Instant>,
}

impl JobSnapshot {
    fn new(total: u32) -> Self {
        Self {
            status: JobStatus::Pending,
            job_id: None,
            results: BTreeMap::new(),
            total,
            error: None,
            submitted_at: None,
        }
    }

    pub fn completed_count(&self) -> usize {
        self.results.len()
    }

    pub fn outcome(&self) -> JobOutcome {
        JobOutcome::classify(
            self.status,
            self.completed_count(),
            self.total as usize,
            self.error.as_deref(),
        )
    }

    pub fn percent(&self) -> f64 {
        completion_percent(self.completed_count(), self.total as usize)
    }

    /// Ids still expected, in order.
    pub fn pending_ids(&self) -> Vec<u32> {
        (1..=self.total)
            .filter(|id| !self.results.contains_key(id))
            .collect()
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.submitted_at.map(|t| t.elapsed())
    }

    /// Merges one service update. Returns how many ids were new.
    fn merge(&mut self, update: JobUpdate) -> usize {
        let before = self.results.len();
        for result in update.results {
            if result.variation_id == 0 || result.variation_id > self.total {
                warn!(
                    variation_id = result.variation_id,
                    total = self.total,
                    "Ignoring out-of-range variation"
                );
                continue;
            }
            // Last write wins per id.
            self.results.insert(result.variation_id, result);
        }
        if update.error.is_some() {
            self.error = update.error;
        }

        self.status = if self.results.len() >= self.total as usize {
            JobStatus::Completed
        } else {
            match update.status {
                Some(status) if status.is_terminal() => status,
                _ => JobStatus::Processing,
            }
        };
        self.results.len() - before
    }
}

/// Client for one generation job. A second `submit` is a no-op.
pub struct VariationJobClient {
    service: Arc<dyn GenerationService>,
    config: JobConfig,
    submitted: AtomicBool,
    state_tx: watch::Sender<JobSnapshot>,
    task: Mutex<Option<JoinHandle<()>>>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl VariationJobClient {
    pub fn new(service: Arc<dyn GenerationService>, config: JobConfig) -> Self {
        let (state_tx, _) = watch::channel(JobSnapshot::new(config.total_variations));
        Self {
            service,
            config,
            submitted: AtomicBool::new(false),
            state_tx,
            task: Mutex::new(None),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.state_tx.subscribe()
    }

    pub fn status(&self) -> JobStatus {
        self.state_tx.borrow().status
    }

    pub fn completed_count(&self) -> usize {
        self.state_tx.borrow().completed_count()
    }

    pub fn total_variations(&self) -> u32 {
        self.config.total_variations
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Starts the job. Returns `false` if this client already submitted.
    pub fn submit(
        &self,
        image: Vec<u8>,
        mime_type: &str,
        photo_type: &str,
        include_shoulders: bool,
        token: AuthToken,
    ) -> bool {
        if self.submitted.swap(true, Ordering::SeqCst) {
            debug!("Job already submitted, ignoring");
            return false;
        }

        let request = JobRequest {
            image,
            mime_type: mime_type.to_string(),
            photo_type: photo_type.to_string(),
            include_shoulders,
            token,
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("No async runtime, job cannot start");
                self.state_tx.send_modify(|s| {
                    s.status = JobStatus::Failed;
                    s.error = Some("No async runtime available".to_string());
                });
                return true;
            }
        };

        self.state_tx
            .send_modify(|s| s.submitted_at = Some(Instant::now()));
        if let Some(m) = &self.metrics {
            m.record_job_submitted();
        }
        info!(
            photo_type = %request.photo_type,
            total = self.config.total_variations,
            timeout_secs = self.config.timeout_secs,
            "Generation job submitted"
        );

        let worker = JobWorker {
            service: Arc::clone(&self.service),
            tx: self.state_tx.clone(),
            poll_interval: self.config.poll_interval(),
            metrics: self.metrics.clone(),
        };
        let timeout = self.config.timeout();
        let handle = runtime.spawn(async move { worker.run(request, timeout).await });
        *self.task.lock() = Some(handle);
        true
    }

    /// Waits for a terminal status and returns the final snapshot. Before
    /// [`submit`](Self::submit) there is nothing to wait for and the current
    /// snapshot comes back at once.
    pub async fn wait(&self) -> JobSnapshot {
        if !self.is_submitted() {
            return self.snapshot();
        }
        let mut rx = self.subscribe();
        let snapshot = match rx.wait_for(|s| s.status.is_terminal()).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        };
        snapshot
    }

    /// Stops applying updates. Results received so far are kept.
    pub fn cancel(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            self.state_tx.send_if_modified(|s| {
                if s.status.is_terminal() {
                    return false;
                }
                s.status = JobStatus::Failed;
                s.error = Some("Job cancelled".to_string());
                true
            });
            info!("Generation job cancelled");
        }
    }
}

impl Drop for VariationJobClient {
    fn drop(&mut self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }
}

/// The single writer of a job's snapshot.
struct JobWorker {
    service: Arc<dyn GenerationService>,
    tx: watch::Sender<JobSnapshot>,
    poll_interval: Duration,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl JobWorker {
    async fn run(self, request: JobRequest, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        if tokio::time::timeout_at(deadline, self.drive(&request))
            .await
            .is_err()
        {
            self.tx.send_modify(|s| {
                if !s.status.is_terminal() {
                    s.status = JobStatus::Timeout;
                    s.error = Some(format!(
                        "Timed out after {}s with {} of {} variations",
                        timeout.as_secs(),
                        s.results.len(),
                        s.total
                    ));
                }
            });
        }

        let snapshot = self.tx.borrow().clone();
        let outcome = snapshot.outcome();
        match &outcome {
            JobOutcome::Completed => info!(
                completed = snapshot.completed_count(),
                "Generation job completed"
            ),
            JobOutcome::PartialSuccess { warning } => warn!(
                status = %snapshot.status,
                completed = snapshot.completed_count(),
                total = snapshot.total,
                "Generation job ended with partial results: {warning}"
            ),
            JobOutcome::Fatal { message, .. } => warn!(
                status = %snapshot.status,
                "Generation job failed: {message}"
            ),
            JobOutcome::InProgress => {}
        }
        if let Some(m) = &self.metrics {
            m.record_job_outcome(&outcome);
        }
    }

    async fn drive(&self, request: &JobRequest) {
        let ticket = match self.service.submit(request).await {
            Ok(ticket) => ticket,
            Err(e) => return self.fail(e),
        };
        debug!(job_id = %ticket.job_id, "Job acknowledged");
        self.acknowledge(&ticket);

        loop {
            tokio::time::sleep(self.poll_interval).await;
            match self.service.poll(&ticket, &request.token).await {
                Ok(update) => {
                    if self.apply(update) {
                        return;
                    }
                }
                Err(e @ ServiceError::Unauthorized(_)) => return self.fail(e),
                Err(e) => warn!(job_id = %ticket.job_id, "Poll failed, retrying: {e}"),
            }
        }
    }

    fn acknowledge(&self, ticket: &JobTicket) {
        self.tx.send_modify(|s| {
            s.job_id = Some(ticket.job_id.clone());
            s.status = match ticket.status {
                JobStatus::Failed | JobStatus::Timeout => ticket.status,
                _ => JobStatus::Processing,
            };
        });
    }

    /// Applies an update; returns true once the job is terminal.
    fn apply(&self, update: JobUpdate) -> bool {
        let mut fresh = 0;
        let mut terminal = false;
        self.tx.send_modify(|s| {
            fresh = s.merge(update);
            terminal = s.status.is_terminal();
            if fresh > 0 {
                debug!(
                    received = s.completed_count(),
                    total = s.total,
                    "Variations received"
                );
            }
        });
        if fresh > 0 {
            if let Some(m) = &self.metrics {
                m.record_variations_received(fresh as u64);
            }
        }
        terminal
    }

    fn fail(&self, error: ServiceError) {
        warn!("Generation job failed: {error}");
        self.tx.send_modify(|s| {
            s.status = JobStatus::Failed;
            s.error = Some(error.to_string());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Plays back a fixed sequence of poll responses, then reports processing.
    #[derive(Default)]
    struct ScriptedService {
        submit_error: Option<u16>,
        polls: Mutex<VecDeque<JobUpdate>>,
        submits: AtomicUsize,
    }

    impl ScriptedService {
        fn with_polls(polls: Vec<JobUpdate>) -> Arc<Self> {
            Arc::new(Self {
                polls: Mutex::new(polls.into()),
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl GenerationService for ScriptedService {
        async fn submit(&self, _request: &JobRequest) -> Result<JobTicket, ServiceError> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            if let Some(code) = self.submit_error {
                return Err(ServiceError::Status {
                    status: code,
                    body: "rejected".to_string(),
                });
            }
            Ok(JobTicket {
                job_id: "job_1".to_string(),
                status: JobStatus::Pending,
            })
        }

        async fn poll(
            &self,
            _ticket: &JobTicket,
            _token: &AuthToken,
        ) -> Result<JobUpdate, ServiceError> {
            Ok(self.polls.lock().pop_front().unwrap_or(JobUpdate {
                status: Some(JobStatus::Processing),
                ..Default::default()
            }))
        }
    }

    fn variation(id: u32, marker: u8) -> VariationResult {
        VariationResult {
            variation_id: id,
            image: vec![marker],
            filename: format!("v{id}.png"),
            mime_type: "image/png".to_string(),
            photo_type: "4 x 6 Photo".to_string(),
            compliance: None,
        }
    }

    fn update(results: Vec<VariationResult>) -> JobUpdate {
        JobUpdate {
            status: Some(JobStatus::Processing),
            results,
            error: None,
        }
    }

    fn client(service: Arc<dyn GenerationService>) -> VariationJobClient {
        VariationJobClient::new(service, JobConfig::default())
    }

    fn submit(client: &VariationJobClient) -> bool {
        client.submit(
            vec![1, 2, 3],
            "image/jpeg",
            "4 x 6 Photo",
            true,
            AuthToken::new("token").unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_before_submit_returns_immediately() {
        let client = client(ScriptedService::with_polls(vec![]));

        let snapshot = tokio::time::timeout(Duration::from_secs(1), client.wait())
            .await
            .expect("wait should not block before submit");
        assert_eq!(snapshot.status, JobStatus::Pending);
        assert_eq!(snapshot.completed_count(), 0);
        assert!(!client.is_submitted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_results_complete_job() {
        let service = ScriptedService::with_polls(vec![
            update(vec![variation(3, 1)]),
            update(vec![variation(1, 1), variation(4, 1)]),
            update(vec![variation(3, 2), variation(2, 1)]),
        ]);
        let client = client(service);
        assert!(submit(&client));

        let done = client.wait().await;
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.completed_count(), 4);
        assert_eq!(done.outcome(), JobOutcome::Completed);
        // Duplicate id 3 overwrote instead of accumulating.
        assert_eq!(done.results[&3].image, vec![2]);
        assert_eq!(done.results.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert!(done.pending_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_with_partial_results() {
        let service = ScriptedService::with_polls(vec![
            update(vec![variation(2, 1)]),
            update(vec![variation(4, 1)]),
        ]);
        let client = client(service);
        submit(&client);

        let done = client.wait().await;
        assert_eq!(done.status, JobStatus::Timeout);
        assert_eq!(done.completed_count(), 2);
        assert_eq!(done.total, 4);
        assert!(matches!(done.outcome(), JobOutcome::PartialSuccess { .. }));
        assert!(!done.outcome().is_fatal());
        assert_eq!(done.pending_ids(), vec![1, 3]);
        assert!(done.elapsed().unwrap() >= Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_results_is_fatal() {
        let client = client(ScriptedService::with_polls(Vec::new()));
        submit(&client);

        let done = client.wait().await;
        assert_eq!(done.status, JobStatus::Timeout);
        assert_eq!(done.completed_count(), 0);
        assert!(matches!(
            done.outcome(),
            JobOutcome::Fatal { retry: true, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_is_once_only() {
        let service = ScriptedService::with_polls(Vec::new());
        let client = client(Arc::clone(&service) as Arc<dyn GenerationService>);
        assert!(submit(&client));
        assert!(!submit(&client));
        assert!(client.is_submitted());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(service.submits.load(Ordering::SeqCst), 1);
        assert_eq!(client.status(), JobStatus::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_submission_fails() {
        let service = Arc::new(ScriptedService {
            submit_error: Some(500),
            ..Default::default()
        });
        let client = client(service);
        submit(&client);

        let done = client.wait().await;
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done.error.unwrap().contains("500"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_failure_after_results_is_partial() {
        let service = ScriptedService::with_polls(vec![
            update(vec![variation(1, 1)]),
            JobUpdate {
                status: Some(JobStatus::Failed),
                results: Vec::new(),
                error: Some("generator crashed".to_string()),
            },
        ]);
        let client = client(service);
        submit(&client);

        let done = client.wait().await;
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(
            done.outcome(),
            JobOutcome::PartialSuccess {
                warning: "generator crashed".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_ids_ignored() {
        let service = ScriptedService::with_polls(vec![update(vec![
            variation(0, 1),
            variation(5, 1),
            variation(2, 1),
        ])]);
        let client = client(service);
        submit(&client);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let snapshot = client.snapshot();
        assert_eq!(snapshot.completed_count(), 1);
        assert_eq!(snapshot.percent(), 25.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_keeps_results_and_stops_updates() {
        let service = ScriptedService::with_polls(vec![
            update(vec![variation(1, 1)]),
            update(vec![variation(2, 1)]),
        ]);
        let client = client(service);
        submit(&client);

        // First poll lands at 2s.
        tokio::time::sleep(Duration::from_millis(3000)).await;
        client.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let snapshot = client.snapshot();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.completed_count(), 1);
        assert!(!snapshot.outcome().is_fatal());
    }

    #[tokio::test]
    async fn test_metrics_follow_job() {
        let metrics = Arc::new(PipelineMetrics::new().unwrap());
        let service = ScriptedService::with_polls(vec![update(
            (1..=4).map(|id| variation(id, 1)).collect(),
        )]);
        let client = VariationJobClient::new(
            service,
            JobConfig {
                poll_interval_ms: 1,
                ..JobConfig::default()
            },
        )
        .with_metrics(Arc::clone(&metrics));
        submit(&client);
        client.wait().await;

        // The worker records the outcome right after publishing the final state.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let output = metrics.encode().unwrap();
        assert!(output.contains("passport_photo_jobs_submitted_total 1"));
        assert!(output.contains("passport_photo_variations_received_total 4"));
        assert!(output.contains("passport_photo_job_outcomes_total{outcome=\"completed\"} 1"));
    }

    #[test]
    fn test_submit_without_runtime_fails_cleanly() {
        let client = client(ScriptedService::with_polls(Vec::new()));
        assert!(submit(&client));
        assert_eq!(client.status(), JobStatus::Failed);
    }
}
