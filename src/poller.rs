use crate::api::{self, ApiError};
use crate::models::{DatasetSummary, ProcessingStatus};
use poll_promise::Promise;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const POLL_INTERVAL: Duration = Duration::from_millis(2500);

// A job that is still not visible (or not terminal) after this many
// polled ticks is marked failed instead of being polled forever.
pub const MAX_POLL_ATTEMPTS: u32 = 240;

pub trait StatusFetch: Send + Sync {
    fn fetch(&self, dataset_name: &str) -> Result<DatasetSummary, ApiError>;
}

pub struct ApiStatusFetch;

impl StatusFetch for ApiStatusFetch {
    fn fetch(&self, dataset_name: &str) -> Result<DatasetSummary, ApiError> {
        api::get_dataset_summary(dataset_name)
    }
}

#[derive(Debug, Clone)]
pub struct ImportJob {
    pub status: ProcessingStatus,
    pub summary: Option<DatasetSummary>,
    pub attempts: u32,
    pub error: Option<String>,
}

impl ImportJob {
    fn new(status: ProcessingStatus) -> Self {
        ImportJob {
            status,
            summary: None,
            attempts: 0,
            error: None,
        }
    }
}

pub struct ImportPoller {
    fetcher: Arc<dyn StatusFetch>,
    jobs: BTreeMap<String, ImportJob>,
    last_tick: Option<Instant>,
    in_flight: Option<Promise<Vec<(String, Result<DatasetSummary, ApiError>)>>>,
}

impl ImportPoller {
    pub fn new(fetcher: Arc<dyn StatusFetch>) -> Self {
        ImportPoller {
            fetcher,
            jobs: BTreeMap::new(),
            last_tick: None,
            in_flight: None,
        }
    }

    pub fn new_with_api() -> Self {
        ImportPoller::new(Arc::new(ApiStatusFetch))
    }

    pub fn mark_starting(&mut self, dataset_name: &str) {
        self.jobs
            .insert(dataset_name.to_string(), ImportJob::new(ProcessingStatus::Starting));
    }

    pub fn watch(&mut self, dataset_name: &str) {
        let job = self
            .jobs
            .entry(dataset_name.to_string())
            .or_insert_with(|| ImportJob::new(ProcessingStatus::Importing));
        job.status = ProcessingStatus::Importing;
        job.error = None;
    }

    pub fn mark_failed(&mut self, dataset_name: &str, message: &str) {
        let job = self
            .jobs
            .entry(dataset_name.to_string())
            .or_insert_with(|| ImportJob::new(ProcessingStatus::Failed));
        job.status = ProcessingStatus::Failed;
        job.error = Some(message.to_string());
    }

    pub fn job(&self, dataset_name: &str) -> Option<&ImportJob> {
        self.jobs.get(dataset_name)
    }

    pub fn has_active(&self) -> bool {
        self.jobs.values().any(|job| job.status.is_active())
    }

    pub fn is_polling(&self) -> bool {
        self.in_flight.is_some() || self.has_active()
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
        self.in_flight = None;
        self.last_tick = None;
    }

    fn active_names(&self) -> Vec<String> {
        self.jobs
            .iter()
            .filter(|(_, job)| job.status.is_active())
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn due(&self, now: Instant) -> bool {
        self.last_tick
            .map_or(true, |tick| now.duration_since(tick) >= POLL_INTERVAL)
    }

    // Drives the poll loop from the UI frame. Applies a finished batch if
    // one is ready, then starts the next batch once the interval has
    // elapsed. At most one batch is ever outstanding, so no job is queried
    // twice concurrently. Returns the names that completed this pump.
    pub fn pump(&mut self, now: Instant) -> Vec<String> {
        let mut completed = Vec::new();

        let finished = if let Some(promise) = &self.in_flight {
            promise.ready().cloned()
        } else {
            None
        };
        if let Some(results) = finished {
            self.in_flight = None;
            completed = self.apply(results);
        }

        if self.in_flight.is_none() && self.due(now) {
            let names = self.active_names();
            if !names.is_empty() {
                self.last_tick = Some(now);
                let fetcher = Arc::clone(&self.fetcher);
                self.in_flight = Some(Promise::spawn_thread("import_status_poll", move || {
                    names
                        .into_iter()
                        .map(|name| {
                            let result = fetcher.fetch(&name);
                            (name, result)
                        })
                        .collect()
                }));
            }
        }

        completed
    }

    fn apply(
        &mut self,
        results: Vec<(String, Result<DatasetSummary, ApiError>)>,
    ) -> Vec<String> {
        let mut completed = Vec::new();
        for (name, result) in results {
            let Some(job) = self.jobs.get_mut(&name) else {
                continue;
            };
            if job.status.is_terminal() {
                continue;
            }
            match result {
                Ok(summary) => {
                    if let Some(status) = summary.dataset_info.processing_status {
                        let was_completed = job.status == ProcessingStatus::Completed;
                        job.status = status;
                        if status == ProcessingStatus::Completed && !was_completed {
                            completed.push(name);
                        }
                    }
                    job.summary = Some(summary);
                }
                // Not visible yet: the dataset row appears only once the
                // backend registers the import. Keep waiting.
                Err(ApiError::NotFound(_)) => {}
                Err(err) => {
                    job.status = ProcessingStatus::Failed;
                    job.error = Some(err.to_string());
                }
            }
            job.attempts += 1;
            if !job.status.is_terminal() && job.attempts >= MAX_POLL_ATTEMPTS {
                job.status = ProcessingStatus::Failed;
                job.error = Some(format!(
                    "no terminal status after {} polls, giving up",
                    job.attempts
                ));
            }
        }
        completed
    }
}
