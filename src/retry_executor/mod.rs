//! Retry Executor (spec §4.2): a FIFO queue of per-image retry jobs,
//! drained by a single dedicated worker thread. Generalized from the same
//! `Inner`/`Mutex`/`Condvar` pattern as `core::engine`, but unlike the Job
//! Engine's "at most one execution" model, this queue holds many
//! independent jobs and drains them one at a time without rejecting new
//! enqueues while draining.

mod post_processing;
mod process_single_image;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::domain::{RetryJobRecord, RetryJobRequest, RetryJobStatus};
use crate::engine::cancellation::AbortSignal;
use crate::persistence::PersistenceFacade;
use crate::providers::{ImageProcessor, VisionProvider};
use crate::sync_ext::{CondvarExt, MutexExt};

/// The collaborators `processSingleImage` needs. Grouped the same way
/// `engine::ProviderBundle` groups the Job Engine's dependencies.
pub struct RetryDeps {
    pub persistence: Arc<dyn PersistenceFacade>,
    pub processor: Arc<dyn ImageProcessor>,
    pub vision: Arc<dyn VisionProvider>,
}

/// Events emitted over the lifetime of the queue (spec §4.2: `queue-updated`,
/// `job-status-updated`, `job-completed`, `job-error`, `progress`, `stopped`).
#[derive(Debug, Clone)]
pub enum RetryEvent {
    QueueUpdated,
    JobStatusUpdated { job_id: String, status: RetryJobStatus },
    JobCompleted { job_id: String },
    JobError { job_id: String, error: String },
    Progress { completed: usize, total: usize },
    Stopped,
}

type EventListener = Arc<dyn Fn(RetryEvent) + Send + Sync + 'static>;

struct State {
    jobs: VecDeque<RetryJobRecord>,
    is_processing: bool,
    current_signal: Option<AbortSignal>,
}

impl State {
    fn new() -> Self {
        Self {
            jobs: VecDeque::new(),
            is_processing: false,
            current_signal: None,
        }
    }
}

struct Inner {
    state: Mutex<State>,
    cv: std::sync::Condvar,
    listeners: Mutex<Vec<EventListener>>,
}

pub struct RetryExecutor {
    inner: Arc<Inner>,
    deps: Arc<RetryDeps>,
}

impl RetryExecutor {
    pub fn new(deps: RetryDeps) -> Arc<Self> {
        let executor = Arc::new(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::new()),
                cv: std::sync::Condvar::new(),
                listeners: Mutex::new(Vec::new()),
            }),
            deps: Arc::new(deps),
        });
        spawn_worker(&executor);
        executor
    }

    pub fn register_event_listener(&self, listener: impl Fn(RetryEvent) + Send + Sync + 'static) {
        self.inner.listeners.lock_unpoisoned().push(Arc::new(listener));
    }

    /// `addBatchRetryJob`: fans a batch of image ids out into one
    /// `RetryJobRequest` per id and enqueues them in order. Rejects an
    /// empty `image_ids`.
    pub fn add_batch_retry_job(&self, image_ids: &[String], request_template: RetryJobRequest) -> Result<Vec<String>, String> {
        if image_ids.is_empty() {
            return Err("No image IDs provided".to_string());
        }

        let mut job_ids = Vec::with_capacity(image_ids.len());
        {
            let mut state = self.inner.state.lock_unpoisoned();
            for image_id in image_ids {
                let job_id = crate::engine::new_id("retry");
                let request = RetryJobRequest {
                    image_id: image_id.clone(),
                    ..request_template.clone()
                };
                state.jobs.push_back(RetryJobRecord {
                    id: job_id.clone(),
                    request,
                    status: RetryJobStatus::Queued,
                    error: None,
                });
                job_ids.push(job_id);
            }
        }
        self.notify(RetryEvent::QueueUpdated);
        self.inner.cv.notify_all();
        Ok(job_ids)
    }

    /// `stop()`: clears every queued-or-processing job and aborts whichever
    /// retry is currently in flight.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock_unpoisoned();
        if let Some(signal) = &state.current_signal {
            signal.abort();
        }
        state.jobs.clear();
        state.is_processing = false;
        drop(state);
        self.notify(RetryEvent::Stopped);
    }

    /// `clearCompletedJobs()`: removes entries with `status=completed`.
    /// Errored jobs are kept so a caller can inspect why they failed.
    pub fn clear_completed_jobs(&self) {
        let mut state = self.inner.state.lock_unpoisoned();
        state.jobs.retain(|job| job.status != RetryJobStatus::Completed);
    }

    pub fn list_jobs(&self) -> Vec<RetryJobRecord> {
        self.inner.state.lock_unpoisoned().jobs.iter().cloned().collect()
    }

    fn notify(&self, event: RetryEvent) {
        let listeners: Vec<EventListener> = self.inner.listeners.lock_unpoisoned().clone();
        for listener in listeners {
            listener(event.clone());
        }
    }
}

fn spawn_worker(executor: &Arc<RetryExecutor>) {
    let executor = executor.clone();
    let spawned = std::thread::Builder::new()
        .name("imgforge-retry-worker".to_string())
        .spawn(move || worker_loop(&executor));
    if let Err(err) = spawned {
        crate::debug_eprintln!("failed to spawn retry worker thread: {err}");
    }
}

/// `processQueue()`: cooperative loop, no-op if already processing.
/// Drains the queue front-to-back, emitting the events named in spec §4.2,
/// then clears `isProcessing` once empty and waits for the next enqueue.
fn worker_loop(executor: &Arc<RetryExecutor>) {
    loop {
        let total = {
            let mut state = executor.inner.state.lock_unpoisoned();
            state = executor
                .inner
                .cv
                .wait_while_unpoisoned(state, |s| !s.jobs.iter().any(|j| j.status == RetryJobStatus::Queued));
            state.is_processing = true;
            state.jobs.iter().filter(|j| j.status == RetryJobStatus::Queued).count()
        };
        let mut completed = 0usize;

        loop {
            let next = {
                let mut state = executor.inner.state.lock_unpoisoned();
                let position = state.jobs.iter().position(|j| j.status == RetryJobStatus::Queued);
                match position {
                    Some(index) => {
                        state.jobs[index].status = RetryJobStatus::Processing;
                        let job = state.jobs[index].clone();
                        let signal = AbortSignal::new();
                        state.current_signal = Some(signal.clone());
                        Some((job, signal))
                    }
                    None => None,
                }
            };

            let Some((job, signal)) = next else {
                break;
            };

            executor.notify(RetryEvent::JobStatusUpdated {
                job_id: job.id.clone(),
                status: RetryJobStatus::Processing,
            });

            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                process_single_image::process(&executor.deps, &job.request, &signal)
            }));

            let (status, error) = match outcome {
                Ok(Ok(())) => (RetryJobStatus::Completed, None),
                Ok(Err(err)) => (RetryJobStatus::Error, Some(err.to_string())),
                Err(_) => (RetryJobStatus::Error, Some("retry job panicked".to_string())),
            };

            {
                let mut state = executor.inner.state.lock_unpoisoned();
                if let Some(record) = state.jobs.iter_mut().find(|j| j.id == job.id) {
                    record.status = status;
                    record.error = error.clone();
                }
                state.current_signal = None;
            }

            completed += 1;
            match &error {
                None => executor.notify(RetryEvent::JobCompleted { job_id: job.id.clone() }),
                Some(message) => executor.notify(RetryEvent::JobError {
                    job_id: job.id.clone(),
                    error: message.clone(),
                }),
            }
            executor.notify(RetryEvent::Progress { completed, total: total.max(completed) });
        }

        executor.inner.state.lock_unpoisoned().is_processing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FailOptions, RetryJobType};
    use crate::persistence::JsonPersistence;
    use crate::providers::mock::{MockImageProcessor, MockVisionProvider};
    use crate::settings::data_root::override_data_root_for_tests;

    fn template() -> RetryJobRequest {
        RetryJobRequest {
            image_id: String::new(),
            job_type: RetryJobType::Reprocess,
            use_original_settings: true,
            modified_settings: None,
            include_metadata: false,
            fail_options: FailOptions::default(),
        }
    }

    #[test]
    fn add_batch_retry_job_rejects_empty_image_ids() {
        let dir = tempfile::tempdir().unwrap();
        override_data_root_for_tests(dir.path().to_path_buf());
        let persistence = Arc::new(JsonPersistence::load().unwrap());
        let deps = RetryDeps {
            persistence,
            processor: Arc::new(MockImageProcessor { fail_stage: None }),
            vision: Arc::new(MockVisionProvider::default()),
        };
        let executor = RetryExecutor::new(deps);
        let result = executor.add_batch_retry_job(&[], template());
        assert!(result.is_err());
    }
}
