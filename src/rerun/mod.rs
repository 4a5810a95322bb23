//! Rerun Coordinator (spec §4.3): re-launches a historical execution, or a
//! FIFO batch of them, through the Job Engine. Owns its `bulk_rerun_queue`
//! as a field behind a `Mutex` rather than a process-wide static (spec §9
//! "global state → owned state"), and advances the queue only from the Job
//! Engine's completion listener — it never holds a back-reference the
//! engine would need to know about.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::domain::{ExecutionStatus, JobExecution};
use crate::engine::{EngineError, JobEngine};
use crate::persistence::PersistenceFacade;
use crate::sync_ext::MutexExt;

const ENGINE_BUSY: &str = "Another job is currently running";

/// One execution id that could not be queued for bulk rerun, with why.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRerunJob {
    pub execution_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkRerunOutcome {
    pub success: bool,
    pub started_execution_id: Option<String>,
    pub queued: Vec<String>,
    pub failed_jobs: Vec<FailedRerunJob>,
}

pub struct RerunCoordinator {
    engine: Arc<JobEngine>,
    persistence: Arc<dyn PersistenceFacade>,
    bulk_rerun_queue: Mutex<VecDeque<String>>,
}

impl RerunCoordinator {
    /// Registers itself as a completion listener on `engine` so bulk
    /// rerun advancement happens automatically after every job finishes,
    /// without the engine ever holding a reference back to this type.
    pub fn new(engine: Arc<JobEngine>, persistence: Arc<dyn PersistenceFacade>) -> Arc<Self> {
        let coordinator = Arc::new(Self {
            engine,
            persistence,
            bulk_rerun_queue: Mutex::new(VecDeque::new()),
        });
        let listener_target = coordinator.clone();
        coordinator.engine.register_completion_listener(move |_execution_id, _succeeded| {
            listener_target.process_next_bulk_rerun_job();
        });
        coordinator
    }

    /// Reruns one historical execution: resolve its configuration, verify
    /// the engine is idle, and start a fresh job linked back to it.
    pub fn rerun_single(&self, execution_id: &str) -> Result<String, String> {
        let original = self
            .persistence
            .get_job_execution(execution_id)
            .map_err(|err| err.to_string())?
            .ok_or_else(|| format!("no execution found for id {execution_id}"))?;

        let configuration = self
            .persistence
            .get_configuration_by_id(&original.configuration_id)
            .map_err(|err| err.to_string())?
            .ok_or_else(|| "configuration for this execution no longer exists".to_string())?;

        if self.engine.get_job_status().running {
            return Err(ENGINE_BUSY.to_string());
        }

        let label = rerun_label(&configuration.name, &original.label);

        match self.engine.start_job(configuration, Some((execution_id.to_string(), true)), Some(label)) {
            Ok(new_execution_id) => Ok(new_execution_id),
            Err(EngineError::JobAlreadyRunning) => Err(ENGINE_BUSY.to_string()),
            Err(err) => {
                self.mark_failed(&original, &err.to_string());
                Err(err.to_string())
            }
        }
    }

    /// Reruns a batch of historical executions: reject outright if any
    /// selected id is currently running, partition the rest into
    /// queueable/failed, start the first queueable one, and push the
    /// remainder onto `bulk_rerun_queue`.
    pub fn rerun_bulk(&self, execution_ids: &[String]) -> Result<BulkRerunOutcome, String> {
        let running_execution_id = self.engine.get_job_status().execution_id;

        if let Some(running_id) = &running_execution_id {
            if execution_ids.iter().any(|id| id == running_id) {
                return Err("Cannot rerun jobs while other jobs are running".to_string());
            }
        }

        let mut queueable: Vec<(JobExecution, crate::domain::JobConfiguration)> = Vec::new();
        let mut failed_jobs = Vec::new();

        for execution_id in execution_ids {
            match self.resolve_queueable(execution_id) {
                Ok(pair) => queueable.push(pair),
                Err(reason) => failed_jobs.push(FailedRerunJob {
                    execution_id: execution_id.clone(),
                    reason,
                }),
            }
        }

        if queueable.is_empty() {
            return Ok(BulkRerunOutcome {
                success: false,
                started_execution_id: None,
                queued: Vec::new(),
                failed_jobs,
            });
        }

        if self.engine.get_job_status().running {
            return Err(ENGINE_BUSY.to_string());
        }

        let mut remaining = queueable.into_iter();
        let (first_execution, first_configuration) = remaining.next().expect("queueable is non-empty");
        let label = rerun_label(&first_configuration.name, &first_execution.label);

        let started_execution_id = match self.engine.start_job(
            first_configuration,
            Some((first_execution.id.clone(), true)),
            Some(label),
        ) {
            Ok(id) => id,
            Err(err) => {
                self.mark_failed(&first_execution, &err.to_string());
                return Err(err.to_string());
            }
        };

        let mut queue = self.bulk_rerun_queue.lock_unpoisoned();
        let queued: Vec<String> = remaining.map(|(execution, _)| execution.id.clone()).collect();
        queue.extend(queued.iter().cloned());
        drop(queue);

        Ok(BulkRerunOutcome {
            success: true,
            started_execution_id: Some(started_execution_id),
            queued,
            failed_jobs,
        })
    }

    /// Called from the Job Engine's completion listener. Starts the next
    /// queued bulk-rerun job if the engine is idle and the queue is
    /// non-empty; leaves the queue intact if the row can't be created or
    /// the job can't be started so a later completion can retry it.
    fn process_next_bulk_rerun_job(&self) {
        if self.engine.get_job_status().running {
            return;
        }

        let next_execution_id = {
            let mut queue = self.bulk_rerun_queue.lock_unpoisoned();
            queue.pop_front()
        };
        let Some(next_execution_id) = next_execution_id else {
            return;
        };

        let Ok(pair) = self.resolve_queueable(&next_execution_id) else {
            return;
        };
        let (execution, configuration) = pair;
        let label = rerun_label(&configuration.name, &execution.label);
        if self
            .engine
            .start_job(configuration, Some((execution.id.clone(), true)), Some(label))
            .is_err()
        {
            self.bulk_rerun_queue.lock_unpoisoned().push_front(next_execution_id);
        }
    }

    fn resolve_queueable(&self, execution_id: &str) -> Result<(JobExecution, crate::domain::JobConfiguration), String> {
        let execution = self
            .persistence
            .get_job_execution(execution_id)
            .map_err(|err| err.to_string())?
            .ok_or_else(|| "execution no longer exists".to_string())?;
        let configuration = self
            .persistence
            .get_configuration_by_id(&execution.configuration_id)
            .map_err(|err| err.to_string())?
            .ok_or_else(|| "configuration no longer exists".to_string())?;
        Ok((execution, configuration))
    }

    fn mark_failed(&self, execution: &JobExecution, reason: &str) {
        let mut failed = execution.clone();
        failed.status = ExecutionStatus::Failed;
        failed.error_message = Some(reason.to_string());
        self.persistence.update_job_execution(&failed).ok();
    }
}

/// `"<configLabel> (Rerun)"`, falling back to the prior execution's own
/// label when the configuration's name is empty.
fn rerun_label(configuration_name: &str, prior_label: &str) -> String {
    let base = if configuration_name.is_empty() { prior_label } else { configuration_name };
    format!("{base} (Rerun)")
}
