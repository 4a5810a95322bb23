//! Crate-level end-to-end tests exercising the Job Engine, Retry Executor,
//! and Rerun Coordinator wired together against a real `JsonPersistence`
//! store and the deterministic mock providers, mirroring the scenarios a
//! production run would hit. Placed at crate level (not `tests/`) so these
//! tests can reach private module internals, matching the teacher's own
//! `lib_tests.rs` convention.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::{
    ApiKeys, FailOptions, FilePaths, JobConfiguration, Parameters, ProcessingSettings, QcStatus, RetryJobRequest,
    RetryJobType,
};
use crate::engine::{JobEngine, ProviderBundle};
use crate::persistence::{JsonPersistence, PersistenceFacade};
use crate::providers::mock::{MockBackgroundRemover, MockImageProcessor, MockImageProvider, MockVisionProvider};
use crate::retry_executor::{RetryDeps, RetryExecutor};
use crate::rerun::RerunCoordinator;
use crate::settings::data_root::override_data_root_for_tests;

fn fresh_persistence() -> (Arc<dyn PersistenceFacade>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp data root");
    override_data_root_for_tests(dir.path().to_path_buf());
    let store = JsonPersistence::load().expect("failed to load fresh persistence store");
    (Arc::new(store), dir)
}

fn test_configuration(output_dir: &std::path::Path) -> JobConfiguration {
    JobConfiguration {
        id: "config-1".to_string(),
        name: "integration test run".to_string(),
        api_keys: ApiKeys {
            openai: Some("sk-test".to_string()),
            runware: Some("rw-test".to_string()),
            remove_bg: None,
        },
        file_paths: FilePaths {
            output_directory: Some(output_dir.to_string_lossy().into_owned()),
            ..Default::default()
        },
        parameters: Parameters {
            count: 2,
            variations: 1,
            ..Default::default()
        },
        processing: ProcessingSettings::default(),
        ai: Default::default(),
    }
}

fn wait_until_idle(engine: &Arc<JobEngine>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while engine.get_job_status().running {
        assert!(Instant::now() < deadline, "job did not finish within timeout");
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Like [`wait_until_idle`], but debounces against the brief window where a
/// completion listener (e.g. the Rerun Coordinator draining its queue)
/// re-starts a new job on the same worker thread right after the previous
/// one clears `running`.
fn wait_until_fully_idle(engine: &Arc<JobEngine>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        wait_until_idle(engine, timeout);
        std::thread::sleep(Duration::from_millis(50));
        if !engine.get_job_status().running {
            return;
        }
        assert!(Instant::now() < deadline, "job did not settle within timeout");
    }
}

/// Happy-path scenario (spec §8): QC disabled, a configuration with two
/// requested images should settle every row into `approved` without any
/// manual retry.
#[test]
fn happy_path_qc_disabled_approves_every_image() {
    let (persistence, _dir) = fresh_persistence();
    let output_dir = tempfile::tempdir().expect("failed to create output dir");

    let providers = Arc::new(ProviderBundle {
        image: Arc::new(MockImageProvider::default()),
        vision: Arc::new(MockVisionProvider::default()),
        remove_bg: Arc::new(MockBackgroundRemover { should_apply: false }),
        processor: Arc::new(MockImageProcessor { fail_stage: None }),
    });

    let engine = JobEngine::new(persistence.clone(), providers);
    let configuration = test_configuration(output_dir.path());

    let execution_id = engine.start_job(configuration, None, None).expect("start_job should succeed");
    wait_until_idle(&engine, Duration::from_secs(5));

    let images = persistence
        .get_generated_images_by_execution(&execution_id)
        .expect("persistence read should succeed");
    assert!(!images.is_empty(), "generation loop should have produced at least one image row");
    for image in &images {
        assert_eq!(image.qc_status, QcStatus::Approved, "every image should settle as approved with QC disabled");
    }
}

/// A second `start_job` call while one is running must be rejected rather
/// than queued (spec §4.1 `JOB_ALREADY_RUNNING`).
#[test]
fn start_job_rejects_while_another_is_running() {
    let (persistence, _dir) = fresh_persistence();
    let output_dir = tempfile::tempdir().expect("failed to create output dir");

    let providers = Arc::new(ProviderBundle {
        image: Arc::new(MockImageProvider::default()),
        vision: Arc::new(MockVisionProvider::default()),
        remove_bg: Arc::new(MockBackgroundRemover { should_apply: false }),
        processor: Arc::new(MockImageProcessor { fail_stage: None }),
    });

    let engine = JobEngine::new(persistence, providers);
    let configuration = test_configuration(output_dir.path());

    engine.start_job(configuration.clone(), None, None).expect("first start_job should succeed");
    let second = engine.start_job(configuration, None, None);
    assert!(second.is_err(), "a second concurrent start_job must be rejected");

    wait_until_idle(&engine, Duration::from_secs(5));
}

/// Retrying a failed image with modified settings (spec §4.2) should
/// settle it back to `approved` through the Retry Executor's FIFO queue.
#[test]
fn retry_batch_with_modified_settings_approves_image() {
    let (persistence, _dir) = fresh_persistence();
    let output_dir = tempfile::tempdir().expect("failed to create output dir");
    let source_path = output_dir.path().join("source.png");
    std::fs::write(&source_path, b"source bytes").expect("failed to write source image");

    let image = crate::domain::GeneratedImage {
        id: "image-1".to_string(),
        execution_id: "exec-1".to_string(),
        image_mapping_id: "mapping-1".to_string(),
        generation_prompt: "a test prompt".to_string(),
        temp_image_path: Some(source_path.to_string_lossy().into_owned()),
        final_image_path: None,
        qc_status: QcStatus::QcFailed,
        qc_reason: Some("processing_failed:convert".to_string()),
        processing_settings: serde_json::json!({}),
        metadata: Default::default(),
    };
    persistence.save_generated_image(&image).expect("failed to seed image row");

    let retry_executor = RetryExecutor::new(RetryDeps {
        persistence: persistence.clone(),
        processor: Arc::new(MockImageProcessor { fail_stage: None }),
        vision: Arc::new(MockVisionProvider::default()),
    });

    let request_template = RetryJobRequest {
        image_id: String::new(),
        job_type: RetryJobType::Reprocess,
        use_original_settings: false,
        modified_settings: Some(serde_json::json!({ "enhancementSharpening": 0.5 })),
        include_metadata: false,
        fail_options: FailOptions::default(),
    };

    retry_executor
        .add_batch_retry_job(&["image-1".to_string()], request_template)
        .expect("batch retry enqueue should succeed");

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let settled = persistence
            .get_generated_image("image-1")
            .expect("persistence read should succeed")
            .expect("image row must still exist");
        if settled.qc_status != QcStatus::QcFailed {
            assert_eq!(settled.qc_status, QcStatus::Approved, "retried image should settle as approved");
            break;
        }
        assert!(Instant::now() < deadline, "retry did not settle within timeout");
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Bulk rerun (spec §4.3): reruns beyond the first are queued and drained
/// one at a time as each prior run completes, never run concurrently.
#[test]
fn bulk_rerun_drains_queue_in_fifo_order() {
    let (persistence, _dir) = fresh_persistence();
    let output_dir = tempfile::tempdir().expect("failed to create output dir");
    let configuration = test_configuration(output_dir.path());
    persistence.save_configuration(&configuration).expect("failed to seed configuration");

    let providers = Arc::new(ProviderBundle {
        image: Arc::new(MockImageProvider::default()),
        vision: Arc::new(MockVisionProvider::default()),
        remove_bg: Arc::new(MockBackgroundRemover { should_apply: false }),
        processor: Arc::new(MockImageProcessor { fail_stage: None }),
    });
    let engine = JobEngine::new(persistence.clone(), providers);

    let first_id = engine
        .start_job(configuration.clone(), None, None)
        .expect("seed start_job should succeed");
    wait_until_idle(&engine, Duration::from_secs(5));

    let second_id = engine
        .start_job(configuration, None, None)
        .expect("second seed start_job should succeed");
    wait_until_idle(&engine, Duration::from_secs(5));

    let coordinator = RerunCoordinator::new(engine.clone(), persistence.clone());
    let outcome = coordinator
        .rerun_bulk(&[first_id, second_id])
        .expect("bulk rerun should be accepted");

    assert!(outcome.success, "bulk rerun should report success when at least one job was queueable");
    assert!(outcome.started_execution_id.is_some(), "the first rerun should start immediately");
    assert_eq!(outcome.queued.len(), 1, "the remaining rerun should be queued, not started concurrently");

    // The queued rerun only starts once the first one's completion listener
    // fires on the same worker thread, so debounce past that handoff rather
    // than racing on a single `running` flag flip.
    wait_until_fully_idle(&engine, Duration::from_secs(10));

    let started_execution = persistence
        .get_job_execution(&outcome.started_execution_id.unwrap())
        .expect("persistence read should succeed")
        .expect("started rerun execution row must exist");
    assert_eq!(started_execution.status, crate::domain::ExecutionStatus::Completed);
}

/// Mark-failed remove-background mode (spec §8 scenario 2): when the
/// remover can't apply (e.g. a missing vendor key) and the policy is
/// `mark_failed`, the image must be hard-failed rather than silently
/// approved with a non-final path.
#[test]
fn remove_bg_mark_failed_mode_hard_fails_without_final_path() {
    let (persistence, _dir) = fresh_persistence();
    let output_dir = tempfile::tempdir().expect("failed to create output dir");

    let providers = Arc::new(ProviderBundle {
        image: Arc::new(MockImageProvider::default()),
        vision: Arc::new(MockVisionProvider::default()),
        remove_bg: Arc::new(MockBackgroundRemover { should_apply: false }),
        processor: Arc::new(MockImageProcessor { fail_stage: None }),
    });

    let engine = JobEngine::new(persistence.clone(), providers);
    let mut configuration = test_configuration(output_dir.path());
    configuration.processing.remove_background = true;
    configuration.processing.remove_bg_failure_mode = crate::domain::RemoveBgFailureMode::MarkFailed;
    configuration.parameters.count = 1;

    let execution_id = engine.start_job(configuration, None, None).expect("start_job should succeed");
    wait_until_idle(&engine, Duration::from_secs(5));

    let images = persistence
        .get_generated_images_by_execution(&execution_id)
        .expect("persistence read should succeed");
    assert_eq!(images.len(), 1);
    let image = &images[0];
    assert_eq!(image.qc_status, QcStatus::QcFailed);
    assert_eq!(image.qc_reason.as_deref(), Some("processing_failed:remove_bg"));
    assert!(image.final_image_path.is_none());
    let source_path = image.temp_image_path.as_deref().expect("source temp path should remain set");
    assert!(std::path::Path::new(source_path).exists(), "source file should remain present in the temp directory");
}

/// Force stop (spec §8 scenario 5): aborting a job while it is blocked
/// inside the image-generation step must unstick the worker and settle
/// the execution to a terminal status rather than hang.
#[test]
fn force_stop_all_aborts_in_flight_job() {
    struct BlockingImageProvider;

    impl crate::providers::ImageProvider for BlockingImageProvider {
        fn generate(
            &self,
            _params: &crate::providers::GenerationParameters,
            _dimension_csv: &str,
            _variations: u32,
            signal: &crate::engine::cancellation::AbortSignal,
        ) -> anyhow::Result<crate::providers::ImageProviderResult> {
            let deadline = Instant::now() + Duration::from_secs(5);
            loop {
                signal.check()?;
                if Instant::now() > deadline {
                    anyhow::bail!("blocking provider was never aborted");
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }

    let (persistence, _dir) = fresh_persistence();
    let output_dir = tempfile::tempdir().expect("failed to create output dir");

    let providers = Arc::new(ProviderBundle {
        image: Arc::new(BlockingImageProvider),
        vision: Arc::new(MockVisionProvider::default()),
        remove_bg: Arc::new(MockBackgroundRemover { should_apply: false }),
        processor: Arc::new(MockImageProcessor { fail_stage: None }),
    });

    let engine = JobEngine::new(persistence.clone(), providers);
    let configuration = test_configuration(output_dir.path());

    let execution_id = engine.start_job(configuration, None, None).expect("start_job should succeed");

    // Give the worker a moment to enter the blocked generation call before stopping it.
    std::thread::sleep(Duration::from_millis(100));
    engine.force_stop_all();

    wait_until_idle(&engine, Duration::from_secs(5));

    let execution = persistence
        .get_job_execution(&execution_id)
        .expect("persistence read should succeed")
        .expect("execution row must exist");
    assert_eq!(execution.status, crate::domain::ExecutionStatus::Stopped);
}

/// Prompt-file swallow (spec §8 scenario 6): a quality-check prompt file
/// that does not exist must not fail the job — the prompt is left unset
/// and QC degrades gracefully rather than erroring out.
#[test]
fn missing_quality_check_prompt_file_is_swallowed() {
    let (persistence, _dir) = fresh_persistence();
    let output_dir = tempfile::tempdir().expect("failed to create output dir");

    let providers = Arc::new(ProviderBundle {
        image: Arc::new(MockImageProvider::default()),
        vision: Arc::new(MockVisionProvider::default()),
        remove_bg: Arc::new(MockBackgroundRemover { should_apply: false }),
        processor: Arc::new(MockImageProcessor { fail_stage: None }),
    });

    let engine = JobEngine::new(persistence.clone(), providers);
    let mut configuration = test_configuration(output_dir.path());
    configuration.ai.run_quality_check = true;
    configuration.file_paths.quality_check_prompt_file = Some("/nonexistent/quality-check-prompt.txt".to_string());

    let execution_id = engine.start_job(configuration, None, None).expect("start_job should succeed");
    wait_until_idle(&engine, Duration::from_secs(5));

    let execution = persistence
        .get_job_execution(&execution_id)
        .expect("persistence read should succeed")
        .expect("execution row must exist");
    assert!(execution.configuration_snapshot.ai.quality_check_prompt.is_none());

    let images = persistence
        .get_generated_images_by_execution(&execution_id)
        .expect("persistence read should succeed");
    assert!(!images.is_empty());
    for image in &images {
        assert_eq!(image.qc_status, QcStatus::Approved, "QC should degrade gracefully and still approve");
    }
}
