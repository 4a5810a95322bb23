//! Persistence Facade (spec §4.6): a narrow capability interface the Job
//! Engine and Retry Executor consume instead of talking to the store
//! directly. Operations return `Result`, but per spec "callers must
//! tolerate `{success:false}` without throwing" — call sites in
//! `engine::job_runner` and `retry_executor` treat an `Err` the same way
//! a `{success:false}` response would be treated: logged and, where
//! safe, the step continues rather than aborting the whole job.

mod json_store;

pub use json_store::JsonPersistence;

use anyhow::Result;

use crate::domain::{GeneratedImage, ImageMetadata, JobConfiguration, JobExecution, QcStatus};
use crate::settings::AppSettings;

pub trait PersistenceFacade: Send + Sync {
    // Execution group
    fn save_job_execution(&self, execution: &JobExecution) -> Result<()>;
    fn update_job_execution(&self, execution: &JobExecution) -> Result<()>;
    fn update_job_execution_statistics(
        &self,
        execution_id: &str,
        successful_images: u32,
        failed_images: u32,
        total_images: u32,
    ) -> Result<()>;
    fn get_job_execution(&self, execution_id: &str) -> Result<Option<JobExecution>>;
    fn get_job_executions_by_ids(&self, ids: &[String]) -> Result<Vec<JobExecution>>;

    // Image group
    fn save_generated_image(&self, image: &GeneratedImage) -> Result<()>;
    fn get_generated_image(&self, id: &str) -> Result<Option<GeneratedImage>>;
    fn get_generated_images_by_execution(&self, execution_id: &str) -> Result<Vec<GeneratedImage>>;
    fn get_all_generated_images(&self) -> Result<Vec<GeneratedImage>>;
    fn update_generated_image(&self, image: &GeneratedImage) -> Result<()>;
    fn update_generated_image_by_mapping_id(
        &self,
        mapping_id: &str,
        f: &dyn Fn(&mut GeneratedImage),
    ) -> Result<()>;
    fn update_qc_status(&self, id: &str, status: QcStatus, reason: &str) -> Result<()>;
    fn update_qc_status_by_mapping_id(
        &self,
        mapping_id: &str,
        status: QcStatus,
        reason: &str,
    ) -> Result<()>;
    fn update_image_paths_by_mapping_id(
        &self,
        mapping_id: &str,
        temp_image_path: Option<String>,
        final_image_path: Option<String>,
    ) -> Result<()>;
    fn update_metadata_by_id(&self, id: &str, metadata: ImageMetadata) -> Result<()>;
    fn delete_generated_image(&self, id: &str) -> Result<()>;

    // Config group
    fn get_configuration_by_id(&self, id: &str) -> Result<Option<JobConfiguration>>;
    fn save_configuration(&self, configuration: &JobConfiguration) -> Result<()>;
    fn get_settings(&self) -> Result<AppSettings>;
    fn save_settings(&self, settings: &AppSettings) -> Result<()>;
    fn get_default_settings(&self) -> AppSettings {
        AppSettings::default()
    }
}
