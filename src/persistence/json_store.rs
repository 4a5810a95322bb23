//! Concrete [`PersistenceFacade`] backed by three JSON files under the
//! resolved data root (configurations, executions, images), following the
//! same load-into-memory / atomic-rewrite-on-change pattern the teacher's
//! settings store uses, generalized from one file to three collections
//! guarded by independent mutexes so the Retry Executor and Job Engine
//! never block each other on unrelated writes.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;

use crate::domain::{GeneratedImage, ImageMetadata, JobConfiguration, JobExecution, QcStatus};
use crate::settings::data_root::{configurations_path, executions_path, images_path};
use crate::settings::io::{read_json_file, write_json_file};
use crate::settings::{self, AppSettings};

use super::PersistenceFacade;

/// Order-preserving collection of rows keyed by `id`, mirroring how the
/// source system's JSON-array tables behave (insertion order survives a
/// save/load round trip, per spec §8's persistence round-trip law).
struct Table<T> {
    order: Vec<String>,
    rows: HashMap<String, T>,
}

impl<T> Table<T> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            rows: HashMap::new(),
        }
    }

    fn upsert(&mut self, id: String, row: T) {
        if !self.rows.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.rows.insert(id, row);
    }

    fn remove(&mut self, id: &str) {
        self.rows.remove(id);
        self.order.retain(|existing| existing != id);
    }

    fn iter_in_order(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|id| self.rows.get(id))
    }
}

pub struct JsonPersistence {
    executions: Mutex<Table<JobExecution>>,
    images: Mutex<Table<GeneratedImage>>,
    configurations: Mutex<Table<JobConfiguration>>,
}

impl JsonPersistence {
    /// Loads the three collections from disk, treating a missing file as
    /// an empty collection (first run on a fresh data root).
    pub fn load() -> Result<Self> {
        let executions: Vec<JobExecution> = load_or_empty(&executions_path()?)?;
        let images: Vec<GeneratedImage> = load_or_empty(&images_path()?)?;
        let configurations: Vec<JobConfiguration> = load_or_empty(&configurations_path()?)?;

        let mut exec_table = Table::new();
        for row in executions {
            exec_table.upsert(row.id.clone(), row);
        }
        let mut image_table = Table::new();
        for row in images {
            image_table.upsert(row.id.clone(), row);
        }
        let mut config_table = Table::new();
        for row in configurations {
            config_table.upsert(row.id.clone(), row);
        }

        Ok(Self {
            executions: Mutex::new(exec_table),
            images: Mutex::new(image_table),
            configurations: Mutex::new(config_table),
        })
    }

    fn flush_executions(&self, table: &Table<JobExecution>) -> Result<()> {
        let rows: Vec<&JobExecution> = table.iter_in_order().collect();
        write_json_file(&executions_path()?, &rows)
    }

    fn flush_images(&self, table: &Table<GeneratedImage>) -> Result<()> {
        let rows: Vec<&GeneratedImage> = table.iter_in_order().collect();
        write_json_file(&images_path()?, &rows)
    }

    fn flush_configurations(&self, table: &Table<JobConfiguration>) -> Result<()> {
        let rows: Vec<&JobConfiguration> = table.iter_in_order().collect();
        write_json_file(&configurations_path()?, &rows)
    }
}

fn load_or_empty<T: for<'de> serde::Deserialize<'de>>(path: &std::path::Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    read_json_file(path)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PersistenceFacade for JsonPersistence {
    fn save_job_execution(&self, execution: &JobExecution) -> Result<()> {
        let mut table = lock(&self.executions);
        table.upsert(execution.id.clone(), execution.clone());
        self.flush_executions(&table)
    }

    fn update_job_execution(&self, execution: &JobExecution) -> Result<()> {
        self.save_job_execution(execution)
    }

    fn update_job_execution_statistics(
        &self,
        execution_id: &str,
        successful_images: u32,
        failed_images: u32,
        total_images: u32,
    ) -> Result<()> {
        let mut table = lock(&self.executions);
        if let Some(row) = table.rows.get_mut(execution_id) {
            row.successful_images = successful_images;
            row.failed_images = failed_images;
            row.total_images = total_images;
        }
        self.flush_executions(&table)
    }

    fn get_job_execution(&self, execution_id: &str) -> Result<Option<JobExecution>> {
        Ok(lock(&self.executions).rows.get(execution_id).cloned())
    }

    fn get_job_executions_by_ids(&self, ids: &[String]) -> Result<Vec<JobExecution>> {
        let table = lock(&self.executions);
        Ok(ids.iter().filter_map(|id| table.rows.get(id).cloned()).collect())
    }

    fn save_generated_image(&self, image: &GeneratedImage) -> Result<()> {
        let mut table = lock(&self.images);
        table.upsert(image.id.clone(), image.clone());
        self.flush_images(&table)
    }

    fn get_generated_image(&self, id: &str) -> Result<Option<GeneratedImage>> {
        Ok(lock(&self.images).rows.get(id).cloned())
    }

    fn get_generated_images_by_execution(&self, execution_id: &str) -> Result<Vec<GeneratedImage>> {
        Ok(lock(&self.images)
            .iter_in_order()
            .filter(|row| row.execution_id == execution_id)
            .cloned()
            .collect())
    }

    fn get_all_generated_images(&self) -> Result<Vec<GeneratedImage>> {
        Ok(lock(&self.images).iter_in_order().cloned().collect())
    }

    fn update_generated_image(&self, image: &GeneratedImage) -> Result<()> {
        self.save_generated_image(image)
    }

    fn update_generated_image_by_mapping_id(
        &self,
        mapping_id: &str,
        f: &dyn Fn(&mut GeneratedImage),
    ) -> Result<()> {
        let mut table = lock(&self.images);
        let target_id = table
            .iter_in_order()
            .find(|row| row.image_mapping_id == mapping_id)
            .map(|row| row.id.clone());
        if let Some(id) = target_id {
            if let Some(row) = table.rows.get_mut(&id) {
                f(row);
            }
        }
        self.flush_images(&table)
    }

    fn update_qc_status(&self, id: &str, status: QcStatus, reason: &str) -> Result<()> {
        let mut table = lock(&self.images);
        if let Some(row) = table.rows.get_mut(id) {
            row.qc_status = status;
            row.qc_reason = if reason.is_empty() {
                None
            } else {
                Some(reason.to_string())
            };
        }
        self.flush_images(&table)
    }

    fn update_qc_status_by_mapping_id(
        &self,
        mapping_id: &str,
        status: QcStatus,
        reason: &str,
    ) -> Result<()> {
        self.update_generated_image_by_mapping_id(mapping_id, &|row| {
            row.qc_status = status;
            row.qc_reason = if reason.is_empty() {
                None
            } else {
                Some(reason.to_string())
            };
        })
    }

    fn update_image_paths_by_mapping_id(
        &self,
        mapping_id: &str,
        temp_image_path: Option<String>,
        final_image_path: Option<String>,
    ) -> Result<()> {
        self.update_generated_image_by_mapping_id(mapping_id, &|row| {
            if temp_image_path.is_some() {
                row.temp_image_path = temp_image_path.clone();
            }
            if final_image_path.is_some() {
                row.final_image_path = final_image_path.clone();
            }
        })
    }

    fn update_metadata_by_id(&self, id: &str, metadata: ImageMetadata) -> Result<()> {
        let mut table = lock(&self.images);
        if let Some(row) = table.rows.get_mut(id) {
            row.metadata = metadata;
        }
        self.flush_images(&table)
    }

    fn delete_generated_image(&self, id: &str) -> Result<()> {
        let mut table = lock(&self.images);
        table.remove(id);
        self.flush_images(&table)
    }

    fn get_configuration_by_id(&self, id: &str) -> Result<Option<JobConfiguration>> {
        Ok(lock(&self.configurations).rows.get(id).cloned())
    }

    fn save_configuration(&self, configuration: &JobConfiguration) -> Result<()> {
        let mut table = lock(&self.configurations);
        table.upsert(configuration.id.clone(), configuration.clone());
        self.flush_configurations(&table)
    }

    fn get_settings(&self) -> Result<AppSettings> {
        settings::load_settings()
    }

    fn save_settings(&self, settings: &AppSettings) -> Result<()> {
        settings::save_settings(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConfigurationSnapshot, ExecutionStatus};
    use crate::settings::data_root::override_data_root_for_tests;

    fn make_execution(id: &str) -> JobExecution {
        let cfg = JobConfiguration {
            id: "cfg-1".into(),
            name: "test".into(),
            api_keys: Default::default(),
            file_paths: Default::default(),
            parameters: Default::default(),
            processing: Default::default(),
            ai: Default::default(),
        };
        let snapshot = ConfigurationSnapshot::from_configuration(&cfg);
        let mut execution = JobExecution::new(id.to_string(), cfg.id.clone(), snapshot, "label".into(), 0);
        execution.status = ExecutionStatus::Running;
        execution
    }

    #[test]
    fn round_trips_executions_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        override_data_root_for_tests(dir.path().to_path_buf());

        let store = JsonPersistence::load().unwrap();
        store.save_job_execution(&make_execution("exec-1")).unwrap();

        let reloaded = JsonPersistence::load().unwrap();
        let fetched = reloaded.get_job_execution("exec-1").unwrap().unwrap();
        assert_eq!(fetched.id, "exec-1");
    }

    #[test]
    fn update_by_mapping_id_is_a_noop_for_unknown_mapping() {
        let dir = tempfile::tempdir().unwrap();
        override_data_root_for_tests(dir.path().to_path_buf());

        let store = JsonPersistence::load().unwrap();
        store
            .update_qc_status_by_mapping_id("does-not-exist", QcStatus::Approved, "")
            .unwrap();
        assert!(store.get_all_generated_images().unwrap().is_empty());
    }
}
