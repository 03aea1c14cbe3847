//! On-disk model storage.
//!
//! ```text
//! models/
//! ├── first_inning_model_20240915_101530.json   (archive, one per training run)
//! └── first_inning_model_latest.json            (copy of the newest archive)
//! ```
//!
//! Every file is written to a `.tmp` sibling, synced, then renamed into
//! place, so a concurrent reader sees either the old model or the new one.
use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ModelError;

use super::predictor::TrainedModel;

const MODEL_PREFIX: &str = "first_inning_model_";
const LATEST_FILE: &str = "first_inning_model_latest.json";

/// Write `bytes` to `path` via a synced temporary file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file =
        File::create(&tmp).with_context(|| format!("Failed to create {}", tmp.display()))?;
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .and_then(|_| file.sync_all())
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    drop(file);

    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ModelStore { dir: dir.into() }
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FILE)
    }

    /// Archive `model` under a timestamped name and replace the latest copy.
    /// Returns the archive path.
    pub fn save(&self, model: &TrainedModel) -> Result<PathBuf> {
        let json = serde_json::to_vec_pretty(model).context("Failed to serialize model")?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let archive = self.dir.join(format!("{}{}.json", MODEL_PREFIX, stamp));

        write_atomic(&archive, &json)?;
        write_atomic(&self.latest_path(), &json)?;
        info!(
            features = model.feature_names.len(),
            events = model.training_events,
            "Model saved to {}",
            archive.display()
        );
        Ok(archive)
    }

    pub fn load(&self, path: &Path) -> Result<Arc<TrainedModel>> {
        let raw = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let model: TrainedModel = serde_json::from_slice(&raw)
            .with_context(|| format!("Failed to parse model file {}", path.display()))?;
        debug!(
            "Loaded model trained {} on {} games",
            model.trained_at, model.training_events
        );
        Ok(Arc::new(model))
    }

    /// The newest saved model, or `ModelError::NotInitialized` when none
    /// has been trained into this directory.
    pub fn load_latest(&self) -> Result<Arc<TrainedModel>> {
        let path = self.latest_path();
        if !path.exists() {
            return Err(ModelError::NotInitialized(format!("no model at {}", path.display())).into());
        }
        self.load(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::season;
    use crate::model::predictor::{train, TrainOptions};
    use approx::assert_relative_eq;

    #[test]
    fn missing_latest_is_not_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("models"));
        let err = store.load_latest().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModelError>(),
            Some(ModelError::NotInitialized(_))
        ));
    }

    #[test]
    fn saved_model_round_trips_through_latest() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("models");
        let store = ModelStore::new(&dir);
        let events = season(80, 36, 9);
        let (model, _) = train(&events, &TrainOptions::default()).unwrap();

        let archive = store.save(&model).unwrap();
        assert!(archive.exists());
        assert!(archive
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap()
            .starts_with(MODEL_PREFIX));
        assert!(!dir.join(format!("{}.tmp", LATEST_FILE)).exists());

        let loaded = store.load_latest().unwrap();
        assert_eq!(loaded.feature_names, model.feature_names);
        for e in &events[..10] {
            assert_relative_eq!(
                loaded.predict(&e.game).probability,
                model.predict(&e.game).probability,
                epsilon = 1e-12
            );
        }
    }
}
