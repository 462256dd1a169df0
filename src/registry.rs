use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::ensemble::RiskEnsemble;
use crate::error::PipelineError;
use crate::forecast::{self, TrendForecaster};
use crate::models::{ClassifierMetrics, ForecasterStatus, LabeledExample, MetricRow};

pub const CLASSIFIER_FILE: &str = "burnout_model.json";
pub const FORECASTER_FILE: &str = "trend_model.json";

#[derive(Default)]
pub struct ModelRegistry {
    classifier: RwLock<Option<Arc<RiskEnsemble>>>,
    forecaster: RwLock<Option<Arc<TrendForecaster>>>,
    training: Mutex<()>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classifier(&self) -> Option<Arc<RiskEnsemble>> {
        self.classifier.read().clone()
    }

    pub fn forecaster(&self) -> Option<Arc<TrendForecaster>> {
        self.forecaster.read().clone()
    }

    pub fn train_classifier(
        &self,
        examples: &[LabeledExample],
    ) -> Result<ClassifierMetrics, PipelineError> {
        let _guard = self.training.lock();
        let (model, metrics) = RiskEnsemble::train(examples)?;
        *self.classifier.write() = Some(Arc::new(model));
        Ok(metrics)
    }

    /// Below `window + 1` rows this is a no-op and any previous model stays.
    pub fn train_forecaster(&self, history: &[MetricRow], window: usize) -> ForecasterStatus {
        let _guard = self.training.lock();
        match TrendForecaster::fit(history, window) {
            Some(model) => {
                *self.forecaster.write() = Some(Arc::new(model));
                info!(rows = history.len(), window, "trend forecaster trained");
                ForecasterStatus::Trained {
                    rows: history.len(),
                    window,
                }
            }
            None => {
                let required = window + 1;
                forecast::log_untrained(history.len(), required);
                ForecasterStatus::Untrained {
                    rows: history.len(),
                    required,
                }
            }
        }
    }

    /// Load whatever models exist under `dir`. Missing files leave that model
    /// untrained; unreadable ones are logged and skipped.
    pub fn load(dir: &Path) -> Self {
        let registry = Self::new();

        match read_model::<RiskEnsemble>(&dir.join(CLASSIFIER_FILE)) {
            Ok(Some(model)) => {
                *registry.classifier.write() = Some(Arc::new(model));
                info!(path = %dir.join(CLASSIFIER_FILE).display(), "burnout classifier loaded");
            }
            Ok(None) => warn!("burnout classifier not found, train it before predicting"),
            Err(err) => warn!(error = %err, "failed to load burnout classifier"),
        }

        match read_model::<TrendForecaster>(&dir.join(FORECASTER_FILE)) {
            Ok(Some(model)) => {
                info!(
                    path = %dir.join(FORECASTER_FILE).display(),
                    window = model.window(),
                    "trend forecaster loaded"
                );
                *registry.forecaster.write() = Some(Arc::new(model));
            }
            Ok(None) => warn!("trend forecaster not found, train it before forecasting"),
            Err(err) => warn!(error = %err, "failed to load trend forecaster"),
        }

        registry
    }

    pub fn save(&self, dir: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create model directory {}", dir.display()))?;

        if let Some(model) = self.classifier() {
            write_model(&dir.join(CLASSIFIER_FILE), model.as_ref())?;
        }
        if let Some(model) = self.forecaster() {
            write_model(&dir.join(FORECASTER_FILE), model.as_ref())?;
        }
        info!(dir = %dir.display(), "models saved");
        Ok(())
    }
}

fn read_model<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let model = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(model))
}

fn write_model<T: serde::Serialize>(path: &Path, model: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string(model).context("failed to serialize model")?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::tests::labeled_examples;
    use crate::features::tests::record;
    use crate::models::WellbeingRecord;
    use crate::risk::predict_burnout;
    use std::thread;

    fn history(n: usize) -> Vec<MetricRow> {
        (0..n)
            .map(|i| MetricRow::new(4.0 + (i % 4) as f64, 6.0, 5.0 - (i % 3) as f64, 7.0))
            .collect()
    }

    #[test]
    fn empty_registry_has_no_models() {
        let registry = ModelRegistry::new();
        assert!(registry.classifier().is_none());
        assert!(registry.forecaster().is_none());
    }

    #[test]
    fn short_history_keeps_the_previous_forecaster() {
        let registry = ModelRegistry::new();
        assert!(matches!(
            registry.train_forecaster(&history(30), 14),
            ForecasterStatus::Trained { .. }
        ));
        let before = registry.forecaster().unwrap();

        let status = registry.train_forecaster(&history(10), 14);
        assert_eq!(status, ForecasterStatus::Untrained { rows: 10, required: 15 });
        assert!(Arc::ptr_eq(&before, &registry.forecaster().unwrap()));
    }

    #[test]
    fn failed_classifier_training_leaves_state_untouched() {
        let registry = ModelRegistry::new();
        let examples = labeled_examples(2);
        assert!(registry.train_classifier(&examples).is_err());
        assert!(registry.classifier().is_none());
    }

    #[test]
    fn models_survive_a_save_and_load() {
        let registry = ModelRegistry::new();
        registry.train_classifier(&labeled_examples(6)).unwrap();
        registry.train_forecaster(&history(30), 7);

        let dir = tempfile::tempdir().unwrap();
        registry.save(dir.path()).unwrap();
        let loaded = ModelRegistry::load(dir.path());

        let sample = &labeled_examples(1)[1].features;
        let original = registry.classifier().unwrap().predict_proba(sample);
        let restored = loaded.classifier().unwrap().predict_proba(sample);
        assert!((original - restored).abs() < 1e-9);
        assert_eq!(loaded.forecaster().unwrap().window(), 7);
    }

    #[test]
    fn loading_an_empty_directory_yields_untrained_models() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::load(dir.path());
        assert!(registry.classifier().is_none());
        assert!(registry.forecaster().is_none());
    }

    #[test]
    fn readers_only_see_complete_models_during_training() {
        let registry = ModelRegistry::new();
        let examples = labeled_examples(8);
        let week: Vec<WellbeingRecord> = (0..7).map(|d| record(d, 3, 3, 9, 4, 10.0)).collect();

        thread::scope(|scope| {
            for _ in 0..3 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        if let Some(model) = registry.classifier() {
                            let features = &examples[0].features;
                            let p = model.predict_proba(features);
                            let (forest, boosting) = model.component_probabilities(features);
                            assert!((0.0..=1.0).contains(&p));
                            assert!((p - (forest + boosting) / 2.0).abs() < 1e-12);
                        }
                        let assessment = predict_burnout(&registry, &week).unwrap();
                        assert!((0.0..=1.0).contains(&assessment.probability));
                    }
                });
            }
            scope.spawn(|| registry.train_classifier(&examples).unwrap());
        });

        assert!(registry.classifier().is_some());
        assert!(predict_burnout(&registry, &week).unwrap().model_ready);
    }

    #[test]
    fn concurrent_retraining_leaves_one_whole_model() {
        let registry = ModelRegistry::new();
        let examples = labeled_examples(8);

        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| scope.spawn(|| registry.train_classifier(&examples)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(results.iter().all(Result::is_ok));
        assert!(registry.training.try_lock().is_some());

        let installed = registry.classifier().unwrap();
        assert!(Arc::ptr_eq(&installed, &registry.classifier().unwrap()));
        let (reference, _) = RiskEnsemble::train(&examples).unwrap();
        for example in &examples {
            assert_eq!(
                installed.predict_proba(&example.features),
                reference.predict_proba(&example.features)
            );
        }
    }
}
