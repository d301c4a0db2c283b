//! Log anomaly detection.
//!
//! Each log is reduced to `[severity, pipeline bucket, hour of day]`, standardised,
//! and scored by an isolation forest trained on the most recent logs in the store.

pub mod features;
pub mod forest;

use std::sync::RwLock;

use anyhow::Result;

use crate::config::AnomalyConfig;
use crate::db::Database;
use crate::models::{LogEntry, LogQuery};
use features::StandardScaler;
use forest::{ForestParams, IsolationForest};

#[derive(Debug, Clone)]
struct TrainedModel {
    scaler: StandardScaler,
    forest: IsolationForest,
    trained_on: usize,
}

pub struct AnomalyDetector {
    db: Database,
    params: ForestParams,
    training_window: u32,
    detection_window: u32,
    model: RwLock<Option<TrainedModel>>,
}

impl AnomalyDetector {
    pub fn new(db: Database, config: &AnomalyConfig) -> Self {
        Self {
            db,
            params: ForestParams {
                trees: config.trees,
                sample_size: config.sample_size,
                contamination: config.contamination,
                seed: config.seed,
            },
            training_window: config.training_window,
            detection_window: config.detection_window,
            model: RwLock::new(None),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.model.read().expect("model lock poisoned").is_some()
    }

    /// Number of logs the current model was trained on.
    pub fn trained_on(&self) -> Option<usize> {
        self.model
            .read()
            .expect("model lock poisoned")
            .as_ref()
            .map(|m| m.trained_on)
    }

    /// Train on the most recent logs. Returns `false` when there is nothing to
    /// train on; the previous model, if any, stays in place.
    pub fn train_model(&self) -> Result<bool> {
        let logs = self.db.fetch_logs(&LogQuery::recent(self.training_window))?;
        if logs.is_empty() {
            tracing::warn!("No logs found for training, insert some logs first");
            return Ok(false);
        }

        let rows = features::extract_all(&logs);
        let scaler = StandardScaler::fit(&rows);
        let scaled = scaler.transform_all(&rows);

        let Some(forest) = IsolationForest::fit(&scaled, &self.params) else {
            return Ok(false);
        };

        *self.model.write().expect("model lock poisoned") = Some(TrainedModel {
            scaler,
            forest,
            trained_on: logs.len(),
        });

        tracing::info!(logs = logs.len(), "Anomaly detection model trained");
        Ok(true)
    }

    /// Return the anomalous entries of `logs`, in input order.
    ///
    /// With `None`, the most recent logs in the store are examined. An untrained
    /// detector trains first and finds nothing if training is impossible.
    pub fn detect_anomalies(&self, logs: Option<Vec<LogEntry>>) -> Result<Vec<LogEntry>> {
        if !self.is_trained() && !self.train_model()? {
            return Ok(Vec::new());
        }

        let logs = match logs {
            Some(logs) => logs,
            None => self
                .db
                .fetch_logs(&LogQuery::recent(self.detection_window))?,
        };
        if logs.is_empty() {
            return Ok(Vec::new());
        }

        let guard = self.model.read().expect("model lock poisoned");
        let Some(model) = guard.as_ref() else {
            return Ok(Vec::new());
        };

        let anomalies = logs
            .into_iter()
            .filter(|log| {
                let scaled = model.scaler.transform(&features::extract(log));
                model.forest.is_anomaly(&scaled)
            })
            .collect();

        Ok(anomalies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateLogInput, LogLevel};
    use chrono::{TimeZone, Utc};

    fn setup() -> (Database, AnomalyDetector) {
        let db = Database::open_memory().unwrap();
        db.migrate().unwrap();
        let detector = AnomalyDetector::new(db.clone(), &AnomalyConfig::default());
        (db, detector)
    }

    #[test]
    fn training_without_logs_fails() {
        let (_db, detector) = setup();
        assert!(!detector.train_model().unwrap());
        assert!(!detector.is_trained());
    }

    #[test]
    fn detection_without_logs_is_empty() {
        let (_db, detector) = setup();
        assert!(detector.detect_anomalies(None).unwrap().is_empty());
    }

    #[test]
    fn detects_the_odd_one_out() {
        let (db, detector) = setup();
        for minute in 0..60 {
            db.insert_log(CreateLogInput {
                level: LogLevel::Info,
                message: "batch ok".to_string(),
                pipeline: Some("ETL_Job_2".to_string()),
                timestamp: Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()),
            })
            .unwrap();
        }
        let odd = db
            .insert_log(CreateLogInput {
                level: LogLevel::Critical,
                message: "disk full".to_string(),
                pipeline: Some("NIGHTLY_EXPORT".to_string()),
                timestamp: Some(Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap()),
            })
            .unwrap();

        assert!(detector.train_model().unwrap());
        assert_eq!(detector.trained_on(), Some(61));

        let anomalies = detector.detect_anomalies(None).unwrap();
        assert!(anomalies.iter().any(|a| a.id == odd.id));
        assert!(anomalies.iter().all(|a| a.level == LogLevel::Critical));
    }

    #[test]
    fn explicit_empty_input_yields_nothing() {
        let (db, detector) = setup();
        db.insert_sample_logs().unwrap();
        assert!(detector.detect_anomalies(Some(Vec::new())).unwrap().is_empty());
    }
}
