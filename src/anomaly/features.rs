use chrono::Timelike;

use crate::models::LogEntry;

pub const FEATURE_COUNT: usize = 3;

pub type FeatureVector = [f64; FEATURE_COUNT];

/// Number of buckets pipeline names are hashed into.
const PIPELINE_BUCKETS: u64 = 10;

/// `[severity, pipeline bucket, hour of day]` for one log record.
pub fn extract(log: &LogEntry) -> FeatureVector {
    [
        f64::from(log.level.severity()),
        pipeline_bucket(log.pipeline.as_deref().unwrap_or("unknown")) as f64,
        f64::from(log.timestamp.hour()),
    ]
}

pub fn extract_all(logs: &[LogEntry]) -> Vec<FeatureVector> {
    logs.iter().map(extract).collect()
}

/// Stable across processes, unlike `std` hashers.
pub fn pipeline_bucket(pipeline: &str) -> u64 {
    let digest = md5::compute(pipeline.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head) % PIPELINE_BUCKETS
}

/// Zero-mean, unit-variance scaling fitted per column.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: FeatureVector,
    scale: FeatureVector,
}

impl StandardScaler {
    /// Fit on `rows`. Columns with zero variance are scaled by 1.
    pub fn fit(rows: &[FeatureVector]) -> Self {
        let n = rows.len().max(1) as f64;
        let mut mean = [0.0; FEATURE_COUNT];
        let mut scale = [1.0; FEATURE_COUNT];

        for col in 0..FEATURE_COUNT {
            mean[col] = rows.iter().map(|r| r[col]).sum::<f64>() / n;
            let variance = rows.iter().map(|r| (r[col] - mean[col]).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            if std > f64::EPSILON {
                scale[col] = std;
            }
        }

        Self { mean, scale }
    }

    pub fn transform(&self, row: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for col in 0..FEATURE_COUNT {
            out[col] = (row[col] - self.mean[col]) / self.scale[col];
        }
        out
    }

    pub fn transform_all(&self, rows: &[FeatureVector]) -> Vec<FeatureVector> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}
