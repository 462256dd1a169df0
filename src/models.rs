use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::features::FeatureVector;

pub const SCALE_MIN: i32 = 1;
pub const SCALE_MAX: i32 = 10;
pub const MAX_WORK_HOURS: f64 = 24.0;

/// One daily check-in. Fields are private so every instance has passed
/// [`WellbeingRecord::new`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WellbeingRecord {
    mood: i32,
    energy: i32,
    stress: i32,
    sleep_quality: i32,
    work_hours: f64,
    recorded_at: DateTime<Utc>,
}

impl WellbeingRecord {
    pub fn new(
        mood: i32,
        energy: i32,
        stress: i32,
        sleep_quality: i32,
        work_hours: f64,
        recorded_at: DateTime<Utc>,
    ) -> Result<Self, PipelineError> {
        check_scale("mood", mood)?;
        check_scale("energy", energy)?;
        check_scale("stress", stress)?;
        check_scale("sleep_quality", sleep_quality)?;
        if !work_hours.is_finite() || !(0.0..=MAX_WORK_HOURS).contains(&work_hours) {
            return Err(PipelineError::Validation(format!(
                "work_hours must be within [0, {MAX_WORK_HOURS}], got {work_hours}"
            )));
        }

        Ok(Self {
            mood,
            energy,
            stress,
            sleep_quality,
            work_hours,
            recorded_at,
        })
    }

    pub fn mood(&self) -> i32 {
        self.mood
    }

    pub fn energy(&self) -> i32 {
        self.energy
    }

    pub fn stress(&self) -> i32 {
        self.stress
    }

    pub fn sleep_quality(&self) -> i32 {
        self.sleep_quality
    }

    pub fn work_hours(&self) -> f64 {
        self.work_hours
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// Weighted 0-10 wellbeing score with stress inverted.
    pub fn overall_score(&self) -> f64 {
        let score = self.mood as f64 * 0.25
            + self.energy as f64 * 0.20
            + (11 - self.stress) as f64 * 0.25
            + self.sleep_quality as f64 * 0.30;
        (score * 100.0).round() / 100.0
    }

    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Mood => self.mood as f64,
            Metric::Energy => self.energy as f64,
            Metric::Stress => self.stress as f64,
            Metric::SleepQuality => self.sleep_quality as f64,
        }
    }
}

fn check_scale(field: &str, value: i32) -> Result<(), PipelineError> {
    if (SCALE_MIN..=SCALE_MAX).contains(&value) {
        Ok(())
    } else {
        Err(PipelineError::Validation(format!(
            "{field} must be within [{SCALE_MIN}, {SCALE_MAX}], got {value}"
        )))
    }
}

#[derive(Debug, Clone)]
pub struct StoredCheckin {
    pub id: Uuid,
    pub user_id: Uuid,
    pub record: WellbeingRecord,
}

/// A stored check-in as shown in a user's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub mood: i32,
    pub energy: i32,
    pub stress: i32,
    pub sleep_quality: i32,
    pub work_hours: f64,
    pub overall_score: f64,
}

impl From<&StoredCheckin> for HistoryEntry {
    fn from(checkin: &StoredCheckin) -> Self {
        let record = &checkin.record;
        HistoryEntry {
            id: checkin.id,
            recorded_at: record.recorded_at(),
            mood: record.mood(),
            energy: record.energy(),
            stress: record.stress(),
            sleep_quality: record.sleep_quality(),
            work_hours: record.work_hours(),
            overall_score: record.overall_score(),
        }
    }
}

/// Newest first.
pub fn history(checkins: &[StoredCheckin]) -> Vec<HistoryEntry> {
    let mut entries: Vec<HistoryEntry> = checkins.iter().map(HistoryEntry::from).collect();
    entries.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
    entries
}

/// Metrics tracked by the trend forecaster, in column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Mood,
    Energy,
    Stress,
    SleepQuality,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Mood,
        Metric::Energy,
        Metric::Stress,
        Metric::SleepQuality,
    ];

    pub fn index(self) -> usize {
        match self {
            Metric::Mood => 0,
            Metric::Energy => 1,
            Metric::Stress => 2,
            Metric::SleepQuality => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Metric::Mood => "mood",
            Metric::Energy => "energy",
            Metric::Stress => "stress",
            Metric::SleepQuality => "sleep_quality",
        }
    }
}

/// One row of the forecaster's table: the four tracked metrics for a day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricRow {
    pub values: [f64; 4],
}

impl MetricRow {
    pub fn new(mood: f64, energy: f64, stress: f64, sleep_quality: f64) -> Self {
        Self {
            values: [mood, energy, stress, sleep_quality],
        }
    }

    pub fn get(&self, metric: Metric) -> f64 {
        self.values[metric.index()]
    }
}

impl From<&WellbeingRecord> for MetricRow {
    fn from(record: &WellbeingRecord) -> Self {
        MetricRow {
            values: Metric::ALL.map(|metric| record.metric(metric)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn from_probability(probability: f64) -> Self {
        if probability < 0.3 {
            RiskTier::Low
        } else if probability < 0.6 {
            RiskTier::Medium
        } else {
            RiskTier::High
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub probability: f64,
    pub tier: RiskTier,
    pub recommendations: Vec<String>,
    pub confidence: f64,
    /// False when no classifier was available and the neutral default was used.
    pub model_ready: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastDay {
    pub day: u32,
    pub mood: i32,
    pub energy: i32,
    pub stress: i32,
    pub sleep_quality: i32,
}

/// Placeholder shape for anomaly reports; detection currently yields none.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub day: usize,
    pub metric: Metric,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastResult {
    pub days: Vec<ForecastDay>,
    pub anomalies: Vec<Anomaly>,
}

#[derive(Debug, Clone)]
pub struct LabeledExample {
    pub features: FeatureVector,
    pub label: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifierMetrics {
    pub random_forest_auc: f64,
    pub gradient_boosting_auc: f64,
    pub ensemble_auc: f64,
    pub train_size: usize,
    pub test_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecasterStatus {
    Trained { rows: usize, window: usize },
    Untrained { rows: usize, required: usize },
}

#[derive(Debug, Clone)]
pub struct LabelRecord {
    pub user_id: Uuid,
    pub as_of: NaiveDate,
    pub label: bool,
}
