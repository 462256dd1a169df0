//! Feature engineering over a user's trailing check-in history.
//!
//! Windows are counted in records, not calendar days: the "7-day" window is
//! the last seven check-ins.

use crate::error::PipelineError;
use crate::models::WellbeingRecord;

pub const SHORT_WINDOW: usize = 7;
pub const TREND_WINDOW: usize = 14;
pub const LONG_WINDOW: usize = 30;

pub const FEATURE_COUNT: usize = 16;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "avg_mood_7d",
    "avg_energy_7d",
    "avg_stress_7d",
    "avg_sleep_7d",
    "avg_work_hours_7d",
    "std_mood_7d",
    "std_energy_7d",
    "std_stress_7d",
    "mood_trend",
    "energy_trend",
    "stress_trend",
    "avg_mood_30d",
    "avg_stress_30d",
    "avg_work_hours_30d",
    "risk_composite",
    "overtime_risk",
];

/// Built only through [`FeatureVector::from_array`], which rejects
/// non-finite values.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    avg_mood_7d: f64,
    avg_energy_7d: f64,
    avg_stress_7d: f64,
    avg_sleep_7d: f64,
    avg_work_hours_7d: f64,
    std_mood_7d: f64,
    std_energy_7d: f64,
    std_stress_7d: f64,
    mood_trend: f64,
    energy_trend: f64,
    stress_trend: f64,
    avg_mood_30d: f64,
    avg_stress_30d: f64,
    avg_work_hours_30d: f64,
    risk_composite: f64,
    overtime_risk: f64,
}

impl FeatureVector {
    /// Values in `FEATURE_NAMES` order.
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.avg_mood_7d,
            self.avg_energy_7d,
            self.avg_stress_7d,
            self.avg_sleep_7d,
            self.avg_work_hours_7d,
            self.std_mood_7d,
            self.std_energy_7d,
            self.std_stress_7d,
            self.mood_trend,
            self.energy_trend,
            self.stress_trend,
            self.avg_mood_30d,
            self.avg_stress_30d,
            self.avg_work_hours_30d,
            self.risk_composite,
            self.overtime_risk,
        ]
    }

    /// Build from values in `FEATURE_NAMES` order.
    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Result<Self, PipelineError> {
        if let Some(position) = values.iter().position(|value| !value.is_finite()) {
            return Err(PipelineError::Validation(format!(
                "feature {} is not finite",
                FEATURE_NAMES[position]
            )));
        }
        Ok(Self {
            avg_mood_7d: values[0],
            avg_energy_7d: values[1],
            avg_stress_7d: values[2],
            avg_sleep_7d: values[3],
            avg_work_hours_7d: values[4],
            std_mood_7d: values[5],
            std_energy_7d: values[6],
            std_stress_7d: values[7],
            mood_trend: values[8],
            energy_trend: values[9],
            stress_trend: values[10],
            avg_mood_30d: values[11],
            avg_stress_30d: values[12],
            avg_work_hours_30d: values[13],
            risk_composite: values[14],
            overtime_risk: values[15],
        })
    }

    pub fn avg_mood_7d(&self) -> f64 {
        self.avg_mood_7d
    }

    pub fn avg_energy_7d(&self) -> f64 {
        self.avg_energy_7d
    }

    pub fn avg_stress_7d(&self) -> f64 {
        self.avg_stress_7d
    }

    pub fn avg_sleep_7d(&self) -> f64 {
        self.avg_sleep_7d
    }

    pub fn avg_work_hours_7d(&self) -> f64 {
        self.avg_work_hours_7d
    }
}

pub fn engineer_features(records: &[WellbeingRecord]) -> Result<FeatureVector, PipelineError> {
    if records.is_empty() {
        return Err(PipelineError::insufficient("feature engineering", 1, 0));
    }

    let mut ordered: Vec<&WellbeingRecord> = records.iter().collect();
    ordered.sort_by_key(|record| record.recorded_at());

    let recent = tail(&ordered, SHORT_WINDOW);
    let mood: Vec<f64> = recent.iter().map(|r| r.mood() as f64).collect();
    let energy: Vec<f64> = recent.iter().map(|r| r.energy() as f64).collect();
    let stress: Vec<f64> = recent.iter().map(|r| r.stress() as f64).collect();
    let sleep: Vec<f64> = recent.iter().map(|r| r.sleep_quality() as f64).collect();
    let hours: Vec<f64> = recent.iter().map(|r| r.work_hours()).collect();

    let avg_mood_7d = mean(&mood);
    let avg_energy_7d = mean(&energy);
    let avg_stress_7d = mean(&stress);
    let avg_sleep_7d = mean(&sleep);
    let avg_work_hours_7d = mean(&hours);

    let (mood_trend, energy_trend, stress_trend) = if ordered.len() >= TREND_WINDOW {
        let previous = &tail(&ordered, TREND_WINDOW)[..SHORT_WINDOW];
        (
            avg_mood_7d - mean_of(previous, |r| r.mood() as f64),
            avg_energy_7d - mean_of(previous, |r| r.energy() as f64),
            avg_stress_7d - mean_of(previous, |r| r.stress() as f64),
        )
    } else {
        (0.0, 0.0, 0.0)
    };

    let (avg_mood_30d, avg_stress_30d, avg_work_hours_30d) = if ordered.len() >= LONG_WINDOW {
        let long_term = tail(&ordered, LONG_WINDOW);
        (
            mean_of(long_term, |r| r.mood() as f64),
            mean_of(long_term, |r| r.stress() as f64),
            mean_of(long_term, |r| r.work_hours()),
        )
    } else {
        (avg_mood_7d, avg_stress_7d, avg_work_hours_7d)
    };

    FeatureVector::from_array([
        avg_mood_7d,
        avg_energy_7d,
        avg_stress_7d,
        avg_sleep_7d,
        avg_work_hours_7d,
        sample_std(&mood),
        sample_std(&energy),
        sample_std(&stress),
        mood_trend,
        energy_trend,
        stress_trend,
        avg_mood_30d,
        avg_stress_30d,
        avg_work_hours_30d,
        risk_composite(avg_mood_7d, avg_energy_7d, avg_stress_7d, avg_sleep_7d),
        overtime_risk(avg_work_hours_7d),
    ])
}

pub fn risk_composite(mood: f64, energy: f64, stress: f64, sleep: f64) -> f64 {
    (10.0 - mood) * 0.3 + (10.0 - energy) * 0.2 + stress * 0.3 + (10.0 - sleep) * 0.2
}

pub fn overtime_risk(work_hours: f64) -> f64 {
    (work_hours - 8.0).max(0.0) / 4.0
}

fn tail<'a, T>(items: &'a [T], n: usize) -> &'a [T] {
    &items[items.len().saturating_sub(n)..]
}

fn mean_of(records: &[&WellbeingRecord], value: impl Fn(&WellbeingRecord) -> f64) -> f64 {
    let values: Vec<f64> = records.iter().map(|r| value(*r)).collect();
    mean(&values)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; fewer than two values yields 0.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    pub(crate) fn record(
        day: i64,
        mood: i32,
        energy: i32,
        stress: i32,
        sleep: i32,
        hours: f64,
    ) -> WellbeingRecord {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        WellbeingRecord::new(mood, energy, stress, sleep, hours, start + Duration::days(day))
            .unwrap()
    }

    #[test]
    fn strained_week_scores_match_expected_values() {
        let records: Vec<WellbeingRecord> =
            (0..7).map(|day| record(day, 3, 3, 9, 4, 10.0)).collect();
        let features = engineer_features(&records).unwrap();

        assert!((features.risk_composite - 7.4).abs() < 1e-9);
        assert!((features.overtime_risk - 0.5).abs() < 1e-9);
        assert_eq!(features.std_mood_7d, 0.0);
        assert_eq!(features.avg_mood_30d, features.avg_mood_7d);
        assert_eq!(features.avg_work_hours_30d, 10.0);
    }

    #[test]
    fn single_record_has_zero_deviation() {
        let features = engineer_features(&[record(0, 6, 5, 4, 7, 8.0)]).unwrap();
        assert_eq!(features.std_mood_7d, 0.0);
        assert_eq!(features.std_energy_7d, 0.0);
        assert_eq!(features.std_stress_7d, 0.0);
        assert_eq!(features.avg_mood_7d, 6.0);
    }

    #[test]
    fn trends_are_zero_below_fourteen_records() {
        let records: Vec<WellbeingRecord> = (0..13)
            .map(|day| record(day, 1 + (day % 10) as i32, 5, 10 - (day % 9) as i32, 6, 8.0))
            .collect();
        let features = engineer_features(&records).unwrap();
        assert_eq!(features.mood_trend, 0.0);
        assert_eq!(features.energy_trend, 0.0);
        assert_eq!(features.stress_trend, 0.0);
    }

    #[test]
    fn trend_compares_last_week_with_the_one_before() {
        let mut records: Vec<WellbeingRecord> =
            (0..7).map(|day| record(day, 8, 7, 3, 7, 8.0)).collect();
        records.extend((7..14).map(|day| record(day, 5, 4, 6, 7, 8.0)));
        let features = engineer_features(&records).unwrap();
        assert!((features.mood_trend + 3.0).abs() < 1e-9);
        assert!((features.energy_trend + 3.0).abs() < 1e-9);
        assert!((features.stress_trend - 3.0).abs() < 1e-9);
    }

    #[test]
    fn unordered_input_is_sorted_by_timestamp() {
        let mut records: Vec<WellbeingRecord> =
            (0..7).map(|day| record(day, 9, 9, 1, 9, 8.0)).collect();
        records.extend((7..14).map(|day| record(day, 2, 2, 9, 2, 11.0)));
        records.reverse();
        let features = engineer_features(&records).unwrap();
        assert_eq!(features.avg_mood_7d, 2.0);
        assert!((features.mood_trend + 7.0).abs() < 1e-9);
    }

    #[test]
    fn long_window_uses_last_thirty_records() {
        let mut records: Vec<WellbeingRecord> =
            (0..10).map(|day| record(day, 1, 5, 10, 5, 12.0)).collect();
        records.extend((10..40).map(|day| record(day, 6, 5, 4, 5, 8.0)));
        let features = engineer_features(&records).unwrap();
        assert_eq!(features.avg_mood_30d, 6.0);
        assert_eq!(features.avg_stress_30d, 4.0);
        assert_eq!(features.avg_work_hours_30d, 8.0);
    }

    #[test]
    fn non_finite_values_are_rejected_at_construction() {
        let mut values = [1.0; FEATURE_COUNT];
        assert_eq!(FeatureVector::from_array(values).unwrap().to_array(), values);

        values[8] = f64::NAN;
        assert_eq!(
            FeatureVector::from_array(values).unwrap_err(),
            PipelineError::Validation("feature mood_trend is not finite".to_string())
        );
        values[8] = 0.0;
        values[15] = f64::INFINITY;
        assert!(FeatureVector::from_array(values).is_err());
    }

    #[test]
    fn empty_history_is_rejected() {
        assert!(matches!(
            engineer_features(&[]),
            Err(PipelineError::InsufficientData { .. })
        ));
    }

    #[test]
    fn overtime_risk_is_floored_at_zero() {
        assert_eq!(overtime_risk(6.0), 0.0);
        assert_eq!(overtime_risk(12.0), 1.0);
    }

    proptest! {
        #[test]
        fn features_are_finite_and_means_stay_on_scale(
            rows in proptest::collection::vec(
                (1i32..=10, 1i32..=10, 1i32..=10, 1i32..=10, 0.0f64..=24.0),
                7..60,
            )
        ) {
            let records: Vec<WellbeingRecord> = rows
                .iter()
                .enumerate()
                .map(|(day, &(m, e, s, q, h))| record(day as i64, m, e, s, q, h))
                .collect();
            let features = engineer_features(&records).unwrap();

            prop_assert!(features.to_array().iter().all(|v| v.is_finite()));
            for value in [
                features.avg_mood_7d,
                features.avg_energy_7d,
                features.avg_stress_7d,
                features.avg_sleep_7d,
                features.avg_mood_30d,
                features.avg_stress_30d,
            ] {
                prop_assert!((1.0..=10.0).contains(&value));
            }
        }
    }
}
