//! Short-horizon trend forecasting: one single-input linear regressor per
//! tracked metric, rolled forward a day at a time.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::models::{
    Anomaly, ForecastDay, ForecastResult, Metric, MetricRow, WellbeingRecord, SCALE_MAX, SCALE_MIN,
};
use crate::registry::ModelRegistry;

pub const DEFAULT_WINDOW: usize = 14;

const METRICS: usize = Metric::ALL.len();

/// Per-column min-max normalisation to [0, 1]. A constant column keeps a
/// range of 1 so it maps to 0 and back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinMaxScaler {
    mins: [f64; METRICS],
    ranges: [f64; METRICS],
}

impl MinMaxScaler {
    pub fn fit(rows: &[MetricRow]) -> Self {
        let mut mins = [f64::INFINITY; METRICS];
        let mut maxs = [f64::NEG_INFINITY; METRICS];
        for row in rows {
            for column in 0..METRICS {
                mins[column] = mins[column].min(row.values[column]);
                maxs[column] = maxs[column].max(row.values[column]);
            }
        }

        let mut ranges = [1.0; METRICS];
        for column in 0..METRICS {
            if !mins[column].is_finite() {
                mins[column] = 0.0;
                continue;
            }
            let range = maxs[column] - mins[column];
            if range > f64::EPSILON {
                ranges[column] = range;
            }
        }

        Self { mins, ranges }
    }

    pub fn transform(&self, row: &MetricRow) -> [f64; METRICS] {
        let mut out = [0.0; METRICS];
        for metric in Metric::ALL {
            let column = metric.index();
            out[column] = (row.get(metric) - self.mins[column]) / self.ranges[column];
        }
        out
    }

    pub fn inverse(&self, column: usize, value: f64) -> f64 {
        value * self.ranges[column] + self.mins[column]
    }
}

/// Ordinary least squares on one input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearRegression {
    pub fn fit(xs: &[f64], ys: &[f64]) -> Self {
        let n = xs.len().min(ys.len());
        if n == 0 {
            return Self {
                slope: 0.0,
                intercept: 0.0,
            };
        }
        let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
        let mean_y = ys[..n].iter().sum::<f64>() / n as f64;
        let (mut covariance, mut variance) = (0.0, 0.0);
        for (x, y) in xs[..n].iter().zip(&ys[..n]) {
            covariance += (x - mean_x) * (y - mean_y);
            variance += (x - mean_x).powi(2);
        }
        let slope = if variance > f64::EPSILON {
            covariance / variance
        } else {
            0.0
        };
        Self {
            slope,
            intercept: mean_y - slope * mean_x,
        }
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendForecaster {
    window: usize,
    scaler: MinMaxScaler,
    regressors: [LinearRegression; METRICS],
}

impl TrendForecaster {
    /// Fit on a chronologically ordered table. Returns `None` when there are
    /// fewer than `window + 1` rows.
    pub fn fit(history: &[MetricRow], window: usize) -> Option<Self> {
        if window == 0 || history.len() < window + 1 {
            return None;
        }

        let scaler = MinMaxScaler::fit(history);
        let scaled: Vec<[f64; METRICS]> = history.iter().map(|row| scaler.transform(row)).collect();

        let regressors = Metric::ALL.map(|metric| {
            let column = metric.index();
            let pairs = scaled.len() - window;
            let xs: Vec<f64> = scaled[..pairs].iter().map(|row| row[column]).collect();
            let ys: Vec<f64> = scaled[window..].iter().map(|row| row[column]).collect();
            LinearRegression::fit(&xs, &ys)
        });

        Some(Self {
            window,
            scaler,
            regressors,
        })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn predict(
        &self,
        recent: &[MetricRow],
        horizon: usize,
    ) -> Result<Vec<ForecastDay>, PipelineError> {
        if horizon == 0 {
            return Err(PipelineError::Validation(
                "forecast horizon must be at least one day".to_string(),
            ));
        }
        if recent.len() < self.window {
            return Err(PipelineError::insufficient(
                "forecast",
                self.window,
                recent.len(),
            ));
        }

        let mut rolling: Vec<[f64; METRICS]> = recent[recent.len() - self.window..]
            .iter()
            .map(|row| self.scaler.transform(row))
            .collect();
        let mut predicted = Vec::with_capacity(horizon);

        for _ in 0..horizon {
            let last = rolling[rolling.len() - 1];
            let mut next = [0.0; METRICS];
            for (column, regressor) in self.regressors.iter().enumerate() {
                next[column] = regressor.predict(last[column]);
            }
            predicted.push(next);
            rolling.remove(0);
            rolling.push(next);
        }

        let days = predicted
            .iter()
            .enumerate()
            .map(|(offset, scaled)| {
                let value = |metric: Metric| {
                    let column = metric.index();
                    self.scaler
                        .inverse(column, scaled[column])
                        .clamp(SCALE_MIN as f64, SCALE_MAX as f64)
                        .round_ties_even() as i32
                };
                ForecastDay {
                    day: offset as u32 + 1,
                    mood: value(Metric::Mood),
                    energy: value(Metric::Energy),
                    stress: value(Metric::Stress),
                    sleep_quality: value(Metric::SleepQuality),
                }
            })
            .collect();

        Ok(days)
    }

    /// Placeholder: no anomaly rule is defined, so nothing is reported.
    pub fn detect_anomalies(&self, _history: &[MetricRow]) -> Vec<Anomaly> {
        Vec::new()
    }
}

/// Forecast the next `horizon_days` of a user's metrics from their history.
pub fn forecast(
    registry: &ModelRegistry,
    records: &[WellbeingRecord],
    horizon_days: usize,
) -> Result<ForecastResult, PipelineError> {
    let forecaster = registry
        .forecaster()
        .ok_or(PipelineError::ModelNotReady("trend forecaster"))?;

    let mut ordered: Vec<&WellbeingRecord> = records.iter().collect();
    ordered.sort_by_key(|record| record.recorded_at());
    let rows: Vec<MetricRow> = ordered.into_iter().map(MetricRow::from).collect();

    let days = forecaster.predict(&rows, horizon_days)?;
    let anomalies = forecaster.detect_anomalies(&rows);
    debug!(
        horizon_days,
        history = rows.len(),
        "forecast produced"
    );

    Ok(ForecastResult { days, anomalies })
}

pub(crate) fn log_untrained(rows: usize, required: usize) {
    info!(
        rows,
        required, "not enough history to train the trend forecaster, leaving it untrained"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tests::record;
    use crate::models::ForecasterStatus;
    use proptest::prelude::*;

    fn steady(n: usize) -> Vec<MetricRow> {
        (0..n)
            .map(|i| MetricRow::new(5.0, 6.0 + (i % 2) as f64, 4.0, 7.0))
            .collect()
    }

    #[test]
    fn regression_recovers_a_line() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.0, 5.0, 7.0];
        let model = LinearRegression::fit(&xs, &ys);
        assert!((model.slope - 2.0).abs() < 1e-12);
        assert!((model.intercept - 1.0).abs() < 1e-12);
        assert!((model.predict(10.0) - 21.0).abs() < 1e-12);
    }

    #[test]
    fn constant_input_gives_flat_regression() {
        let model = LinearRegression::fit(&[0.4, 0.4, 0.4], &[0.1, 0.2, 0.3]);
        assert_eq!(model.slope, 0.0);
        assert!((model.intercept - 0.2).abs() < 1e-12);
    }

    #[test]
    fn scaler_round_trips_through_inverse() {
        let rows = vec![MetricRow::new(2.0, 5.0, 1.0, 3.0), MetricRow::new(8.0, 5.0, 9.0, 7.0)];
        let scaler = MinMaxScaler::fit(&rows);
        let scaled = scaler.transform(&MetricRow::new(5.0, 5.0, 5.0, 5.0));
        assert_eq!(scaled, [0.5, 0.0, 0.5, 0.5]);
        assert_eq!(scaler.inverse(0, 0.5), 5.0);
        assert_eq!(scaler.inverse(1, 0.0), 5.0);
    }

    #[test]
    fn half_way_forecasts_round_to_even() {
        let history = vec![
            MetricRow::new(6.0, 5.0, 3.0, 7.0),
            MetricRow::new(6.0, 5.0, 3.0, 7.0),
            MetricRow::new(6.0, 5.0, 3.0, 7.0),
            MetricRow::new(7.0, 5.0, 4.0, 7.0),
        ];
        let model = TrendForecaster::fit(&history, 2).unwrap();
        let days = model.predict(&history, 1).unwrap();
        assert_eq!(days[0].mood, 6);
        assert_eq!(days[0].stress, 4);
        assert_eq!(days[0].energy, 5);
    }

    #[test]
    fn fit_requires_window_plus_one_rows() {
        assert!(TrendForecaster::fit(&steady(14), 14).is_none());
        assert!(TrendForecaster::fit(&steady(15), 14).is_some());
    }

    #[test]
    fn constant_metrics_forecast_flat() {
        let model = TrendForecaster::fit(&steady(30), 14).unwrap();
        let days = model.predict(&steady(14), 5).unwrap();
        assert_eq!(days.len(), 5);
        for (i, day) in days.iter().enumerate() {
            assert_eq!(day.day, i as u32 + 1);
            assert_eq!(day.mood, 5);
            assert_eq!(day.stress, 4);
            assert_eq!(day.sleep_quality, 7);
        }
    }

    #[test]
    fn rising_trend_is_clipped_to_scale() {
        let history: Vec<MetricRow> = (0..20)
            .map(|i| {
                let v = 1.0 + i as f64 * 9.0 / 19.0;
                MetricRow::new(v, v, 11.0 - v, v)
            })
            .collect();
        let model = TrendForecaster::fit(&history, 5).unwrap();
        let days = model.predict(&history[15..], 10).unwrap();
        assert_eq!(days.len(), 10);
        assert_eq!(days[9].mood, 10);
        assert_eq!(days[9].stress, 1);
        assert!(days.iter().all(|d| (1..=10).contains(&d.mood)));
    }

    #[test]
    fn predict_rejects_short_history_and_zero_horizon() {
        let model = TrendForecaster::fit(&steady(30), 14).unwrap();
        assert!(matches!(
            model.predict(&steady(13), 3),
            Err(PipelineError::InsufficientData { required: 14, actual: 13, .. })
        ));
        assert!(matches!(
            model.predict(&steady(14), 0),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn untrained_registry_reports_not_ready() {
        let registry = ModelRegistry::new();
        let records: Vec<WellbeingRecord> =
            (0..30).map(|day| record(day, 5, 5, 5, 5, 8.0)).collect();
        assert_eq!(
            forecast(&registry, &records, 7).unwrap_err(),
            PipelineError::ModelNotReady("trend forecaster")
        );
    }

    #[test]
    fn anomaly_detection_is_empty() {
        let model = TrendForecaster::fit(&steady(30), 14).unwrap();
        assert!(model.detect_anomalies(&steady(30)).is_empty());
    }

    #[test]
    fn registry_forecast_uses_trained_model() {
        let registry = ModelRegistry::new();
        let status = registry.train_forecaster(&steady(30), 14);
        assert_eq!(status, ForecasterStatus::Trained { rows: 30, window: 14 });

        let records: Vec<WellbeingRecord> =
            (0..20).map(|day| record(day, 5, 6, 4, 7, 8.0)).collect();
        let result = forecast(&registry, &records, 7).unwrap();
        assert_eq!(result.days.len(), 7);
        assert!(result.anomalies.is_empty());
    }

    proptest! {
        #[test]
        fn forecasts_have_horizon_entries_on_scale(
            values in proptest::collection::vec(
                (1.0f64..=10.0, 1.0f64..=10.0, 1.0f64..=10.0, 1.0f64..=10.0),
                15..45,
            ),
            horizon in 1usize..30,
        ) {
            let rows: Vec<MetricRow> = values
                .iter()
                .map(|&(m, e, s, q)| MetricRow::new(m, e, s, q))
                .collect();
            let model = TrendForecaster::fit(&rows, 14).unwrap();
            let days = model.predict(&rows, horizon).unwrap();
            prop_assert_eq!(days.len(), horizon);
            for day in &days {
                for value in [day.mood, day.energy, day.stress, day.sleep_quality] {
                    prop_assert!((1..=10).contains(&value));
                }
            }
        }
    }
}
