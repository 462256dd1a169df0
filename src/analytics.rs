use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::PipelineError;
use crate::features::{mean, sample_std};
use crate::models::{StoredCheckin, WellbeingRecord};
use crate::recommend::{self, OrganizationSignals};

pub const MIN_ORGANIZATION_RECORDS: usize = 10;
pub const MIN_MODEL_RECORDS: usize = 30;
const TREND_WEEKS: usize = 4;
const HIGH_STRESS: i32 = 8;
const LOW_MOOD: i32 = 4;
const OVERTIME_HOURS: f64 = 9.0;
const SIGNIFICANCE: f64 = 0.05;

pub const VARIABLES: [&str; 5] = ["mood", "energy", "stress", "sleep_quality", "work_hours"];

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub total_records: usize,
    pub unique_users: usize,
    pub avg_mood: f64,
    pub avg_energy: f64,
    pub avg_stress: f64,
    pub avg_sleep: f64,
    pub avg_work_hours: f64,
    pub sd_mood: f64,
    pub sd_stress: f64,
    pub p25_stress: f64,
    pub p75_stress: f64,
    pub high_stress_pct: f64,
    pub low_mood_pct: f64,
    pub overtime_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OvertimeStressTest {
    pub t_statistic: f64,
    pub p_value: f64,
    pub significant: bool,
    pub mean_overtime: f64,
    pub mean_normal: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyTrend {
    pub week_start: NaiveDate,
    pub records: usize,
    pub avg_mood: f64,
    pub avg_stress: f64,
    pub avg_energy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    InsufficientData,
}

impl TrendDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            TrendDirection::Improving => "improving",
            TrendDirection::Declining => "declining",
            TrendDirection::InsufficientData => "insufficient data",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrendSummary {
    pub mood_delta: f64,
    pub stress_delta: f64,
    pub energy_delta: f64,
    pub direction: TrendDirection,
    pub weeks: Vec<WeeklyTrend>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoodModel {
    pub r_squared: f64,
    pub adj_r_squared: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutlierCounts {
    pub stress: usize,
    pub work_hours: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganizationAnalytics {
    pub summary: Summary,
    /// Pearson correlations in `VARIABLES` order; `None` where a column is constant.
    pub correlations: [[Option<f64>; 5]; 5],
    pub overtime_stress: Option<OvertimeStressTest>,
    pub trends: TrendSummary,
    pub mood_model: Option<MoodModel>,
    pub outliers: OutlierCounts,
    pub recommendations: Vec<String>,
}

pub fn organization_analytics(
    checkins: &[StoredCheckin],
) -> Result<OrganizationAnalytics, PipelineError> {
    if checkins.len() < MIN_ORGANIZATION_RECORDS {
        return Err(PipelineError::insufficient(
            "organisational analytics",
            MIN_ORGANIZATION_RECORDS,
            checkins.len(),
        ));
    }

    let records: Vec<&WellbeingRecord> = checkins.iter().map(|c| &c.record).collect();
    let columns = columns(&records);
    let summary = summarize(checkins, &columns);
    let trends = weekly_trends(&records);

    let signals = OrganizationSignals {
        high_stress_pct: summary.high_stress_pct,
        overtime_pct: summary.overtime_pct,
        avg_sleep: round_to(summary.avg_sleep, 2),
        mood_declining: trends.direction == TrendDirection::Declining,
    };

    let mut correlations = [[None; 5]; 5];
    for (i, row) in correlations.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = pearson(&columns[i], &columns[j]);
        }
    }

    Ok(OrganizationAnalytics {
        correlations,
        overtime_stress: overtime_stress_test(&records),
        mood_model: mood_model(&columns),
        outliers: OutlierCounts {
            stress: iqr_outliers(&columns[2]),
            work_hours: iqr_outliers(&columns[4]),
        },
        recommendations: recommend::organization(&signals),
        summary,
        trends,
    })
}

fn columns(records: &[&WellbeingRecord]) -> [Vec<f64>; 5] {
    [
        records.iter().map(|r| r.mood() as f64).collect(),
        records.iter().map(|r| r.energy() as f64).collect(),
        records.iter().map(|r| r.stress() as f64).collect(),
        records.iter().map(|r| r.sleep_quality() as f64).collect(),
        records.iter().map(|r| r.work_hours()).collect(),
    ]
}

fn summarize(checkins: &[StoredCheckin], columns: &[Vec<f64>; 5]) -> Summary {
    let n = checkins.len() as f64;
    let share = |count: usize| round_to(count as f64 / n * 100.0, 1);
    let unique_users: HashSet<_> = checkins.iter().map(|c| c.user_id).collect();

    Summary {
        total_records: checkins.len(),
        unique_users: unique_users.len(),
        avg_mood: mean(&columns[0]),
        avg_energy: mean(&columns[1]),
        avg_stress: mean(&columns[2]),
        avg_sleep: mean(&columns[3]),
        avg_work_hours: mean(&columns[4]),
        sd_mood: sample_std(&columns[0]),
        sd_stress: sample_std(&columns[2]),
        p25_stress: percentile(&columns[2], 0.25),
        p75_stress: percentile(&columns[2], 0.75),
        high_stress_pct: share(
            checkins
                .iter()
                .filter(|c| c.record.stress() >= HIGH_STRESS)
                .count(),
        ),
        low_mood_pct: share(checkins.iter().filter(|c| c.record.mood() <= LOW_MOOD).count()),
        overtime_pct: share(
            checkins
                .iter()
                .filter(|c| c.record.work_hours() > OVERTIME_HOURS)
                .count(),
        ),
    }
}

/// Linear-interpolated percentile, `q` in [0, 1].
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (mean_x, mean_y) = (mean(&xs[..n]), mean(&ys[..n]));
    let (mut covariance, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        covariance += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return None;
    }
    Some(covariance / (var_x.sqrt() * var_y.sqrt()))
}

/// Pooled-variance two-sample t-test of stress on overtime vs normal days.
fn overtime_stress_test(records: &[&WellbeingRecord]) -> Option<OvertimeStressTest> {
    let (overtime, normal): (Vec<&WellbeingRecord>, Vec<&WellbeingRecord>) = records
        .iter()
        .copied()
        .partition(|r| r.work_hours() > OVERTIME_HOURS);
    let overtime: Vec<f64> = overtime.iter().map(|r| r.stress() as f64).collect();
    let normal: Vec<f64> = normal.iter().map(|r| r.stress() as f64).collect();

    let (n1, n2) = (overtime.len() as f64, normal.len() as f64);
    if overtime.len() < 2 || normal.len() < 2 {
        return None;
    }
    let df = n1 + n2 - 2.0;

    let (mean_overtime, mean_normal) = (mean(&overtime), mean(&normal));
    let ss = |values: &[f64], m: f64| values.iter().map(|v| (v - m).powi(2)).sum::<f64>();
    let pooled = (ss(&overtime, mean_overtime) + ss(&normal, mean_normal)) / df;
    let standard_error = (pooled * (1.0 / n1 + 1.0 / n2)).sqrt();
    if standard_error <= f64::EPSILON {
        return None;
    }

    let t_statistic = (mean_overtime - mean_normal) / standard_error;
    let distribution = StudentsT::new(0.0, 1.0, df).ok()?;
    let p_value = (2.0 * (1.0 - distribution.cdf(t_statistic.abs()))).clamp(0.0, 1.0);

    Some(OvertimeStressTest {
        t_statistic,
        p_value,
        significant: p_value < SIGNIFICANCE,
        mean_overtime,
        mean_normal,
    })
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn weekly_trends(records: &[&WellbeingRecord]) -> TrendSummary {
    let mut buckets: BTreeMap<NaiveDate, Vec<&WellbeingRecord>> = BTreeMap::new();
    for record in records {
        buckets
            .entry(week_start(record.recorded_at().date_naive()))
            .or_default()
            .push(*record);
    }

    let weeks: Vec<WeeklyTrend> = buckets
        .into_iter()
        .map(|(week_start, members)| {
            let avg = |value: fn(&WellbeingRecord) -> i32| {
                round_to(
                    members.iter().map(|r| value(r) as f64).sum::<f64>() / members.len() as f64,
                    2,
                )
            };
            WeeklyTrend {
                week_start,
                records: members.len(),
                avg_mood: avg(WellbeingRecord::mood),
                avg_stress: avg(WellbeingRecord::stress),
                avg_energy: avg(WellbeingRecord::energy),
            }
        })
        .collect();

    if weeks.len() < TREND_WEEKS * 2 {
        return TrendSummary {
            mood_delta: 0.0,
            stress_delta: 0.0,
            energy_delta: 0.0,
            direction: TrendDirection::InsufficientData,
            weeks,
        };
    }

    let recent = &weeks[weeks.len() - TREND_WEEKS..];
    let previous = &weeks[weeks.len() - TREND_WEEKS * 2..weeks.len() - TREND_WEEKS];
    let window_mean = |window: &[WeeklyTrend], value: fn(&WeeklyTrend) -> f64| {
        window.iter().map(value).sum::<f64>() / window.len() as f64
    };
    let recent_mood = window_mean(recent, |w| w.avg_mood);
    let previous_mood = window_mean(previous, |w| w.avg_mood);

    TrendSummary {
        mood_delta: round_to(recent_mood - previous_mood, 2),
        stress_delta: round_to(
            window_mean(recent, |w| w.avg_stress) - window_mean(previous, |w| w.avg_stress),
            2,
        ),
        energy_delta: round_to(
            window_mean(recent, |w| w.avg_energy) - window_mean(previous, |w| w.avg_energy),
            2,
        ),
        direction: if recent_mood > previous_mood {
            TrendDirection::Improving
        } else {
            TrendDirection::Declining
        },
        weeks,
    }
}

/// OLS fit of mood on energy, stress, sleep and hours; needs 30 records.
fn mood_model(columns: &[Vec<f64>; 5]) -> Option<MoodModel> {
    let n = columns[0].len();
    if n < MIN_MODEL_RECORDS {
        return None;
    }
    const P: usize = 4;
    const K: usize = P + 1;

    let design = |row: usize| -> [f64; K] {
        [
            1.0,
            columns[1][row],
            columns[2][row],
            columns[3][row],
            columns[4][row],
        ]
    };

    let mut xtx = [[0.0; K]; K];
    let mut xty = [0.0; K];
    for row in 0..n {
        let x = design(row);
        for i in 0..K {
            xty[i] += x[i] * columns[0][row];
            for j in 0..K {
                xtx[i][j] += x[i] * x[j];
            }
        }
    }
    let beta = solve(xtx, xty)?;

    let mean_y = mean(&columns[0]);
    let (mut ss_res, mut ss_tot) = (0.0, 0.0);
    for row in 0..n {
        let x = design(row);
        let fitted: f64 = x.iter().zip(&beta).map(|(a, b)| a * b).sum();
        ss_res += (columns[0][row] - fitted).powi(2);
        ss_tot += (columns[0][row] - mean_y).powi(2);
    }
    if ss_tot <= f64::EPSILON {
        return None;
    }

    let r_squared = 1.0 - ss_res / ss_tot;
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / (n as f64 - P as f64 - 1.0);
    Some(MoodModel {
        r_squared: round_to(r_squared, 3),
        adj_r_squared: round_to(adj_r_squared, 3),
    })
}

/// Gaussian elimination with partial pivoting. `None` when singular.
fn solve<const K: usize>(mut a: [[f64; K]; K], mut b: [f64; K]) -> Option<[f64; K]> {
    for col in 0..K {
        let pivot = (col..K).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-10 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..K {
            let factor = a[row][col] / a[col][col];
            for k in col..K {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; K];
    for row in (0..K).rev() {
        let tail: f64 = (row + 1..K).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

fn iqr_outliers(values: &[f64]) -> usize {
    let q1 = percentile(values, 0.25);
    let q3 = percentile(values, 0.75);
    let iqr = q3 - q1;
    let (lower, upper) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
    values.iter().filter(|&&v| v < lower || v > upper).count()
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonalSummary {
    pub total_records: usize,
    pub avg_mood: f64,
    pub avg_energy: f64,
    pub avg_stress: f64,
    pub avg_sleep: f64,
    pub avg_work_hours: f64,
    pub mood_std: f64,
    pub stress_std: f64,
    pub avg_overall_score: f64,
}

pub fn personal_summary(records: &[WellbeingRecord]) -> Option<PersonalSummary> {
    if records.is_empty() {
        return None;
    }
    let refs: Vec<&WellbeingRecord> = records.iter().collect();
    let columns = columns(&refs);
    let overall: Vec<f64> = records.iter().map(WellbeingRecord::overall_score).collect();

    Some(PersonalSummary {
        total_records: records.len(),
        avg_mood: mean(&columns[0]),
        avg_energy: mean(&columns[1]),
        avg_stress: mean(&columns[2]),
        avg_sleep: mean(&columns[3]),
        avg_work_hours: mean(&columns[4]),
        mood_std: sample_std(&columns[0]),
        stress_std: sample_std(&columns[2]),
        avg_overall_score: round_to(mean(&overall), 2),
    })
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
