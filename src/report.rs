use std::fmt::Write;

use chrono::NaiveDate;

use crate::analytics::{OrganizationAnalytics, PersonalSummary, VARIABLES};
use crate::models::{ClassifierMetrics, ForecastResult, HistoryEntry, RiskAssessment};

pub fn build_organization_report(
    analytics: &OrganizationAnalytics,
    since_days: i64,
    cutoff: NaiveDate,
) -> String {
    let summary = &analytics.summary;
    let mut output = String::new();

    let _ = writeln!(output, "# Workplace Wellbeing Report");
    let _ = writeln!(
        output,
        "Covering the last {} days (check-ins since {})",
        since_days, cutoff
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(
        output,
        "- {} check-ins from {} employees",
        summary.total_records, summary.unique_users
    );
    let _ = writeln!(
        output,
        "- Mood {:.2} (sd {:.2}), energy {:.2}, stress {:.2} (sd {:.2}), sleep {:.2}",
        summary.avg_mood,
        summary.sd_mood,
        summary.avg_energy,
        summary.avg_stress,
        summary.sd_stress,
        summary.avg_sleep
    );
    let _ = writeln!(output, "- Work hours {:.2} per day", summary.avg_work_hours);
    let _ = writeln!(
        output,
        "- Stress interquartile range {:.1} to {:.1}",
        summary.p25_stress, summary.p75_stress
    );
    let _ = writeln!(
        output,
        "- High stress {:.1}%, low mood {:.1}%, overtime {:.1}%",
        summary.high_stress_pct, summary.low_mood_pct, summary.overtime_pct
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Weekly Trend");
    let trends = &analytics.trends;
    let _ = writeln!(output, "Direction: {}", trends.direction.as_str());
    if !trends.weeks.is_empty() {
        let _ = writeln!(
            output,
            "Mood {:+.2}, stress {:+.2}, energy {:+.2} (recent four weeks vs previous four)",
            trends.mood_delta, trends.stress_delta, trends.energy_delta
        );
        for week in trends.weeks.iter().rev().take(8) {
            let _ = writeln!(
                output,
                "- Week of {}: mood {:.2}, stress {:.2}, energy {:.2} across {} check-ins",
                week.week_start, week.avg_mood, week.avg_stress, week.avg_energy, week.records
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Correlations");
    let _ = writeln!(output, "| | {} |", VARIABLES.join(" | "));
    let _ = writeln!(output, "|---{}|", "|---".repeat(VARIABLES.len()));
    for (name, row) in VARIABLES.iter().zip(analytics.correlations.iter()) {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| match cell {
                Some(value) => format!("{value:.2}"),
                None => "n/a".to_string(),
            })
            .collect();
        let _ = writeln!(output, "| {} | {} |", name, cells.join(" | "));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Statistical Tests");
    match &analytics.overtime_stress {
        Some(test) => {
            let _ = writeln!(
                output,
                "- Overtime stress {:.2} vs normal {:.2}: t = {:.2}, p = {:.4}{}",
                test.mean_overtime,
                test.mean_normal,
                test.t_statistic,
                test.p_value,
                if test.significant { " (significant)" } else { "" }
            );
        }
        None => {
            let _ = writeln!(output, "- Not enough overtime and normal days to compare stress.");
        }
    }
    match &analytics.mood_model {
        Some(model) => {
            let _ = writeln!(
                output,
                "- Mood explained by energy, stress, sleep and hours: R² {:.3} (adjusted {:.3})",
                model.r_squared, model.adj_r_squared
            );
        }
        None => {
            let _ = writeln!(output, "- Too few check-ins for the mood regression.");
        }
    }
    let _ = writeln!(
        output,
        "- Outliers: {} stress readings, {} work-hour readings",
        analytics.outliers.stress, analytics.outliers.work_hours
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommendations");
    for recommendation in analytics.recommendations.iter() {
        let _ = writeln!(output, "- {}", recommendation);
    }

    output
}

pub fn build_personal_report(
    email: &str,
    since_days: i64,
    summary: &PersonalSummary,
    assessment: Option<&RiskAssessment>,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Wellbeing Summary for {}", email);
    let _ = writeln!(
        output,
        "{} check-ins over the last {} days",
        summary.total_records, since_days
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Averages");
    let _ = writeln!(
        output,
        "- Mood {:.2} (sd {:.2})",
        summary.avg_mood, summary.mood_std
    );
    let _ = writeln!(output, "- Energy {:.2}", summary.avg_energy);
    let _ = writeln!(
        output,
        "- Stress {:.2} (sd {:.2})",
        summary.avg_stress, summary.stress_std
    );
    let _ = writeln!(output, "- Sleep quality {:.2}", summary.avg_sleep);
    let _ = writeln!(output, "- Work hours {:.2}", summary.avg_work_hours);
    let _ = writeln!(
        output,
        "- Overall wellbeing score {:.2}",
        summary.avg_overall_score
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Burnout Risk");
    match assessment {
        Some(assessment) => {
            let _ = write!(output, "{}", render_assessment(assessment));
        }
        None => {
            let _ = writeln!(output, "Not enough recent check-ins to assess risk.");
        }
    }

    output
}

pub fn render_assessment(assessment: &RiskAssessment) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "Risk {} ({:.1}%), confidence {:.0}%{}",
        assessment.tier.as_str(),
        assessment.probability * 100.0,
        assessment.confidence * 100.0,
        if assessment.model_ready {
            ""
        } else {
            " [model not trained, neutral estimate]"
        }
    );
    for recommendation in assessment.recommendations.iter() {
        let _ = writeln!(output, "- {}", recommendation);
    }
    output
}

pub fn render_forecast(result: &ForecastResult) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "| day | mood | energy | stress | sleep |");
    let _ = writeln!(output, "|---|---|---|---|---|");
    for day in result.days.iter() {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} |",
            day.day, day.mood, day.energy, day.stress, day.sleep_quality
        );
    }
    if !result.anomalies.is_empty() {
        let _ = writeln!(output);
        for anomaly in result.anomalies.iter() {
            let _ = writeln!(
                output,
                "- Anomaly on day {}: {} {:.1}",
                anomaly.day,
                anomaly.metric.label(),
                anomaly.value
            );
        }
    }
    output
}

pub fn render_history(entries: &[HistoryEntry]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "| recorded | mood | energy | stress | sleep | hours | score |");
    let _ = writeln!(output, "|---|---|---|---|---|---|---|");
    for entry in entries.iter() {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} | {:.1} | {:.2} |",
            entry.recorded_at.format("%Y-%m-%d %H:%M"),
            entry.mood,
            entry.energy,
            entry.stress,
            entry.sleep_quality,
            entry.work_hours,
            entry.overall_score
        );
    }
    output
}

pub fn render_metrics(metrics: &ClassifierMetrics) -> String {
    format!(
        "Classifier trained on {} examples ({} held out): random forest AUC {:.3}, \
         gradient boosting AUC {:.3}, ensemble AUC {:.3}",
        metrics.train_size,
        metrics.test_size,
        metrics.random_forest_auc,
        metrics.gradient_boosting_auc,
        metrics.ensemble_auc
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{organization_analytics, personal_summary};
    use crate::features::tests::record;
    use crate::models::{ForecastDay, RiskTier, StoredCheckin};
    use uuid::Uuid;

    fn analytics() -> OrganizationAnalytics {
        let user = Uuid::new_v4();
        let checkins: Vec<StoredCheckin> = (0..12)
            .map(|day| StoredCheckin {
                id: Uuid::new_v4(),
                user_id: user,
                record: record(day, 5 + (day % 3) as i32, 6, 4 + (day % 4) as i32, 7, 8.5),
            })
            .collect();
        organization_analytics(&checkins).unwrap()
    }

    #[test]
    fn organization_report_has_every_section() {
        let cutoff = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let report = build_organization_report(&analytics(), 30, cutoff);
        assert!(report.starts_with("# Workplace Wellbeing Report"));
        for heading in [
            "## Summary",
            "## Weekly Trend",
            "## Correlations",
            "## Statistical Tests",
            "## Recommendations",
        ] {
            assert!(report.contains(heading), "missing {heading}");
        }
        assert!(report.contains("12 check-ins from 1 employees"));
        assert!(report.contains("Direction: insufficient data"));
        assert!(report.contains("Too few check-ins for the mood regression."));
    }

    #[test]
    fn constant_columns_render_as_not_available() {
        let cutoff = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let report = build_organization_report(&analytics(), 30, cutoff);
        let sleep_row = report
            .lines()
            .find(|line| line.starts_with("| sleep_quality |"))
            .unwrap();
        assert!(sleep_row.contains("n/a"));
    }

    #[test]
    fn personal_report_without_assessment() {
        let records: Vec<_> = (0..3).map(|d| record(d, 6, 6, 4, 7, 8.0)).collect();
        let summary = personal_summary(&records).unwrap();
        let report = build_personal_report("sam@example.com", 30, &summary, None);
        assert!(report.starts_with("# Wellbeing Summary for sam@example.com"));
        assert!(report.contains("3 check-ins over the last 30 days"));
        assert!(report.contains("Not enough recent check-ins to assess risk."));
    }

    #[test]
    fn neutral_assessment_is_flagged() {
        let assessment = RiskAssessment {
            probability: 0.5,
            tier: RiskTier::Medium,
            recommendations: vec!["Keep up your healthy habits!".to_string()],
            confidence: 0.25,
            model_ready: false,
        };
        let text = render_assessment(&assessment);
        assert!(text.starts_with("Risk medium (50.0%), confidence 25%"));
        assert!(text.contains("neutral estimate"));
        assert!(text.contains("- Keep up your healthy habits!"));
    }

    #[test]
    fn history_table_lists_scores_newest_first() {
        let checkins: Vec<StoredCheckin> = [(0, 8, 3), (1, 4, 8)]
            .into_iter()
            .map(|(day, mood, stress)| StoredCheckin {
                id: Uuid::new_v4(),
                user_id: Uuid::nil(),
                record: record(day, mood, 6, stress, 7, 8.0),
            })
            .collect();
        let table = render_history(&crate::models::history(&checkins));
        let rows: Vec<&str> = table.lines().skip(2).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], "| 2026-01-02 09:00 | 4 | 6 | 8 | 7 | 8.0 | 5.05 |");
        assert_eq!(rows[1], "| 2026-01-01 09:00 | 8 | 6 | 3 | 7 | 8.0 | 7.30 |");
    }

    #[test]
    fn forecast_renders_one_row_per_day() {
        let result = ForecastResult {
            days: (1..=3)
                .map(|day| ForecastDay {
                    day,
                    mood: 6,
                    energy: 5,
                    stress: 4,
                    sleep_quality: 7,
                })
                .collect(),
            anomalies: Vec::new(),
        };
        let table = render_forecast(&result);
        assert_eq!(table.lines().count(), 5);
        assert!(table.contains("| 3 | 6 | 5 | 4 | 7 |"));
    }
}
