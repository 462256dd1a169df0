use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::features::{engineer_features, LONG_WINDOW, SHORT_WINDOW};
use crate::models::{RiskAssessment, RiskTier, WellbeingRecord};
use crate::recommend;
use crate::registry::ModelRegistry;

pub const NEUTRAL_PROBABILITY: f64 = 0.5;

/// Estimate burnout risk from a user's recent check-ins.
///
/// Needs at least seven records. Without a trained classifier the neutral
/// default (0.5, medium) is returned with `model_ready` unset.
pub fn predict_burnout(
    registry: &ModelRegistry,
    records: &[WellbeingRecord],
) -> Result<RiskAssessment, PipelineError> {
    if records.len() < SHORT_WINDOW {
        return Err(PipelineError::insufficient(
            "burnout prediction",
            SHORT_WINDOW,
            records.len(),
        ));
    }

    let features = engineer_features(records)?;
    let (probability, model_ready) = match registry.classifier() {
        Some(model) => (model.predict_proba(&features), true),
        None => {
            warn!("burnout classifier not trained, returning neutral prediction");
            (NEUTRAL_PROBABILITY, false)
        }
    };

    let tier = RiskTier::from_probability(probability);
    debug!(probability, tier = tier.as_str(), "burnout risk assessed");

    Ok(RiskAssessment {
        probability,
        tier,
        recommendations: recommend::personal(&features, probability),
        confidence: confidence(records.len()),
        model_ready,
    })
}

/// Sample-size coverage of the 30-record window.
pub fn confidence(record_count: usize) -> f64 {
    (record_count as f64 / LONG_WINDOW as f64).min(1.0)
}

pub fn cutoff(since_days: i64) -> Result<DateTime<Utc>, PipelineError> {
    Duration::try_days(since_days.max(1))
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or_else(|| {
            PipelineError::Validation(format!("lookback of {since_days} days is out of range"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::tests::labeled_examples;
    use crate::features::tests::record;

    fn strained_week() -> Vec<WellbeingRecord> {
        (0..7).map(|day| record(day, 3, 3, 9, 4, 10.0)).collect()
    }

    #[test]
    fn fewer_than_seven_records_is_insufficient() {
        let registry = ModelRegistry::new();
        let records: Vec<WellbeingRecord> = strained_week().into_iter().take(6).collect();
        assert_eq!(
            predict_burnout(&registry, &records).unwrap_err(),
            PipelineError::InsufficientData {
                operation: "burnout prediction",
                required: 7,
                actual: 6,
            }
        );
    }

    #[test]
    fn untrained_registry_gives_neutral_default() {
        let registry = ModelRegistry::new();
        let assessment = predict_burnout(&registry, &strained_week()).unwrap();
        assert_eq!(assessment.probability, 0.5);
        assert_eq!(assessment.tier, RiskTier::Medium);
        assert!(!assessment.model_ready);
        assert_eq!(assessment.recommendations.len(), 5);
        assert!((assessment.confidence - 7.0 / 30.0).abs() < 1e-12);
    }

    #[test]
    fn strained_week_gets_every_feature_recommendation_in_order() {
        let registry = ModelRegistry::new();
        let assessment = predict_burnout(&registry, &strained_week()).unwrap();
        let expected: Vec<String> = recommend::PERSONAL_RULES[..5]
            .iter()
            .map(|rule| rule.message.to_string())
            .collect();
        assert_eq!(assessment.recommendations, expected);
    }

    #[test]
    fn trained_registry_uses_the_ensemble() {
        let registry = ModelRegistry::new();
        registry.train_classifier(&labeled_examples(8)).unwrap();
        let assessment = predict_burnout(&registry, &strained_week()).unwrap();
        assert!(assessment.model_ready);
        assert!((0.0..=1.0).contains(&assessment.probability));
        assert_eq!(assessment.tier, RiskTier::from_probability(assessment.probability));
    }

    #[test]
    fn confidence_saturates_at_thirty_records() {
        assert_eq!(confidence(15), 0.5);
        assert_eq!(confidence(30), 1.0);
        assert_eq!(confidence(60), 1.0);
    }

    #[test]
    fn cutoff_respects_since_days() {
        let expected = Utc::now() - Duration::days(14);
        let diff = (cutoff(14).unwrap() - expected).num_seconds().abs();
        assert!(diff <= 1);
    }

    #[test]
    fn huge_lookback_is_rejected_not_panicking() {
        assert!(matches!(cutoff(i64::MAX), Err(PipelineError::Validation(_))));
        assert!(matches!(cutoff(400_000_000), Err(PipelineError::Validation(_))));
        assert!(cutoff(0).is_ok());
    }
}
