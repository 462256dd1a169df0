//! Rule tables turning features and aggregate statistics into advice.
//! Rules fire in table order; the fallback is used only when none fire.

use crate::features::FeatureVector;

pub struct PersonalRule {
    pub applies: fn(&FeatureVector, f64) -> bool,
    pub message: &'static str,
}

pub const PERSONAL_RULES: &[PersonalRule] = &[
    PersonalRule {
        applies: |f, _| f.avg_stress_7d() > 7.0,
        message: "Your stress level is elevated. Consider relaxation techniques.",
    },
    PersonalRule {
        applies: |f, _| f.avg_sleep_7d() < 6.0,
        message: "Sleep quality is below ideal. Prioritise 7-8 hours of sleep.",
    },
    PersonalRule {
        applies: |f, _| f.avg_work_hours_7d() > 9.0,
        message: "Working hours are above the recommended level. Try to set limits.",
    },
    PersonalRule {
        applies: |f, _| f.avg_mood_7d() < 5.0,
        message: "Low mood detected. Consider talking to a professional.",
    },
    PersonalRule {
        applies: |f, _| f.avg_energy_7d() < 5.0,
        message: "Low energy. Review your nutrition and physical activity.",
    },
    PersonalRule {
        applies: |_, probability| probability > 0.7,
        message: "High burnout risk. We recommend seeking professional support.",
    },
];

pub const PERSONAL_FALLBACK: &str = "Keep up your healthy habits!";

pub fn personal(features: &FeatureVector, probability: f64) -> Vec<String> {
    let mut advice: Vec<String> = PERSONAL_RULES
        .iter()
        .filter(|rule| (rule.applies)(features, probability))
        .map(|rule| rule.message.to_string())
        .collect();
    if advice.is_empty() {
        advice.push(PERSONAL_FALLBACK.to_string());
    }
    advice
}

/// Aggregate indicators for organisation-wide advice.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizationSignals {
    pub high_stress_pct: f64,
    pub overtime_pct: f64,
    pub avg_sleep: f64,
    pub mood_declining: bool,
}

pub struct OrganizationRule {
    pub applies: fn(&OrganizationSignals) -> bool,
    pub message: &'static str,
}

pub const ORGANIZATION_RULES: &[OrganizationRule] = &[
    OrganizationRule {
        applies: |s| s.high_stress_pct > 30.0,
        message: "More than 30% of check-ins report high stress. Consider stress management programmes.",
    },
    OrganizationRule {
        applies: |s| s.overtime_pct > 40.0,
        message: "More than 40% of check-ins report overtime. Review workload policies.",
    },
    OrganizationRule {
        applies: |s| s.avg_sleep < 6.5,
        message: "Sleep quality is below ideal. Promote sleep hygiene education.",
    },
    OrganizationRule {
        applies: |s| s.mood_declining,
        message: "A declining mood trend was detected. Preventive interventions are recommended.",
    },
];

pub const ORGANIZATION_FALLBACK: &str =
    "Organisational indicators are within healthy parameters.";

pub fn organization(signals: &OrganizationSignals) -> Vec<String> {
    let mut advice: Vec<String> = ORGANIZATION_RULES
        .iter()
        .filter(|rule| (rule.applies)(signals))
        .map(|rule| rule.message.to_string())
        .collect();
    if advice.is_empty() {
        advice.push(ORGANIZATION_FALLBACK.to_string());
    }
    advice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::engineer_features;
    use crate::features::tests::record;

    fn features(mood: i32, energy: i32, stress: i32, sleep: i32, hours: f64) -> FeatureVector {
        let records: Vec<_> = (0..7)
            .map(|day| record(day, mood, energy, stress, sleep, hours))
            .collect();
        engineer_features(&records).unwrap()
    }

    #[test]
    fn strained_week_triggers_rules_in_table_order() {
        let advice = personal(&features(3, 3, 9, 4, 10.0), 0.5);
        let expected: Vec<String> = PERSONAL_RULES[..5]
            .iter()
            .map(|rule| rule.message.to_string())
            .collect();
        assert_eq!(advice, expected);
    }

    #[test]
    fn high_probability_adds_urgent_advice_last() {
        let advice = personal(&features(3, 3, 9, 4, 10.0), 0.71);
        assert_eq!(advice.len(), 6);
        assert_eq!(advice[5], PERSONAL_RULES[5].message);

        let boundary = personal(&features(7, 7, 3, 8, 8.0), 0.7);
        assert_eq!(boundary, vec![PERSONAL_FALLBACK.to_string()]);
    }

    #[test]
    fn healthy_week_gets_positive_reinforcement() {
        let advice = personal(&features(7, 7, 3, 8, 8.0), 0.1);
        assert_eq!(advice, vec![PERSONAL_FALLBACK.to_string()]);
    }

    #[test]
    fn thresholds_are_strict() {
        // stress exactly 7, sleep exactly 6, hours exactly 9, mood and energy exactly 5
        let advice = personal(&features(5, 5, 7, 6, 9.0), 0.2);
        assert_eq!(advice, vec![PERSONAL_FALLBACK.to_string()]);
    }

    #[test]
    fn identical_inputs_give_identical_order() {
        let f = features(4, 6, 8, 5, 9.5);
        assert_eq!(personal(&f, 0.8), personal(&f, 0.8));
    }

    #[test]
    fn organization_rules_fire_in_order() {
        let signals = OrganizationSignals {
            high_stress_pct: 35.0,
            overtime_pct: 41.0,
            avg_sleep: 6.0,
            mood_declining: true,
        };
        let expected: Vec<String> = ORGANIZATION_RULES
            .iter()
            .map(|rule| rule.message.to_string())
            .collect();
        assert_eq!(organization(&signals), expected);

        let calm = OrganizationSignals {
            high_stress_pct: 30.0,
            overtime_pct: 40.0,
            avg_sleep: 6.5,
            mood_declining: false,
        };
        assert_eq!(organization(&calm), vec![ORGANIZATION_FALLBACK.to_string()]);
    }
}
