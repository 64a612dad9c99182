//! Penalty engine — level mismatch, under-experience, and critical missing
//! required skills, with a shared cap on the experience family.

use std::collections::HashSet;

use tracing::debug;

use crate::config::PenaltyConfig;
use crate::matching::experience::level_bounds;
use crate::models::matching::{Penalties, PenaltyKind};

/// Under-qualified below 50% of the bucket minimum, over-qualified above
/// 150% of the bucket maximum.
pub fn detect_experience_level_mismatch(level: Option<&str>, candidate_years: f64) -> bool {
    let Some(level) = level else {
        return false;
    };
    let Some((min_years, max_years)) = level_bounds(level) else {
        return false;
    };
    candidate_years < min_years * 0.5 || candidate_years > max_years * 1.5
}

/// Candidate under 70% of the required minimum.
pub fn detect_experience_significantly_lacking(required_years: f64, candidate_years: f64) -> bool {
    required_years > 0.0 && candidate_years < required_years * 0.7
}

/// Share of required conditions with no keyword overlap against the
/// candidate's skill set.
pub fn required_skill_missing_ratio(
    required_conditions: &[String],
    skills_lower: &HashSet<String>,
) -> f64 {
    if required_conditions.is_empty() {
        return 0.0;
    }
    let missing = required_conditions
        .iter()
        .filter(|condition| {
            let lower = condition.to_lowercase();
            !skills_lower
                .iter()
                .any(|skill| lower.contains(skill.as_str()) || skill.contains(&lower))
        })
        .count();
    missing as f64 / required_conditions.len() as f64
}

pub fn calculate_penalties(
    level: Option<&str>,
    required_years: f64,
    candidate_years: f64,
    required_conditions: &[String],
    skills_lower: &HashSet<String>,
    config: &PenaltyConfig,
) -> Penalties {
    let mut penalties = Penalties::default();

    if detect_experience_level_mismatch(level, candidate_years) {
        penalties.insert(
            PenaltyKind::ExperienceLevelMismatch,
            config.experience_level_mismatch,
        );
    }

    let missing_ratio = required_skill_missing_ratio(required_conditions, skills_lower);
    if missing_ratio > 0.5 {
        let magnitude = config.required_skill_critical_missing * missing_ratio;
        penalties.insert(PenaltyKind::RequiredSkillCriticalMissing, magnitude);
        debug!("critical missing penalty {magnitude:.3} (ratio {missing_ratio:.2})");
    }

    if detect_experience_significantly_lacking(required_years, candidate_years) {
        penalties.insert(
            PenaltyKind::ExperienceSignificantlyLacking,
            config.experience_significantly_lacking,
        );
    }

    apply_experience_cap(&mut penalties, config.experience_penalty_cap);
    penalties
}

/// Rescales the experience-family penalties proportionally so their sum
/// never exceeds the cap. Other penalties are untouched.
fn apply_experience_cap(penalties: &mut Penalties, cap: f64) {
    let family_sum: f64 = PenaltyKind::EXPERIENCE_FAMILY
        .iter()
        .filter_map(|kind| penalties.get(*kind))
        .sum();
    if family_sum <= cap || family_sum <= 0.0 {
        return;
    }
    let scale = cap / family_sum;
    for kind in PenaltyKind::EXPERIENCE_FAMILY {
        if let Some(value) = penalties.get(kind) {
            penalties.insert(kind, value * scale);
        }
    }
    debug!("scaled experience penalties by {scale:.3} to respect cap {cap:.2}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PenaltyConfig {
        PenaltyConfig::default()
    }

    fn skills(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn conditions(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_over_qualified_senior_on_junior_posting() {
        // junior 상한 3년 → 1.5배 = 4.5년 초과 시 미스매치
        assert!(detect_experience_level_mismatch(Some("junior"), 8.0));
        assert!(!detect_experience_level_mismatch(Some("junior"), 4.0));
    }

    #[test]
    fn test_under_qualified_for_senior_posting() {
        // senior 하한 7년 → 절반인 3.5년 미만이면 미스매치
        assert!(detect_experience_level_mismatch(Some("senior"), 3.0));
        assert!(!detect_experience_level_mismatch(Some("senior"), 4.0));
    }

    #[test]
    fn test_no_level_no_mismatch() {
        assert!(!detect_experience_level_mismatch(None, 30.0));
    }

    #[test]
    fn test_significantly_lacking_threshold() {
        assert!(detect_experience_significantly_lacking(5.0, 3.0));
        assert!(!detect_experience_significantly_lacking(5.0, 3.5));
        assert!(!detect_experience_significantly_lacking(0.0, 0.0));
    }

    #[test]
    fn test_missing_ratio() {
        let required = conditions(&[
            "Python 경험",
            "Kubernetes 운영",
            "Kafka 파이프라인",
            "GraphQL",
        ]);
        let ratio = required_skill_missing_ratio(&required, &skills(&["python"]));
        assert!((ratio - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_missing_ratio_empty_conditions() {
        assert_eq!(required_skill_missing_ratio(&[], &skills(&["python"])), 0.0);
    }

    #[test]
    fn test_critical_missing_penalty_scales_with_ratio() {
        // 6개 중 4개 미충족 → 0.25 * 2/3 ≈ 0.167
        let required = conditions(&["Python", "Django", "Kubernetes", "Kafka", "GraphQL", "Spark"]);
        let penalties = calculate_penalties(
            None,
            0.0,
            5.0,
            &required,
            &skills(&["python", "django"]),
            &config(),
        );
        let value = penalties
            .get(PenaltyKind::RequiredSkillCriticalMissing)
            .unwrap();
        assert!((value - 0.25 * (4.0 / 6.0)).abs() < 1e-9);
    }

    #[test]
    fn test_no_critical_penalty_at_half_missing() {
        let required = conditions(&["Python", "Java"]);
        let penalties =
            calculate_penalties(None, 0.0, 5.0, &required, &skills(&["python"]), &config());
        assert!(penalties
            .get(PenaltyKind::RequiredSkillCriticalMissing)
            .is_none());
    }

    #[test]
    fn test_single_experience_penalty_is_capped() {
        // junior 공고에 8년차 → 레벨 미스매치만 발동, 상한으로 0.15까지 축소
        let penalties = calculate_penalties(
            Some("junior"),
            0.0,
            8.0,
            &[],
            &skills(&[]),
            &config(),
        );
        assert_eq!(
            penalties.get(PenaltyKind::ExperienceLevelMismatch),
            Some(0.15)
        );
        assert!(penalties
            .get(PenaltyKind::ExperienceSignificantlyLacking)
            .is_none());
    }

    #[test]
    fn test_experience_family_cap_rescales_proportionally() {
        let penalties = calculate_penalties(
            Some("senior"),
            10.0,
            2.0,
            &[],
            &skills(&[]),
            &config(),
        );
        let level = penalties.get(PenaltyKind::ExperienceLevelMismatch).unwrap();
        let lacking = penalties
            .get(PenaltyKind::ExperienceSignificantlyLacking)
            .unwrap();
        let cap = config().experience_penalty_cap;
        assert!((level + lacking - cap).abs() < 1e-9);
        // 0.25 : 0.20 비율 유지
        assert!((level / lacking - 0.25 / 0.20).abs() < 1e-9);
    }

    #[test]
    fn test_cap_ignores_non_experience_penalties() {
        let required = conditions(&["Python", "Kubernetes", "Kafka"]);
        let penalties = calculate_penalties(
            Some("senior"),
            10.0,
            2.0,
            &required,
            &skills(&[]),
            &config(),
        );
        let family: f64 = PenaltyKind::EXPERIENCE_FAMILY
            .iter()
            .filter_map(|k| penalties.get(*k))
            .sum();
        assert!(family <= config().experience_penalty_cap + 1e-9);
        // critical missing은 상한과 무관하게 그대로
        let critical = penalties
            .get(PenaltyKind::RequiredSkillCriticalMissing)
            .unwrap();
        assert!((critical - 0.25).abs() < 1e-9);
    }
}
