//! Keyword skill scorer — lexicon-token overlap between job conditions and
//! the candidate's extracted skills, with a difficulty bonus for demanding
//! postings.

use std::collections::{BTreeSet, HashSet};

use crate::matching::lexicon;
use crate::models::matching::SkillScore;

/// Difficulty by total condition count: more conditions are harder to
/// satisfy, so satisfying them earns a bonus.
pub fn difficulty_factor(total_conditions: usize) -> f64 {
    match total_conditions {
        0..=3 => 0.0,
        4..=6 => 0.3,
        7..=10 => 0.6,
        n => (0.6 + (n as f64 - 10.0) * 0.05).min(1.0),
    }
}

/// Scores keyword overlap for the required and preferred buckets.
/// Condition lists are normalized (atomic split + synonym expansion) before
/// token extraction; the required token universe also includes the
/// posting's own parsed skills.
pub fn calculate_skill_score(
    required_conditions: &[String],
    preferred_conditions: &[String],
    parsed_skills: &[String],
    skills_lower: &HashSet<String>,
) -> SkillScore {
    let normalized_required = lexicon::normalize_conditions(required_conditions);
    let normalized_preferred = lexicon::normalize_conditions(preferred_conditions);

    let mut required_tokens = lexicon::extract_skill_tokens(&normalized_required);
    required_tokens.extend(parsed_skills.iter().map(|s| lexicon::canonicalize(s)));
    let preferred_tokens = lexicon::extract_skill_tokens(&normalized_preferred);

    let required_score = token_ratio(&required_tokens, skills_lower);
    let preferred_score = token_ratio(&preferred_tokens, skills_lower);

    let (matched_required, missing_required) =
        split_conditions(&normalized_required, skills_lower);
    let (matched_preferred, missing_preferred) =
        split_conditions(&normalized_preferred, skills_lower);

    let difficulty =
        difficulty_factor(required_conditions.len() + preferred_conditions.len());

    let score = if !required_tokens.is_empty() {
        let base = required_score * 0.7 + preferred_score * 0.3;
        (base * (1.0 + difficulty * 0.1)).min(1.0) // 최대 10% 보너스
    } else if !preferred_tokens.is_empty() {
        preferred_score
    } else {
        0.5
    };

    let match_rate = format!(
        "{}/{} 필수, {}/{} 우대",
        matched_required.len(),
        normalized_required.len(),
        matched_preferred.len(),
        normalized_preferred.len()
    );

    SkillScore {
        score,
        matched_required,
        missing_required,
        matched_preferred,
        missing_preferred,
        required_score,
        preferred_score,
        total_required: required_tokens.len(),
        total_preferred: preferred_tokens.len(),
        difficulty_factor: difficulty,
        match_rate,
    }
}

fn token_ratio(tokens: &BTreeSet<String>, skills_lower: &HashSet<String>) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let matched = tokens
        .iter()
        .filter(|token| skills_lower.contains(token.as_str()))
        .count();
    matched as f64 / tokens.len() as f64
}

/// Partitions conditions by keyword match. Each condition lands in exactly
/// one list.
fn split_conditions(
    conditions: &[String],
    skills_lower: &HashSet<String>,
) -> (Vec<String>, Vec<String>) {
    let mut matched = Vec::new();
    let mut missing = Vec::new();
    for condition in conditions {
        if lexicon::condition_matches_skills(condition, skills_lower) {
            matched.push(condition.clone());
        } else {
            missing.push(condition.clone());
        }
    }
    (matched, missing)
}
