//! Experience scorer — required/candidate years comparison plus the level
//! bucket check.

use crate::models::matching::ExperienceEvidence;

/// Year range of an experience bucket, upper bound exclusive.
pub fn level_bounds(level: &str) -> Option<(f64, f64)> {
    match level.to_lowercase().as_str() {
        "junior" => Some((0.0, 3.0)),
        "mid" => Some((3.0, 7.0)),
        "senior" => Some((7.0, 100.0)),
        _ => None,
    }
}

/// A missing or unknown bucket never mismatches.
pub fn level_matches(level: Option<&str>, candidate_years: f64) -> bool {
    let Some(level) = level else {
        return true;
    };
    let Some((min_years, max_years)) = level_bounds(level) else {
        return true;
    };
    min_years <= candidate_years && candidate_years < max_years
}

pub struct ExperienceScore {
    pub score: f64,
    pub evidence: ExperienceEvidence,
}

/// Combines the year ladder (70%) with the bucket check (30%).
pub fn calculate_experience_score(
    required_years: f64,
    max_years: Option<f64>,
    candidate_years: f64,
    level: Option<&str>,
) -> ExperienceScore {
    let year_score: f64 = if required_years == 0.0 {
        // 경력 무관
        0.8
    } else if candidate_years >= required_years {
        match max_years {
            Some(max) if candidate_years > max => 0.7, // over-qualified
            _ => 1.0,
        }
    } else if candidate_years >= required_years * 0.7 {
        0.6
    } else if candidate_years >= required_years * 0.5 {
        0.4
    } else {
        0.2
    };

    let level_match = level_matches(level, candidate_years);
    let level_score = if level_match { 1.0 } else { 0.5 };

    let score = (year_score * 0.7 + level_score * 0.3).clamp(0.0, 1.0);

    let mut details = format!("{}년 경력", format_years(candidate_years));
    if required_years > 0.0 {
        match max_years {
            Some(max) => details.push_str(&format!(
                " (요구: {}~{}년)",
                format_years(required_years),
                format_years(max)
            )),
            None => details.push_str(&format!(" (요구: {}년 이상)", format_years(required_years))),
        }
    } else {
        details.push_str(" (경력무관)");
    }

    ExperienceScore {
        score,
        evidence: ExperienceEvidence {
            required_years,
            max_years,
            candidate_years,
            level_match,
            year_score,
            level_score,
            details,
        },
    }
}

fn format_years(years: f64) -> String {
    if years.fract() == 0.0 {
        format!("{}", years as i64)
    } else {
        format!("{years:.1}")
    }
}
