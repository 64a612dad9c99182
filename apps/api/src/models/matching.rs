use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::GradeThresholds;

pub const ALGORITHM_VERSION: &str = "v3.0-sectional-sentences";

/// Bucketed label over the final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Excellent,
    Good,
    Fair,
    Caution,
    Poor,
}

impl Grade {
    pub fn assign(score: f64, thresholds: &GradeThresholds) -> Grade {
        if score >= thresholds.excellent {
            Grade::Excellent
        } else if score >= thresholds.good {
            Grade::Good
        } else if score >= thresholds.fair {
            Grade::Fair
        } else if score >= thresholds.caution {
            Grade::Caution
        } else {
            Grade::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Excellent => "excellent",
            Grade::Good => "good",
            Grade::Fair => "fair",
            Grade::Caution => "caution",
            Grade::Poor => "poor",
        }
    }
}

/// How a condition was judged against the résumé.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Semantic,
    Keyword,
    None,
}

/// Per-condition evidence emitted by the semantic scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionAnalysis {
    pub condition: String,
    pub matched: bool,
    pub similarity_score: f64,
    pub matched_sentence: String,
    pub matched_section: Option<String>,
    pub match_type: MatchType,
    pub threshold_used: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionEvidence {
    pub matched: Vec<String>,
    pub missing: Vec<String>,
    pub detailed_analysis: Vec<ConditionAnalysis>,
    pub match_rate: String,
}

/// A semantic section category: score, weight, and flattened evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionScore {
    pub score: f64,
    pub weight: f64,
    #[serde(flatten)]
    pub evidence: SectionEvidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceEvidence {
    pub required_years: f64,
    pub max_years: Option<f64>,
    pub candidate_years: f64,
    pub level_match: bool,
    pub year_score: f64,
    pub level_score: f64,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceCategory {
    pub score: f64,
    pub weight: f64,
    #[serde(flatten)]
    pub evidence: ExperienceEvidence,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WeightedScore {
    pub score: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryScores {
    pub required_match: SectionScore,
    pub preferred_match: SectionScore,
    pub experience_match: ExperienceCategory,
    pub overall_similarity: WeightedScore,
    pub education: WeightedScore,
    pub certification: WeightedScore,
    pub language: WeightedScore,
}

impl CategoryScores {
    pub fn weighted_sum(&self) -> f64 {
        self.required_match.score * self.required_match.weight
            + self.preferred_match.score * self.preferred_match.weight
            + self.experience_match.score * self.experience_match.weight
            + self.overall_similarity.score * self.overall_similarity.weight
            + self.education.score * self.education.weight
            + self.certification.score * self.certification.weight
            + self.language.score * self.language.weight
    }

    /// Percentage-scaled view for the search listing.
    pub fn to_percentages(&self) -> BTreeMap<&'static str, WeightedScore> {
        let pct = |w: WeightedScore| WeightedScore {
            score: round1(w.score * 100.0),
            weight: w.weight,
        };
        BTreeMap::from([
            (
                "required_match",
                pct(WeightedScore {
                    score: self.required_match.score,
                    weight: self.required_match.weight,
                }),
            ),
            (
                "preferred_match",
                pct(WeightedScore {
                    score: self.preferred_match.score,
                    weight: self.preferred_match.weight,
                }),
            ),
            (
                "experience_match",
                pct(WeightedScore {
                    score: self.experience_match.score,
                    weight: self.experience_match.weight,
                }),
            ),
            ("overall_similarity", pct(self.overall_similarity)),
            ("education", pct(self.education)),
            ("certification", pct(self.certification)),
            ("language", pct(self.language)),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyKind {
    ExperienceLevelMismatch,
    ExperienceSignificantlyLacking,
    RequiredSkillMissing,
    RequiredSkillCriticalMissing,
}

impl PenaltyKind {
    /// The two kinds that share the experience-family cap.
    pub const EXPERIENCE_FAMILY: [PenaltyKind; 2] = [
        PenaltyKind::ExperienceLevelMismatch,
        PenaltyKind::ExperienceSignificantlyLacking,
    ];
}

/// Applied penalties, keyed by kind. BTreeMap keeps the JSON deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Penalties(pub BTreeMap<PenaltyKind, f64>);

impl Penalties {
    pub fn insert(&mut self, kind: PenaltyKind, magnitude: f64) {
        self.0.insert(kind, magnitude);
    }

    pub fn get(&self, kind: PenaltyKind) -> Option<f64> {
        self.0.get(&kind).copied()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }
}

/// Keyword-overlap scorer output, surfaced in the matching evidence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillScore {
    pub score: f64,
    pub matched_required: Vec<String>,
    pub missing_required: Vec<String>,
    pub matched_preferred: Vec<String>,
    pub missing_preferred: Vec<String>,
    pub required_score: f64,
    pub preferred_score: f64,
    pub total_required: usize,
    pub total_preferred: usize,
    pub difficulty_factor: f64,
    pub match_rate: String,
}

/// Section-level embedding scores surfaced for UI breadcrumbs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SectionalScores {
    pub required_embedding: f64,
    pub preferred_embedding: f64,
    pub experience_embedding: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingEvidence {
    pub required_skills: SectionScore,
    pub preferred_skills: SectionScore,
    pub experience_evidence: ExperienceCategory,
    pub sectional_scores: SectionalScores,
    pub similarity_score: f64,
    pub skill_keywords: SkillScore,
    pub difficulty_factor: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_feedback: Option<Value>,
}

/// The full matching value for one résumé × job pair.
/// Never persisted; recalled by token instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingOutcome {
    pub job_id: Uuid,
    pub resume_id: Uuid,
    pub overall_score: f64,
    pub grade: Grade,
    pub category_scores: CategoryScores,
    pub matching_evidence: MatchingEvidence,
    pub penalties: Penalties,
    pub algorithm_version: String,
    pub calculation_time_ms: u64,
}

pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> GradeThresholds {
        GradeThresholds::default()
    }

    #[test]
    fn test_grade_buckets_are_unique_and_exhaustive() {
        let t = thresholds();
        let cases = [
            (0.92, Grade::Excellent),
            (0.85, Grade::Excellent),
            (0.84, Grade::Good),
            (0.70, Grade::Good),
            (0.69, Grade::Fair),
            (0.55, Grade::Fair),
            (0.54, Grade::Caution),
            (0.40, Grade::Caution),
            (0.39, Grade::Poor),
            (0.0, Grade::Poor),
        ];
        for (score, expected) in cases {
            assert_eq!(Grade::assign(score, &t), expected, "score {score}");
        }
    }

    #[test]
    fn test_grade_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Grade::Caution).unwrap(), r#""caution""#);
    }

    #[test]
    fn test_penalty_kind_serializes_snake_case_map_key() {
        let mut penalties = Penalties::default();
        penalties.insert(PenaltyKind::ExperienceLevelMismatch, 0.25);
        let json = serde_json::to_string(&penalties).unwrap();
        assert_eq!(json, r#"{"experience_level_mismatch":0.25}"#);
    }

    #[test]
    fn test_penalties_total() {
        let mut penalties = Penalties::default();
        penalties.insert(PenaltyKind::ExperienceLevelMismatch, 0.1);
        penalties.insert(PenaltyKind::RequiredSkillCriticalMissing, 0.15);
        assert!((penalties.total() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_sum() {
        let section = |score: f64, weight: f64| SectionScore {
            score,
            weight,
            evidence: SectionEvidence::default(),
        };
        let scores = CategoryScores {
            required_match: section(1.0, 0.40),
            preferred_match: section(0.0, 0.08),
            experience_match: ExperienceCategory {
                score: 0.72,
                weight: 0.30,
                evidence: ExperienceEvidence {
                    required_years: 3.0,
                    max_years: None,
                    candidate_years: 2.0,
                    level_match: true,
                    year_score: 0.6,
                    level_score: 1.0,
                    details: String::new(),
                },
            },
            overall_similarity: WeightedScore {
                score: 0.5,
                weight: 0.20,
            },
            education: WeightedScore {
                score: 0.5,
                weight: 0.015,
            },
            certification: WeightedScore {
                score: 0.5,
                weight: 0.005,
            },
            language: WeightedScore {
                score: 0.5,
                weight: 0.0,
            },
        };
        // 0.4 + 0.216 + 0.1 + 0.0075 + 0.0025 = 0.726
        assert!((scores.weighted_sum() - 0.726).abs() < 1e-9);
    }

    #[test]
    fn test_round1() {
        assert_eq!(round1(72.46), 72.5);
        assert_eq!(round1(0.04), 0.0);
    }
}
