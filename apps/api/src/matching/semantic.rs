//! Semantic scorer — per-condition best-sentence similarity with
//! tech-family thresholds and soft fractional credit.

use tracing::{info, warn};

use crate::embedding::{cosine_similarity, EmbeddingClient};
use crate::matching::sentences::ResumeSentences;
use crate::models::matching::{ConditionAnalysis, MatchType, SectionEvidence};

pub const DEFAULT_THRESHOLD: f64 = 0.60;

/// Per-tech-family thresholds; when several families appear in a condition
/// the strictest one wins.
const TECH_THRESHOLDS: &[(&str, f64)] = &[
    // 백엔드 (충돌 방지 - 매우 엄격)
    ("java", 0.75),
    ("kotlin", 0.75),
    ("spring", 0.75),
    ("python", 0.62),
    ("fastapi", 0.62),
    ("django", 0.62),
    ("node.js", 0.70),
    ("express", 0.70),
    // 프론트엔드 (충돌 방지 - 매우 엄격)
    ("react", 0.75),
    ("next.js", 0.75),
    ("typescript", 0.75),
    ("vue.js", 0.70),
    ("angular", 0.70),
    ("flutter", 0.70),
    // 모바일
    ("android", 0.75),
    ("ios", 0.75),
    // 데이터베이스 (완화)
    ("mysql", 0.55),
    ("postgresql", 0.55),
    ("mongodb", 0.55),
    // 클라우드/인프라
    ("aws", 0.65),
    ("gcp", 0.65),
    ("azure", 0.65),
    ("docker", 0.65),
    ("kubernetes", 0.70),
    // AI/ML
    ("tensorflow", 0.62),
    ("pytorch", 0.62),
    ("opencv", 0.62),
    ("langchain", 0.62),
    ("langgraph", 0.62),
];

/// The three job sections the sentence pipeline scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoredSection {
    Required,
    Preferred,
    Experience,
}

impl ScoredSection {
    pub fn job_section(&self) -> &'static str {
        match self {
            ScoredSection::Required => "required",
            ScoredSection::Preferred => "preferred",
            ScoredSection::Experience => "experience",
        }
    }
}

/// A job-side condition with its stored embedding when available.
#[derive(Debug, Clone)]
pub struct Condition {
    pub text: String,
    pub embedding: Option<Vec<f32>>,
}

impl Condition {
    pub fn bare(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            embedding: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SectionOutcome {
    pub score: f64,
    pub evidence: SectionEvidence,
}

/// Threshold for a condition, selected by the strictest tech family it
/// mentions; `DEFAULT_THRESHOLD` when no family matches.
pub fn dynamic_threshold(condition: &str) -> f64 {
    let lower = condition.to_lowercase();
    let mut threshold = DEFAULT_THRESHOLD;
    for (tech, tech_threshold) in TECH_THRESHOLDS {
        if lower.contains(tech) {
            threshold = threshold.max(*tech_threshold);
        }
    }
    threshold
}

/// Per-condition contribution to the section score. 1.0 once the similarity
/// clears the threshold; otherwise a reduced proportional credit:
/// required `min(1, sim/0.60) * 0.5`, other sections
/// `max(0, (sim - 0.55)/0.10) * 0.5`.
pub fn soft_score(section: ScoredSection, sim: f64, threshold: f64) -> f64 {
    if sim >= threshold {
        return 1.0;
    }
    match section {
        ScoredSection::Required => (sim / DEFAULT_THRESHOLD).min(1.0) * 0.5,
        _ => ((sim - 0.55) / 0.10).max(0.0) * 0.5,
    }
}

/// Best cosine similarity between a condition embedding and every résumé
/// sentence, with the winning sentence index.
pub fn best_sentence_match(condition: &[f32], resume: &ResumeSentences) -> (f64, Option<usize>) {
    let mut best_sim = 0.0f64;
    let mut best_idx = None;
    for (idx, sentence_embedding) in resume.embeddings.iter().enumerate() {
        let sim = cosine_similarity(condition, sentence_embedding);
        if best_idx.is_none() || sim > best_sim {
            best_sim = sim;
            best_idx = Some(idx);
        }
    }
    (best_sim, best_idx)
}

/// Scores one job section against the résumé sentences. Conditions without
/// stored embeddings are embedded in one batch; a failed item degrades to
/// similarity 0 rather than failing the section.
pub async fn score_section(
    embedding: &EmbeddingClient,
    section: ScoredSection,
    conditions: &[Condition],
    resume: &ResumeSentences,
) -> SectionOutcome {
    if conditions.is_empty() {
        return SectionOutcome {
            score: 0.0,
            evidence: SectionEvidence {
                match_rate: "0/0".to_string(),
                ..SectionEvidence::default()
            },
        };
    }

    let missing: Vec<usize> = conditions
        .iter()
        .enumerate()
        .filter(|(_, c)| c.embedding.is_none())
        .map(|(i, _)| i)
        .collect();
    let mut embedded = vec![None; conditions.len()];
    if !missing.is_empty() {
        let texts: Vec<String> = missing.iter().map(|&i| conditions[i].text.clone()).collect();
        match embedding.embed_batch(&texts).await {
            Ok(vectors) => {
                for (&i, vector) in missing.iter().zip(vectors) {
                    embedded[i] = Some(vector);
                }
            }
            Err(e) => warn!(
                "condition embedding failed for section {}: {e}",
                section.job_section()
            ),
        }
    }

    let mut matched_conditions = Vec::new();
    let mut missing_conditions = Vec::new();
    let mut detailed_analysis = Vec::with_capacity(conditions.len());
    let mut scores = Vec::with_capacity(conditions.len());

    for (i, condition) in conditions.iter().enumerate() {
        let vector = condition.embedding.as_deref().or(embedded[i].as_deref());
        let (best_sim, best_idx) = match vector {
            Some(v) => best_sentence_match(v, resume),
            None => (0.0, None),
        };

        let threshold = dynamic_threshold(&condition.text);
        let matched = best_sim >= threshold;
        info!(
            "condition matching: '{}' → {best_sim:.3} vs {threshold:.2} = {}",
            truncate_chars(&condition.text, 40),
            if matched { "MATCH" } else { "NO MATCH" }
        );

        let (matched_sentence, matched_section) = match best_idx {
            Some(idx) => (
                resume.lines[idx].clone(),
                Some(resume.sections[idx].clone()),
            ),
            None => (String::new(), None),
        };

        detailed_analysis.push(ConditionAnalysis {
            condition: condition.text.clone(),
            matched,
            similarity_score: best_sim,
            matched_sentence,
            matched_section,
            match_type: if matched {
                MatchType::Semantic
            } else {
                MatchType::None
            },
            threshold_used: threshold,
        });

        if matched {
            matched_conditions.push(condition.text.clone());
        } else {
            missing_conditions.push(condition.text.clone());
        }
        scores.push(soft_score(section, best_sim, threshold));
    }

    let score = scores.iter().sum::<f64>() / scores.len() as f64;
    let match_rate = format!("{}/{}", matched_conditions.len(), conditions.len());

    SectionOutcome {
        score,
        evidence: SectionEvidence {
            matched: matched_conditions,
            missing: missing_conditions,
            detailed_analysis,
            match_rate,
        },
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect::<String>() + "..."
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EMBEDDING_DIMENSION;

    fn axis(dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIMENSION];
        v[dim] = 1.0;
        v
    }

    fn blend(dim_a: usize, dim_b: usize, weight_a: f32) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIMENSION];
        v[dim_a] = weight_a;
        v[dim_b] = (1.0 - weight_a * weight_a).sqrt();
        v
    }

    #[test]
    fn test_default_threshold_without_tech_keyword() {
        assert_eq!(dynamic_threshold("성실하게 일하는 분"), 0.60);
    }

    #[test]
    fn test_threshold_python_family() {
        assert_eq!(dynamic_threshold("Python 백엔드 경험"), 0.62);
        assert_eq!(dynamic_threshold("FastAPI 서비스 개발"), 0.62);
    }

    #[test]
    fn test_threshold_takes_maximum_of_families() {
        // kotlin → 0.75, android → 0.75, 데이터베이스와 섞여도 최댓값 유지
        assert_eq!(dynamic_threshold("Kotlin 기반 Android 개발"), 0.75);
        assert_eq!(dynamic_threshold("MySQL과 Java 활용"), 0.75);
    }

    #[test]
    fn test_threshold_database_family_is_relaxed() {
        assert_eq!(dynamic_threshold("MongoDB 운영 경험"), 0.55);
    }

    #[test]
    fn test_soft_score_is_one_iff_threshold_met() {
        for section in [
            ScoredSection::Required,
            ScoredSection::Preferred,
            ScoredSection::Experience,
        ] {
            assert_eq!(soft_score(section, 0.75, 0.75), 1.0);
            assert!(soft_score(section, 0.7499, 0.75) < 1.0);
        }
    }

    #[test]
    fn test_soft_score_required_proportional_credit() {
        // sim 0.71, threshold 0.75 → min(1, 0.71/0.60) * 0.5 = 0.5
        let credit = soft_score(ScoredSection::Required, 0.71, 0.75);
        assert!((credit - 0.5).abs() < 1e-9);

        let low = soft_score(ScoredSection::Required, 0.30, 0.60);
        assert!((low - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_soft_score_preferred_credit_floor() {
        assert_eq!(soft_score(ScoredSection::Preferred, 0.50, 0.70), 0.0);
        let mid = soft_score(ScoredSection::Preferred, 0.60, 0.70);
        assert!((mid - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_soft_score_bounded() {
        for sim in [0.0, 0.2, 0.55, 0.59, 0.74, 0.9, 1.0] {
            for section in [ScoredSection::Required, ScoredSection::Preferred] {
                let s = soft_score(section, sim, 0.75);
                assert!((0.0..=1.0).contains(&s), "sim {sim} gave {s}");
            }
        }
    }

    #[test]
    fn test_best_sentence_match_picks_argmax() {
        let resume = ResumeSentences {
            lines: vec!["a".into(), "b".into(), "c".into()],
            sections: vec!["raw".into(), "skills".into(), "projects".into()],
            embeddings: vec![axis(0), blend(1, 0, 0.9), axis(2)],
        };
        let condition = axis(1);
        let (sim, idx) = best_sentence_match(&condition, &resume);
        assert_eq!(idx, Some(1));
        assert!((sim - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_best_sentence_match_empty_resume() {
        let resume = ResumeSentences {
            lines: vec![],
            sections: vec![],
            embeddings: vec![],
        };
        let (sim, idx) = best_sentence_match(&axis(0), &resume);
        assert_eq!(sim, 0.0);
        assert_eq!(idx, None);
    }

    #[tokio::test]
    async fn test_score_section_empty_conditions() {
        let client = EmbeddingClient::new("http://localhost:0");
        let resume = ResumeSentences {
            lines: vec![],
            sections: vec![],
            embeddings: vec![],
        };
        let outcome = score_section(&client, ScoredSection::Required, &[], &resume).await;
        assert_eq!(outcome.score, 0.0);
        assert_eq!(outcome.evidence.match_rate, "0/0");
        assert!(outcome.evidence.detailed_analysis.is_empty());
    }

    #[tokio::test]
    async fn test_score_section_with_stored_embeddings() {
        let client = EmbeddingClient::new("http://localhost:0");
        let resume = ResumeSentences {
            lines: vec![
                "Python으로 백엔드 서비스를 2년간 개발했습니다".into(),
                "팀 협업 경험".into(),
            ],
            sections: vec!["experience".into(), "raw".into()],
            embeddings: vec![blend(0, 1, 0.74), axis(5)],
        };
        let conditions = vec![
            Condition {
                text: "Python 3년 이상 경험이 있는 분".into(),
                embedding: Some(axis(0)),
            },
            Condition {
                text: "Kubernetes 운영 경험".into(),
                embedding: Some(axis(9)),
            },
        ];

        let outcome = score_section(&client, ScoredSection::Required, &conditions, &resume).await;

        // python 조건: sim 0.74 ≥ 0.62 → 매칭, k8s 조건: sim 0 → min(1, 0/0.6)*0.5 = 0
        assert_eq!(outcome.evidence.matched.len(), 1);
        assert_eq!(outcome.evidence.missing.len(), 1);
        assert!((outcome.score - 0.5).abs() < 1e-6);
        assert_eq!(outcome.evidence.match_rate, "1/2");

        let first = &outcome.evidence.detailed_analysis[0];
        assert!(first.matched);
        assert_eq!(first.match_type, MatchType::Semantic);
        assert_eq!(first.matched_section.as_deref(), Some("experience"));
        assert_eq!(first.threshold_used, 0.62);

        let second = &outcome.evidence.detailed_analysis[1];
        assert!(!second.matched);
        assert_eq!(second.match_type, MatchType::None);
        assert_eq!(second.threshold_used, 0.70);
    }

    #[tokio::test]
    async fn test_matched_and_missing_partition_all_conditions() {
        let client = EmbeddingClient::new("http://localhost:0");
        let resume = ResumeSentences {
            lines: vec!["문장".into()],
            sections: vec!["raw".into()],
            embeddings: vec![axis(0)],
        };
        let conditions: Vec<Condition> = (0..4)
            .map(|i| Condition {
                text: format!("조건 {i}"),
                embedding: Some(axis(i)),
            })
            .collect();

        let outcome = score_section(&client, ScoredSection::Preferred, &conditions, &resume).await;
        let total = outcome.evidence.matched.len() + outcome.evidence.missing.len();
        assert_eq!(total, conditions.len());
        for condition in &conditions {
            let in_matched = outcome.evidence.matched.contains(&condition.text);
            let in_missing = outcome.evidence.missing.contains(&condition.text);
            assert!(in_matched ^ in_missing, "{} in exactly one set", condition.text);
        }
    }
}
