//! Feedback generation — pluggable, trait-based narrative feedback on a
//! matching result.
//!
//! Default: `RuleBasedFeedback` (pure-Rust, deterministic). When an OpenAI
//! key is configured, `LlmFeedback` produces richer narrative and falls
//! back to the rule-based output on any failure. Feedback is attached to
//! evidence and never participates in the score.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::job::JobPostingRow;
use crate::models::matching::{Grade, MatchingEvidence};
use crate::models::resume::ResumeRow;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// Carried in the `Matcher` as `Arc<dyn FeedbackGenerator>` so backends can
/// be swapped at startup without touching the pipeline.
#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate(
        &self,
        job: &JobPostingRow,
        resume: &ResumeRow,
        evidence: &MatchingEvidence,
        overall_score: f64,
        grade: Grade,
    ) -> Result<Value, FeedbackError>;
}

/// Picks the LLM backend when an API key is configured, rule-based
/// otherwise.
pub fn select_backend(config: &Config) -> Arc<dyn FeedbackGenerator> {
    match &config.openai_api_key {
        Some(key) => Arc::new(LlmFeedback::new(key.clone(), config.openai_model.clone())),
        None => Arc::new(RuleBasedFeedback),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RuleBasedFeedback
// ────────────────────────────────────────────────────────────────────────────

/// Deterministic feedback derived from the matching evidence.
pub struct RuleBasedFeedback;

#[async_trait]
impl FeedbackGenerator for RuleBasedFeedback {
    async fn generate(
        &self,
        _job: &JobPostingRow,
        _resume: &ResumeRow,
        evidence: &MatchingEvidence,
        _overall_score: f64,
        grade: Grade,
    ) -> Result<Value, FeedbackError> {
        Ok(rule_based_feedback(evidence, grade))
    }
}

pub fn rule_based_feedback(evidence: &MatchingEvidence, grade: Grade) -> Value {
    json!({
        "strengths": build_strengths(evidence),
        "improvements": build_improvements(evidence),
        "recommendations": build_recommendations(evidence, grade),
    })
}

fn build_strengths(evidence: &MatchingEvidence) -> Vec<String> {
    let mut strengths = Vec::new();

    let matched_required = &evidence.required_skills.evidence.matched;
    if !matched_required.is_empty() {
        let count = matched_required.len();
        if count >= 3 {
            strengths.push(format!("자격요건 {count}개 충족 (우수)"));
        } else {
            strengths.push(format!("자격요건 {count}개 충족"));
        }
        if count <= 3 {
            for condition in matched_required.iter().take(3) {
                strengths.push(condition.clone());
            }
        }
    }

    let matched_preferred = &evidence.preferred_skills.evidence.matched;
    if !matched_preferred.is_empty() {
        strengths.push(format!("우대사항 {}개 충족", matched_preferred.len()));
        for condition in matched_preferred.iter().take(2) {
            strengths.push(condition.clone());
        }
    }

    let experience = &evidence.experience_evidence.evidence;
    if experience.level_match {
        strengths.push(format!("경력 요구사항 충족: {}", experience.details));
    }

    let similarity = evidence.similarity_score;
    if similarity >= 0.7 {
        strengths.push(format!("높은 직무 유사도: {:.0}%", similarity * 100.0));
    } else if similarity >= 0.5 {
        strengths.push(format!("직무 유사도: {:.0}%", similarity * 100.0));
    }

    strengths
}

fn build_improvements(evidence: &MatchingEvidence) -> Vec<String> {
    let mut improvements = Vec::new();

    let required = &evidence.required_skills;
    if required.score < 0.5 {
        improvements.push(format!(
            "자격요건 충족도가 낮습니다 ({:.0}%)",
            required.score * 100.0
        ));
    }
    let missing_required = &required.evidence.missing;
    if !missing_required.is_empty() {
        improvements.push(format!("부족한 자격요건 {}개:", missing_required.len()));
        let shown = missing_required.len().min(3);
        for condition in missing_required.iter().take(shown) {
            improvements.push(format!("  • {condition}"));
        }
        if missing_required.len() > shown {
            improvements.push(format!("  • 외 {}개", missing_required.len() - shown));
        }
    }

    let experience = &evidence.experience_evidence.evidence;
    if experience.required_years > 0.0 && experience.candidate_years < experience.required_years {
        let gap = experience.required_years - experience.candidate_years;
        improvements.push(format!(
            "경력이 {gap}년 부족합니다 (요구: {}년, 보유: {}년)",
            experience.required_years, experience.candidate_years
        ));
    }

    let missing_preferred = &evidence.preferred_skills.evidence.missing;
    if missing_preferred.len() > 3 {
        improvements.push(format!("우대사항 {}개 미충족", missing_preferred.len()));
    }

    improvements
}

fn build_recommendations(evidence: &MatchingEvidence, grade: Grade) -> Vec<String> {
    let mut recommendations = Vec::new();

    let missing_preferred = &evidence.preferred_skills.evidence.missing;
    if !missing_preferred.is_empty() {
        recommendations.push("우대사항 보완 제안:".to_string());
        for condition in missing_preferred.iter().take(3) {
            recommendations.push(format!("  • {condition}"));
        }
    }

    let experience = &evidence.experience_evidence.evidence;
    if experience.required_years > experience.candidate_years {
        if experience.candidate_years == 0.0 {
            recommendations.push(format!(
                "이 공고는 {}년 이상 경력자를 우대합니다",
                experience.required_years
            ));
        } else {
            recommendations.push(format!(
                "경력 {}년 이상이 되면 더 좋은 매칭이 예상됩니다",
                experience.required_years
            ));
        }
    }

    let tech_keywords = [
        "react", "vue", "angular", "next.js", "spring", "django", "kubernetes", "aws", "docker",
    ];
    for missing in evidence.required_skills.evidence.missing.iter().take(2) {
        let lower = missing.to_lowercase();
        if let Some(tech) = tech_keywords.iter().find(|t| lower.contains(*t)) {
            recommendations.push(format!(
                "{tech} 경험을 이력서에 추가하면 매칭도가 향상됩니다"
            ));
        }
    }

    if evidence.similarity_score < 0.5 {
        recommendations.push("이력서 내용을 공고와 더 관련된 키워드로 보완하세요".to_string());
    }

    match grade {
        Grade::Poor | Grade::Caution => {
            recommendations.push("이 공고보다 다른 공고가 더 적합할 수 있습니다".to_string())
        }
        Grade::Fair => {
            recommendations.push("자격요건을 더 충족하면 합격 가능성이 높아집니다".to_string())
        }
        Grade::Good => recommendations
            .push("우대사항을 추가로 충족하면 Excellent 등급이 가능합니다".to_string()),
        Grade::Excellent => {}
    }

    recommendations
}

// ────────────────────────────────────────────────────────────────────────────
// LlmFeedback
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Narrative feedback via an OpenAI-compatible chat-completions endpoint.
/// Retries on 429/5xx with exponential backoff; any terminal failure falls
/// back to the rule-based output so the endpoint never breaks on LLM
/// trouble.
pub struct LlmFeedback {
    http: Client,
    api_key: String,
    model: String,
}

impl LlmFeedback {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            http: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            model,
        }
    }

    async fn call(&self, prompt: String) -> Result<Value, FeedbackError> {
        let request_body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "당신은 채용 전문가입니다. 구직자에게 건설적이고 실행 가능한 \
                              피드백을 제공합니다."
                        .to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let mut last_error: Option<FeedbackError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "feedback call attempt {attempt} failed, retrying after {}ms...",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .http
                .post(OPENAI_API_URL)
                .bearer_auth(&self.api_key)
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(FeedbackError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                last_error = Some(FeedbackError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(FeedbackError::Api {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let chat: ChatResponse = response.json().await?;
            let content = chat
                .choices
                .first()
                .and_then(|c| c.message.content.as_deref())
                .ok_or(FeedbackError::EmptyContent)?;
            let feedback: Value = serde_json::from_str(content)?;
            return Ok(feedback);
        }

        Err(last_error.unwrap_or(FeedbackError::EmptyContent))
    }
}

#[async_trait]
impl FeedbackGenerator for LlmFeedback {
    async fn generate(
        &self,
        job: &JobPostingRow,
        resume: &ResumeRow,
        evidence: &MatchingEvidence,
        overall_score: f64,
        grade: Grade,
    ) -> Result<Value, FeedbackError> {
        let prompt = build_prompt(job, resume, evidence, overall_score, grade);
        match self.call(prompt).await {
            Ok(feedback) if has_required_keys(&feedback) => Ok(feedback),
            Ok(_) => {
                warn!("LLM feedback missing required keys, using rule-based fallback");
                Ok(rule_based_feedback(evidence, grade))
            }
            Err(e) => {
                warn!("LLM feedback failed, using rule-based fallback: {e}");
                Ok(rule_based_feedback(evidence, grade))
            }
        }
    }
}

fn has_required_keys(feedback: &Value) -> bool {
    ["strengths", "improvements", "recommendations"]
        .iter()
        .all(|key| feedback.get(key).is_some())
}

fn build_prompt(
    job: &JobPostingRow,
    resume: &ResumeRow,
    evidence: &MatchingEvidence,
    overall_score: f64,
    grade: Grade,
) -> String {
    let requirements = job.requirements();
    let required_list = enumerate_lines(&requirements.required, 7);
    let preferred_list = enumerate_lines(&requirements.preferred, 7);

    debug!("building feedback prompt for job {} / resume {}", job.id, resume.id);

    format!(
        "구직자의 이력서와 채용 공고를 조건별로 비교 분석하여 개인화된 피드백을 \
         JSON으로 작성해주세요.\n\n\
         # 채용 공고\n- 직무: {title}\n- 회사: {company}\n- 경력 요구: {level}\n\n\
         # 자격요건\n{required_list}\n\n# 우대사항\n{preferred_list}\n\n\
         # 구직자\n- 총 경력: {years}년\n- 학력: {education}\n\n\
         # 매칭 점수 요약\n- 종합 점수: {score:.1}% ({grade})\n\
         - 자격요건 충족률: {required_rate}\n- 우대사항 충족률: {preferred_rate}\n\n\
         다음 키를 가진 JSON으로만 답하세요: \
         strengths(3-4개), improvements(3-4개), recommendations(3개). \
         긍정적이고 격려하는 톤을 유지하고 이력서의 실제 내용을 인용하세요.",
        title = job.title,
        company = job.company_name.as_deref().unwrap_or("미상"),
        level = job.experience_level.as_deref().unwrap_or("미상"),
        years = resume.candidate_years(),
        education = resume.extracted_education_level.as_deref().unwrap_or("미상"),
        score = overall_score * 100.0,
        grade = grade.as_str().to_uppercase(),
        required_rate = evidence.required_skills.evidence.match_rate,
        preferred_rate = evidence.preferred_skills.evidence.match_rate,
    )
}

fn enumerate_lines(items: &[String], limit: usize) -> String {
    if items.is_empty() {
        return "(없음)".to_string();
    }
    items
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, item)| format!("{}. {item}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::matching::{
        ExperienceCategory, ExperienceEvidence, SectionEvidence, SectionScore, SectionalScores,
        SkillScore,
    };

    fn evidence(
        matched_required: &[&str],
        missing_required: &[&str],
        similarity: f64,
    ) -> MatchingEvidence {
        let section = |matched: &[&str], missing: &[&str]| SectionScore {
            score: if missing.is_empty() { 1.0 } else { 0.3 },
            weight: 0.4,
            evidence: SectionEvidence {
                matched: matched.iter().map(|s| s.to_string()).collect(),
                missing: missing.iter().map(|s| s.to_string()).collect(),
                detailed_analysis: vec![],
                match_rate: format!("{}/{}", matched.len(), matched.len() + missing.len()),
            },
        };
        MatchingEvidence {
            required_skills: section(matched_required, missing_required),
            preferred_skills: section(&[], &[]),
            experience_evidence: ExperienceCategory {
                score: 0.72,
                weight: 0.3,
                evidence: ExperienceEvidence {
                    required_years: 3.0,
                    max_years: None,
                    candidate_years: 2.0,
                    level_match: true,
                    year_score: 0.6,
                    level_score: 1.0,
                    details: "2년 경력 (요구: 3년 이상)".to_string(),
                },
            },
            sectional_scores: SectionalScores {
                required_embedding: 0.5,
                preferred_embedding: 0.0,
                experience_embedding: 0.0,
            },
            similarity_score: similarity,
            skill_keywords: SkillScore::default(),
            difficulty_factor: 0.0,
            ai_feedback: None,
        }
    }

    #[test]
    fn test_rule_based_has_all_sections() {
        let feedback = rule_based_feedback(&evidence(&["Python 경험"], &[], 0.8), Grade::Good);
        assert!(feedback.get("strengths").is_some());
        assert!(feedback.get("improvements").is_some());
        assert!(feedback.get("recommendations").is_some());
    }

    #[test]
    fn test_strengths_mention_matched_required() {
        let feedback = rule_based_feedback(&evidence(&["Python 경험"], &[], 0.8), Grade::Good);
        let strengths = feedback["strengths"].as_array().unwrap();
        assert!(strengths
            .iter()
            .any(|s| s.as_str().unwrap().contains("자격요건 1개 충족")));
        assert!(strengths
            .iter()
            .any(|s| s.as_str().unwrap().contains("높은 직무 유사도")));
    }

    #[test]
    fn test_improvements_list_missing_required() {
        let feedback = rule_based_feedback(
            &evidence(&[], &["Kubernetes 운영", "Kafka 경험"], 0.3),
            Grade::Caution,
        );
        let improvements = feedback["improvements"].as_array().unwrap();
        assert!(improvements
            .iter()
            .any(|s| s.as_str().unwrap().contains("부족한 자격요건 2개")));
        assert!(improvements
            .iter()
            .any(|s| s.as_str().unwrap().contains("Kubernetes")));
    }

    #[test]
    fn test_recommendations_vary_with_grade() {
        let fair = rule_based_feedback(&evidence(&[], &[], 0.6), Grade::Fair);
        assert!(fair["recommendations"]
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s.as_str().unwrap().contains("합격 가능성")));

        let poor = rule_based_feedback(&evidence(&[], &[], 0.6), Grade::Poor);
        assert!(poor["recommendations"]
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s.as_str().unwrap().contains("다른 공고")));
    }

    #[test]
    fn test_tech_suggestion_for_missing_stack() {
        let feedback = rule_based_feedback(
            &evidence(&[], &["Kubernetes 클러스터 운영 경험"], 0.6),
            Grade::Fair,
        );
        let recommendations = feedback["recommendations"].as_array().unwrap();
        assert!(recommendations
            .iter()
            .any(|s| s.as_str().unwrap().contains("kubernetes")));
    }

    #[test]
    fn test_has_required_keys() {
        assert!(has_required_keys(&json!({
            "strengths": [], "improvements": [], "recommendations": []
        })));
        assert!(!has_required_keys(&json!({"strengths": []})));
    }
}
