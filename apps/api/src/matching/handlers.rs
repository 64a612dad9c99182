//! Axum route handlers for the Matching API.

use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AppError;
use crate::matching::service::JobMatch;
use crate::models::job::{JobPostingRow, MatchFilters};
use crate::models::matching::{
    round1, ConditionAnalysis, Grade, MatchingEvidence, MatchingOutcome, Penalties,
};
use crate::models::resume::ResumeRow;
use crate::state::AppState;

const DEFAULT_SEARCH_LIMIT: usize = 50;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SearchJobsRequest {
    pub resume_id: Uuid,
    pub filters: Option<MatchFilters>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

#[derive(Debug, Serialize)]
pub struct SearchJobsResponse {
    pub resume_id: Uuid,
    pub matches: Vec<JobMatch>,
    pub total_count: usize,
    pub processing_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub experience_level: Option<String>,
    pub employment_type: Option<String>,
    pub salary_range: Option<String>,
    pub posted_at: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct ResumeSummary {
    pub id: Uuid,
    pub candidate_name: String,
}

#[derive(Debug, Serialize)]
pub struct OverallAssessment {
    pub score: f64,
    pub grade: Grade,
    pub description: &'static str,
    pub recommendation: &'static str,
}

#[derive(Debug, Serialize)]
pub struct QualificationDetail {
    pub score: f64,
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub match_rate: String,
    pub detailed_analysis: Vec<ConditionAnalysis>,
}

#[derive(Debug, Serialize)]
pub struct ExperienceFit {
    pub score: f64,
    pub required_years: f64,
    pub candidate_years: f64,
    pub level_match: bool,
    pub details: String,
}

#[derive(Debug, Serialize)]
pub struct SimilaritySummary {
    pub score: f64,
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DetailedAnalysis {
    pub required_qualifications: QualificationDetail,
    pub preferred_qualifications: QualificationDetail,
    pub experience_fit: ExperienceFit,
    pub overall_similarity: SimilaritySummary,
}

#[derive(Debug, Serialize)]
pub struct TechnicalDetails {
    pub algorithm_version: String,
    pub calculation_time_ms: u64,
    pub penalties_applied: Penalties,
}

#[derive(Debug, Serialize)]
pub struct MatchingDetailResponse {
    pub matching_id: String,
    pub job: JobSummary,
    pub resume: ResumeSummary,
    pub overall_assessment: OverallAssessment,
    pub detailed_analysis: DetailedAnalysis,
    pub strengths: Vec<String>,
    pub improvement_areas: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_feedback: Option<Value>,
    pub technical_details: TechnicalDetails,
}

#[derive(Debug, Serialize)]
pub struct SentenceMatchSet {
    pub required_conditions: Vec<ConditionAnalysis>,
    pub preferred_conditions: Vec<ConditionAnalysis>,
}

#[derive(Debug, Serialize)]
pub struct SentenceMatchSummary {
    pub total_required: usize,
    pub matched_required: usize,
    pub total_preferred: usize,
    pub matched_preferred: usize,
}

#[derive(Debug, Serialize)]
pub struct SentenceMatchesResponse {
    pub matching_id: String,
    pub job_title: String,
    pub resume_name: String,
    pub overall_score: f64,
    pub grade: Grade,
    pub sentence_matches: SentenceMatchSet,
    pub summary: SentenceMatchSummary,
}

#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    pub resume_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CompareResponse {
    pub job_id: Uuid,
    pub resume_id: Uuid,
    pub overall_score: f64,
    pub grade: Grade,
    pub category_scores: crate::models::matching::CategoryScores,
    pub matching_evidence: MatchingEvidence,
    pub penalties: Penalties,
    pub calculation_time_ms: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /matching/search-jobs
///
/// Scores the résumé against every active posting and returns the ranked
/// listing with recall tokens attached.
pub async fn handle_search_jobs(
    State(state): State<AppState>,
    Json(request): Json<SearchJobsRequest>,
) -> Result<Json<SearchJobsResponse>, AppError> {
    let started = Instant::now();

    let filters = request.filters.unwrap_or_default();
    let matches = state
        .matcher
        .search_jobs_for_resume(request.resume_id, &filters, request.limit)
        .await?;

    Ok(Json(SearchJobsResponse {
        resume_id: request.resume_id,
        total_count: matches.len(),
        matches,
        processing_time_ms: started.elapsed().as_millis() as u64,
    }))
}

/// GET /matching/:matching_id
///
/// Recalculates the matching for a recall token. No LLM feedback here to
/// keep the response fast.
pub async fn handle_matching_detail(
    State(state): State<AppState>,
    Path(matching_id): Path<String>,
) -> Result<Json<MatchingDetailResponse>, AppError> {
    let (job, resume, outcome) = recall_pair(&state, &matching_id, false).await?;
    Ok(Json(build_detail_response(
        matching_id,
        &job,
        &resume,
        outcome,
    )))
}

/// GET /matching/:matching_id/feedback
///
/// Same recalculation with on-demand narrative feedback attached.
pub async fn handle_matching_feedback(
    State(state): State<AppState>,
    Path(matching_id): Path<String>,
) -> Result<Json<MatchingDetailResponse>, AppError> {
    let (job, resume, outcome) = recall_pair(&state, &matching_id, true).await?;
    Ok(Json(build_detail_response(
        matching_id,
        &job,
        &resume,
        outcome,
    )))
}

/// GET /matching/sentence-matches/:matching_id
///
/// Per-condition sentence-level evidence for the UI drill-down.
pub async fn handle_sentence_matches(
    State(state): State<AppState>,
    Path(matching_id): Path<String>,
) -> Result<Json<SentenceMatchesResponse>, AppError> {
    let (job, resume, outcome) = recall_pair(&state, &matching_id, false).await?;

    let required = outcome
        .matching_evidence
        .required_skills
        .evidence
        .detailed_analysis;
    let preferred = outcome
        .matching_evidence
        .preferred_skills
        .evidence
        .detailed_analysis;

    let summary = SentenceMatchSummary {
        total_required: required.len(),
        matched_required: required.iter().filter(|a| a.matched).count(),
        total_preferred: preferred.len(),
        matched_preferred: preferred.iter().filter(|a| a.matched).count(),
    };

    Ok(Json(SentenceMatchesResponse {
        matching_id,
        job_title: job.title,
        resume_name: resume.file_name,
        overall_score: round1(outcome.overall_score * 100.0),
        grade: outcome.grade,
        sentence_matches: SentenceMatchSet {
            required_conditions: required,
            preferred_conditions: preferred,
        },
        summary,
    }))
}

/// GET /matching/compare/:job_id?resume_id=…
///
/// Raw scores, evidence and penalties for a specific pair, feedback
/// included.
pub async fn handle_compare(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Query(query): Query<CompareQuery>,
) -> Result<Json<CompareResponse>, AppError> {
    let job = state.matcher.fetch_job(job_id).await?;
    let resume = state.matcher.fetch_resume(query.resume_id).await?;
    let outcome = state.matcher.score_pair(&job, &resume, true).await?;

    Ok(Json(CompareResponse {
        job_id: outcome.job_id,
        resume_id: outcome.resume_id,
        overall_score: outcome.overall_score,
        grade: outcome.grade,
        category_scores: outcome.category_scores,
        matching_evidence: outcome.matching_evidence,
        penalties: outcome.penalties,
        calculation_time_ms: outcome.calculation_time_ms,
    }))
}

async fn recall_pair(
    state: &AppState,
    matching_id: &str,
    with_feedback: bool,
) -> Result<(JobPostingRow, ResumeRow, MatchingOutcome), AppError> {
    let (resume_id, job_id) = state.matcher.decode_token(matching_id)?;
    let job = state.matcher.fetch_job(job_id).await.map_err(not_found)?;
    let resume = state
        .matcher
        .fetch_resume(resume_id)
        .await
        .map_err(not_found)?;
    let outcome = state.matcher.score_pair(&job, &resume, with_feedback).await?;
    Ok((job, resume, outcome))
}

/// Unknown entities behind a valid token still surface as one 404 shape.
fn not_found(err: AppError) -> AppError {
    match err {
        AppError::NotFound(_) => AppError::NotFound("Job or Resume not found".to_string()),
        other => other,
    }
}

fn build_detail_response(
    matching_id: String,
    job: &JobPostingRow,
    resume: &ResumeRow,
    outcome: MatchingOutcome,
) -> MatchingDetailResponse {
    let evidence = &outcome.matching_evidence;
    let strengths = extract_strengths(evidence);
    let improvement_areas = extract_improvement_areas(evidence, &outcome.penalties);

    let qualification = |section: &crate::models::matching::SectionScore| QualificationDetail {
        score: round1(section.score * 100.0),
        matched_skills: section.evidence.matched.clone(),
        missing_skills: section.evidence.missing.clone(),
        match_rate: section.evidence.match_rate.clone(),
        detailed_analysis: section.evidence.detailed_analysis.clone(),
    };

    MatchingDetailResponse {
        matching_id,
        job: JobSummary {
            id: job.id,
            title: job.title.clone(),
            company: job
                .company_name
                .clone()
                .unwrap_or_else(|| "Unknown Company".to_string()),
            location: job.location.clone(),
            experience_level: job.experience_level.clone(),
            employment_type: job.employment_type.clone(),
            salary_range: job.salary_range(),
            posted_at: job.posted_at,
        },
        resume: ResumeSummary {
            id: resume.id,
            candidate_name: resume
                .candidate_name()
                .unwrap_or_else(|| "Unknown".to_string()),
        },
        overall_assessment: OverallAssessment {
            score: round1(outcome.overall_score * 100.0),
            grade: outcome.grade,
            description: grade_description(outcome.grade),
            recommendation: grade_recommendation(outcome.grade),
        },
        detailed_analysis: DetailedAnalysis {
            required_qualifications: qualification(&evidence.required_skills),
            preferred_qualifications: qualification(&evidence.preferred_skills),
            experience_fit: ExperienceFit {
                score: round1(evidence.experience_evidence.score * 100.0),
                required_years: evidence.experience_evidence.evidence.required_years,
                candidate_years: evidence.experience_evidence.evidence.candidate_years,
                level_match: evidence.experience_evidence.evidence.level_match,
                details: evidence.experience_evidence.evidence.details.clone(),
            },
            overall_similarity: SimilaritySummary {
                score: round1(evidence.similarity_score * 100.0),
                description: "전체적인 프로필과의 유사도",
            },
        },
        strengths,
        improvement_areas,
        ai_feedback: evidence.ai_feedback.clone(),
        technical_details: TechnicalDetails {
            algorithm_version: outcome.algorithm_version.clone(),
            calculation_time_ms: outcome.calculation_time_ms,
            penalties_applied: outcome.penalties.clone(),
        },
    }
}

fn grade_description(grade: Grade) -> &'static str {
    match grade {
        Grade::Excellent => "매우 우수한 매칭도입니다. 서류 통과 가능성이 높습니다.",
        Grade::Good => "양호한 매칭도입니다. 지원을 권장합니다.",
        Grade::Fair => "보통 수준의 매칭도입니다. 일부 조건을 보완하면 좋겠습니다.",
        Grade::Caution => "매칭도가 낮습니다. 조건을 충분히 검토해보세요.",
        Grade::Poor => "매칭도가 매우 낮습니다. 지원을 신중히 고려하세요.",
    }
}

fn grade_recommendation(grade: Grade) -> &'static str {
    match grade {
        Grade::Excellent | Grade::Good => "지원을 적극 권장합니다.",
        Grade::Fair => "지원 가능하지만 부족한 부분을 보완하면 더 좋겠습니다.",
        Grade::Caution => "신중히 검토 후 지원 여부를 결정하세요.",
        Grade::Poor => "현재 상태로는 지원이 어려울 수 있습니다.",
    }
}

fn extract_strengths(evidence: &MatchingEvidence) -> Vec<String> {
    let mut strengths = Vec::new();

    let required_matched = evidence.required_skills.evidence.matched.len();
    if required_matched > 0 {
        strengths.push(format!("필수 조건 {required_matched}개 충족"));
    }
    let preferred_matched = evidence.preferred_skills.evidence.matched.len();
    if preferred_matched > 0 {
        strengths.push(format!("우대 조건 {preferred_matched}개 충족"));
    }
    if evidence.experience_evidence.evidence.level_match {
        strengths.push("경력 레벨 적합".to_string());
    }

    strengths
}

fn extract_improvement_areas(evidence: &MatchingEvidence, penalties: &Penalties) -> Vec<String> {
    use crate::models::matching::PenaltyKind;

    let mut areas = Vec::new();

    let required_missing = &evidence.required_skills.evidence.missing;
    if !required_missing.is_empty() {
        let shown: Vec<&str> = required_missing.iter().take(3).map(String::as_str).collect();
        areas.push(format!("필수 스킬 부족: {}", shown.join(", ")));
    }

    let preferred_missing = &evidence.preferred_skills.evidence.missing;
    if !preferred_missing.is_empty() {
        let shown: Vec<&str> = preferred_missing.iter().take(2).map(String::as_str).collect();
        areas.push(format!("우대 스킬 부족: {}", shown.join(", ")));
    }

    if penalties
        .get(PenaltyKind::ExperienceSignificantlyLacking)
        .is_some()
    {
        areas.push("경력 부족으로 인한 감점".to_string());
    }

    areas
}
