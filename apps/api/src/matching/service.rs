//! Matching orchestrator — runs the pair pipeline, aggregates category
//! scores with the hard gate and penalties, and fans out over active
//! postings for search.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::{cosine_similarity, normalized, EmbeddingClient};
use crate::errors::AppError;
use crate::matching::experience::calculate_experience_score;
use crate::matching::feedback::FeedbackGenerator;
use crate::matching::penalties::calculate_penalties;
use crate::matching::semantic::{score_section, Condition, ScoredSection};
use crate::matching::sentences::{
    count_resume_sentences, load_job_section_conditions, SentenceCache,
};
use crate::matching::skill::calculate_skill_score;
use crate::matching::token::{decode_matching_id, encode_matching_id, TokenError};
use crate::models::job::{JobPostingRow, MatchFilters};
use crate::models::matching::{
    round1, CategoryScores, ExperienceCategory, Grade, MatchingEvidence, MatchingOutcome,
    Penalties, SectionScore, SectionalScores, WeightedScore, ALGORITHM_VERSION,
};
use crate::models::resume::ResumeRow;

const JOB_SELECT: &str = "SELECT j.id, j.company_id, c.name AS company_name, j.title, \
     j.description, j.requirements, j.qualifications, j.responsibilities, j.benefits, \
     j.employment_type, j.experience_level, j.min_experience_years, j.max_experience_years, \
     j.salary_min, j.salary_max, j.salary_currency, j.location, j.parsed_skills, j.embedding, \
     j.is_active, j.posted_at \
     FROM job_posting j LEFT JOIN company c ON c.id = j.company_id";

/// One row of the search listing, scores percentage-scaled for the UI.
#[derive(Debug, Clone, Serialize)]
pub struct JobMatch {
    pub matching_id: String,
    pub job_id: Uuid,
    pub job_title: String,
    pub company_name: Option<String>,
    pub location: Option<String>,
    pub experience_level: Option<String>,
    pub overall_score: f64,
    pub grade: Grade,
    pub category_scores: BTreeMap<&'static str, WeightedScore>,
    pub matching_evidence: MatchingEvidence,
    pub penalties: Penalties,
}

pub struct Matcher {
    pool: PgPool,
    embedding: EmbeddingClient,
    config: Config,
    cache: SentenceCache,
    feedback: Arc<dyn FeedbackGenerator>,
}

impl Matcher {
    pub fn new(
        pool: PgPool,
        embedding: EmbeddingClient,
        config: Config,
        feedback: Arc<dyn FeedbackGenerator>,
    ) -> Self {
        Self {
            pool,
            embedding,
            config,
            cache: SentenceCache::new(),
            feedback,
        }
    }

    pub fn encode_token(&self, resume_id: Uuid, job_id: Uuid) -> String {
        encode_matching_id(&self.config.jwt_secret_key, resume_id, job_id)
    }

    pub fn decode_token(&self, token: &str) -> Result<(Uuid, Uuid), TokenError> {
        decode_matching_id(&self.config.jwt_secret_key, token)
    }

    pub async fn fetch_job(&self, job_id: Uuid) -> Result<JobPostingRow, AppError> {
        sqlx::query_as::<_, JobPostingRow>(&format!("{JOB_SELECT} WHERE j.id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job not found: {job_id}")))
    }

    pub async fn fetch_resume(&self, resume_id: Uuid) -> Result<ResumeRow, AppError> {
        sqlx::query_as::<_, ResumeRow>(
            "SELECT id, user_id, file_name, raw_text, parsed_data, extracted_skills, \
             extracted_experience_years, extracted_education_level, extracted_domains, embedding \
             FROM resume WHERE id = $1",
        )
        .bind(resume_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Resume not found: {resume_id}")))
    }

    async fn list_active_jobs(
        &self,
        filters: &MatchFilters,
    ) -> Result<Vec<JobPostingRow>, AppError> {
        let mut query = QueryBuilder::<Postgres>::new(JOB_SELECT);
        query.push(" WHERE j.is_active = TRUE");
        if let Some(location) = &filters.location {
            query.push(" AND j.location ILIKE ");
            query.push_bind(format!("%{location}%"));
        }
        if let Some(employment_type) = &filters.employment_type {
            query.push(" AND j.employment_type = ");
            query.push_bind(employment_type.clone());
        }
        if let Some(experience_level) = &filters.experience_level {
            query.push(" AND j.experience_level = ");
            query.push_bind(experience_level.clone());
        }
        if let Some(min_salary) = filters.min_salary {
            query.push(" AND j.salary_min >= ");
            query.push_bind(min_salary);
        }
        if let Some(max_required_years) = filters.min_experience_years {
            query.push(" AND j.min_experience_years <= ");
            query.push_bind(max_required_years);
        }
        if let Some(required_skills) = &filters.required_skills {
            query.push(" AND j.parsed_skills @> ");
            query.push_bind(required_skills.clone());
        }
        query.push(" ORDER BY j.posted_at DESC NULLS LAST");

        Ok(query
            .build_query_as::<JobPostingRow>()
            .fetch_all(&self.pool)
            .await?)
    }

    /// Full pair pipeline. Pure modulo the sentence cache and embedding
    /// client; running it twice on unchanged inputs yields identical output
    /// apart from `calculation_time_ms`.
    pub async fn score_pair(
        &self,
        job: &JobPostingRow,
        resume: &ResumeRow,
        with_feedback: bool,
    ) -> Result<MatchingOutcome, AppError> {
        let started = Instant::now();

        let sentences = self
            .cache
            .get_or_load(&self.pool, &self.embedding, resume)
            .await
            .map_err(AppError::Internal)?;

        // Conditions come from the sentence store, falling back to the
        // posting's raw requirement lists for sections the splitter missed.
        let requirements = job.requirements();
        let (required_rows, preferred_rows, experience_rows) = tokio::try_join!(
            load_job_section_conditions(&self.pool, job.id, "required"),
            load_job_section_conditions(&self.pool, job.id, "preferred"),
            load_job_section_conditions(&self.pool, job.id, "experience"),
        )?;
        let required_conditions = fallback_conditions(required_rows, &requirements.required);
        let preferred_conditions = fallback_conditions(preferred_rows, &requirements.preferred);

        let (required_out, preferred_out, experience_semantic) = tokio::join!(
            score_section(
                &self.embedding,
                ScoredSection::Required,
                &required_conditions,
                &sentences,
            ),
            score_section(
                &self.embedding,
                ScoredSection::Preferred,
                &preferred_conditions,
                &sentences,
            ),
            score_section(
                &self.embedding,
                ScoredSection::Experience,
                &experience_rows,
                &sentences,
            ),
        );

        let overall_similarity = match (&job.embedding, &resume.embedding) {
            (Some(job_vec), Some(resume_vec)) => cosine_similarity(
                &normalized(job_vec.clone()),
                &normalized(resume_vec.clone()),
            ),
            _ => 0.5,
        };

        let skills_lower = resume.skills_lower();
        let required_texts: Vec<String> =
            required_conditions.iter().map(|c| c.text.clone()).collect();
        let preferred_texts: Vec<String> =
            preferred_conditions.iter().map(|c| c.text.clone()).collect();
        let skill = calculate_skill_score(
            &required_texts,
            &preferred_texts,
            job.parsed_skills(),
            &skills_lower,
        );

        let min_years = job.min_experience_years.unwrap_or(0.0);
        let experience = calculate_experience_score(
            min_years,
            job.max_experience_years,
            resume.candidate_years(),
            job.experience_level.as_deref(),
        );

        // 학력/자격증/언어 파싱은 아직 없으므로 중립값
        let education_score = 0.5;
        let certification_score = 0.5;
        let language_score = 0.5;

        // An empty required section is neutral rather than disqualifying.
        let required_score = if required_conditions.is_empty() {
            0.5
        } else {
            required_out.score
        };

        let weights = &self.config.weights;
        let category_scores = CategoryScores {
            required_match: SectionScore {
                score: required_score,
                weight: weights.required_match,
                evidence: required_out.evidence.clone(),
            },
            preferred_match: SectionScore {
                score: preferred_out.score,
                weight: weights.preferred_match,
                evidence: preferred_out.evidence.clone(),
            },
            experience_match: ExperienceCategory {
                score: experience.score,
                weight: weights.experience_match,
                evidence: experience.evidence.clone(),
            },
            overall_similarity: WeightedScore {
                score: overall_similarity,
                weight: weights.overall_similarity,
            },
            education: WeightedScore {
                score: education_score,
                weight: weights.education,
            },
            certification: WeightedScore {
                score: certification_score,
                weight: weights.certification,
            },
            language: WeightedScore {
                score: language_score,
                weight: weights.language,
            },
        };

        let penalties = calculate_penalties(
            job.experience_level.as_deref(),
            min_years,
            resume.candidate_years(),
            &required_texts,
            &skills_lower,
            &self.config.penalties,
        );

        let final_score = apply_gate_and_penalties(
            category_scores.weighted_sum(),
            required_score,
            penalties.total(),
        );
        let grade = Grade::assign(final_score, &self.config.grade_thresholds);

        let mut matching_evidence = MatchingEvidence {
            required_skills: category_scores.required_match.clone(),
            preferred_skills: category_scores.preferred_match.clone(),
            experience_evidence: category_scores.experience_match.clone(),
            sectional_scores: SectionalScores {
                required_embedding: required_out.score,
                preferred_embedding: preferred_out.score,
                experience_embedding: experience_semantic.score,
            },
            similarity_score: overall_similarity,
            difficulty_factor: skill.difficulty_factor,
            skill_keywords: skill,
            ai_feedback: None,
        };

        if with_feedback {
            match self
                .feedback
                .generate(job, resume, &matching_evidence, final_score, grade)
                .await
            {
                Ok(feedback) => matching_evidence.ai_feedback = Some(feedback),
                Err(e) => {
                    warn!("feedback generation failed: {e}");
                    matching_evidence.ai_feedback =
                        Some(json!("피드백 생성 중 오류가 발생했습니다."));
                }
            }
        }

        info!(
            "matching: {} x {} = {:.1}% ({})",
            job.title,
            resume.file_name,
            final_score * 100.0,
            grade.as_str()
        );

        Ok(MatchingOutcome {
            job_id: job.id,
            resume_id: resume.id,
            overall_score: final_score,
            grade,
            category_scores,
            matching_evidence,
            penalties,
            algorithm_version: ALGORITHM_VERSION.to_string(),
            calculation_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Scores the résumé against every active posting (optionally filtered)
    /// and returns the listing sorted by score. Per-job failures are logged
    /// and skipped; the search still succeeds with what was computed.
    pub async fn search_jobs_for_resume(
        &self,
        resume_id: Uuid,
        filters: &MatchFilters,
        limit: usize,
    ) -> Result<Vec<JobMatch>, AppError> {
        let resume = self.fetch_resume(resume_id).await?;

        let sentence_count = count_resume_sentences(&self.pool, resume.id).await?;
        if sentence_count == 0 {
            return Err(AppError::NotFound(format!(
                "Resume has no sentence embeddings: {resume_id}"
            )));
        }

        info!("searching jobs for resume: {}", resume.file_name);
        let jobs = self.list_active_jobs(filters).await?;
        info!("scanning all jobs for matching: count={}", jobs.len());

        let resume_ref = &resume;
        let mut matches: Vec<JobMatch> = stream::iter(jobs)
            .map(|job| async move {
                match self.score_pair(&job, resume_ref, false).await {
                    Ok(outcome) => Some(self.to_job_match(&job, outcome)),
                    Err(e) => {
                        error!("error calculating match for job {}: {e}", job.id);
                        None
                    }
                }
            })
            .buffer_unordered(worker_count())
            .filter_map(|result| async move { result })
            .collect()
            .await;

        sort_matches(&mut matches);
        matches.truncate(limit);
        Ok(matches)
    }

    fn to_job_match(&self, job: &JobPostingRow, outcome: MatchingOutcome) -> JobMatch {
        JobMatch {
            matching_id: self.encode_token(outcome.resume_id, outcome.job_id),
            job_id: job.id,
            job_title: job.title.clone(),
            company_name: job.company_name.clone(),
            location: job.location.clone(),
            experience_level: job.experience_level.clone(),
            overall_score: round1(outcome.overall_score * 100.0),
            grade: outcome.grade,
            category_scores: outcome.category_scores.to_percentages(),
            matching_evidence: outcome.matching_evidence,
            penalties: outcome.penalties,
        }
    }
}

fn fallback_conditions(rows: Vec<Condition>, raw: &[String]) -> Vec<Condition> {
    if rows.is_empty() {
        raw.iter().map(|text| Condition::bare(text)).collect()
    } else {
        rows
    }
}

/// Hard gate (50% cut when required-match fails) followed by penalty
/// subtraction, floored at zero.
fn apply_gate_and_penalties(weighted_sum: f64, required_score: f64, penalty_total: f64) -> f64 {
    let gated = if required_score < 0.5 {
        weighted_sum * 0.5
    } else {
        weighted_sum
    };
    (gated - penalty_total).max(0.0)
}

/// Deterministic ranking: score descending, ties broken by job id.
fn sort_matches(matches: &mut [JobMatch]) {
    matches.sort_by(|a, b| {
        b.overall_score
            .partial_cmp(&a.overall_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.job_id.cmp(&b.job_id))
    });
}

fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
