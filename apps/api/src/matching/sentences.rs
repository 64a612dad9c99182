//! Sentence store — DB-backed résumé/job sentences with embeddings, the
//! fallback collector for résumés the backfill job has not reached, and a
//! per-process single-flight cache.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;
use uuid::Uuid;

use crate::embedding::{normalized, zero_vector, EmbeddingClient};
use crate::matching::semantic::Condition;
use crate::models::job::JobSentenceRow;
use crate::models::resume::{ParsedResume, ResumeRow, ResumeSentenceRow};

/// Hard cap on résumé sentences entering the pipeline.
const MAX_SENTENCES: usize = 200;

/// A résumé's sentences with aligned sections and embeddings, ready for
/// similarity scoring.
#[derive(Debug, Clone, Default)]
pub struct ResumeSentences {
    pub lines: Vec<String>,
    pub sections: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
}

pub async fn count_resume_sentences(pool: &PgPool, resume_id: Uuid) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT COUNT(*) FROM resume_sentence WHERE resume_id = $1")
        .bind(resume_id)
        .fetch_one(pool)
        .await
}

pub async fn load_resume_sentence_rows(
    pool: &PgPool,
    resume_id: Uuid,
) -> sqlx::Result<Vec<ResumeSentenceRow>> {
    sqlx::query_as::<_, ResumeSentenceRow>(
        "SELECT * FROM resume_sentence WHERE resume_id = $1 ORDER BY idx ASC",
    )
    .bind(resume_id)
    .fetch_all(pool)
    .await
}

/// Conditions for one job section, carrying stored embeddings where the
/// backfill job produced them.
pub async fn load_job_section_conditions(
    pool: &PgPool,
    job_id: Uuid,
    section: &str,
) -> sqlx::Result<Vec<Condition>> {
    let rows = sqlx::query_as::<_, JobSentenceRow>(
        "SELECT * FROM job_sentence WHERE job_id = $1 AND section = $2 ORDER BY idx ASC",
    )
    .bind(job_id)
    .bind(section)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Condition {
            text: row.text,
            embedding: row.embedding.map(normalized),
        })
        .collect())
}

/// Raw-text line filter: collapsed whitespace, 20–300 chars, must contain a
/// space, no underscores (rejects key-like tokens), not a short ALL-CAPS
/// header.
pub fn filter_raw_line(line: &str) -> Option<String> {
    let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || !collapsed.contains(' ') {
        return None;
    }
    if collapsed.contains('_') {
        return None;
    }
    let char_count = collapsed.chars().count();
    let has_alpha = collapsed.chars().any(char::is_alphabetic);
    let all_upper = has_alpha
        && collapsed
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(char::is_uppercase);
    if all_upper && char_count <= 40 {
        return None;
    }
    if !(20..=300).contains(&char_count) {
        return None;
    }
    Some(collapsed)
}

/// Walks the parsed structure and raw text when no sentence rows exist.
/// Returns aligned (lines, sections), deduped, capped at `MAX_SENTENCES`.
pub fn collect_fallback_sentences(
    parsed: &ParsedResume,
    raw_text: &str,
) -> (Vec<String>, Vec<String>) {
    let mut lines: Vec<String> = Vec::new();
    let mut sections: Vec<String> = Vec::new();

    let add = |text: Option<&str>, section: &str, lines: &mut Vec<String>, sections: &mut Vec<String>| {
        let Some(text) = text else { return };
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let char_count = collapsed.chars().count();
        if (10..=300).contains(&char_count) {
            lines.push(collapsed);
            sections.push(section.to_string());
        }
    };

    add(parsed.summary.as_deref(), "summary", &mut lines, &mut sections);
    for skill in &parsed.skills {
        add(Some(skill.as_str()), "skills", &mut lines, &mut sections);
    }
    for work in &parsed.work_experience {
        add(work.company.as_deref(), "experience", &mut lines, &mut sections);
        add(work.title.as_deref(), "experience", &mut lines, &mut sections);
        add(work.description.as_deref(), "experience", &mut lines, &mut sections);
        for responsibility in &work.responsibilities {
            add(Some(responsibility.as_str()), "experience", &mut lines, &mut sections);
        }
    }
    for project in &parsed.projects {
        add(project.name.as_deref(), "projects", &mut lines, &mut sections);
        add(project.role.as_deref(), "projects", &mut lines, &mut sections);
        add(project.description.as_deref(), "projects", &mut lines, &mut sections);
        for responsibility in &project.responsibilities {
            add(Some(responsibility.as_str()), "projects", &mut lines, &mut sections);
        }
    }

    for line in raw_text.lines() {
        if let Some(sentence) = filter_raw_line(line) {
            lines.push(sentence);
            sections.push("raw".to_string());
        }
    }

    // dedupe preserving the first occurrence and its section
    let mut seen = HashSet::new();
    let mut out_lines = Vec::new();
    let mut out_sections = Vec::new();
    for (line, section) in lines.into_iter().zip(sections) {
        if !seen.insert(line.clone()) {
            continue;
        }
        out_lines.push(line);
        out_sections.push(section);
        if out_lines.len() >= MAX_SENTENCES {
            break;
        }
    }
    (out_lines, out_sections)
}

/// Per-process read-through cache of résumé sentences keyed by résumé id.
/// Single-flight per key: concurrent pair evaluations for the same résumé
/// share one load. Never a global — injected into the `Matcher`.
#[derive(Default)]
pub struct SentenceCache {
    cells: Mutex<HashMap<Uuid, Arc<OnceCell<Arc<ResumeSentences>>>>>,
}

impl SentenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_load(
        &self,
        pool: &PgPool,
        embedding: &EmbeddingClient,
        resume: &ResumeRow,
    ) -> Result<Arc<ResumeSentences>> {
        // The map lock is held only to fetch the cell; the load itself runs
        // without it so nothing blocks on an embedding await.
        let cell = {
            let mut cells = self.cells.lock().await;
            cells
                .entry(resume.id)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        let sentences = cell
            .get_or_try_init(|| async { load_sentences(pool, embedding, resume).await.map(Arc::new) })
            .await?;
        Ok(sentences.clone())
    }
}

async fn load_sentences(
    pool: &PgPool,
    embedding: &EmbeddingClient,
    resume: &ResumeRow,
) -> Result<ResumeSentences> {
    let rows = load_resume_sentence_rows(pool, resume.id).await?;

    let (lines, sections, stored): (Vec<String>, Vec<String>, Vec<Option<Vec<f32>>>) =
        if rows.is_empty() {
            debug!(
                "no sentence rows for resume {}, falling back to parsed structure",
                resume.id
            );
            let (lines, sections) = collect_fallback_sentences(&resume.parsed(), &resume.raw_text);
            let stored = vec![None; lines.len()];
            (lines, sections, stored)
        } else {
            let mut lines = Vec::with_capacity(rows.len());
            let mut sections = Vec::with_capacity(rows.len());
            let mut stored = Vec::with_capacity(rows.len());
            for row in rows {
                lines.push(row.text);
                sections.push(row.section.unwrap_or_else(|| "raw".to_string()));
                stored.push(row.embedding.map(normalized));
            }
            (lines, sections, stored)
        };

    // Only rows without a stored vector hit the embedding service.
    let missing: Vec<usize> = stored
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_none())
        .map(|(i, _)| i)
        .collect();
    let mut embeddings: Vec<Vec<f32>> = stored
        .into_iter()
        .map(|e| e.unwrap_or_default())
        .collect();
    if !missing.is_empty() {
        let texts: Vec<String> = missing.iter().map(|&i| lines[i].clone()).collect();
        match embedding.embed_batch(&texts).await {
            Ok(vectors) => {
                for (&i, vector) in missing.iter().zip(vectors) {
                    embeddings[i] = vector;
                }
            }
            Err(e) => {
                debug!("sentence embedding failed, degrading to zero vectors: {e}");
                for &i in &missing {
                    embeddings[i] = zero_vector();
                }
            }
        }
    }
    for vector in &mut embeddings {
        if vector.is_empty() {
            *vector = zero_vector();
        }
    }

    Ok(ResumeSentences {
        lines,
        sections,
        embeddings,
    })
}
