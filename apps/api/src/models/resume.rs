use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::matching::lexicon;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub file_name: String,
    pub raw_text: String,
    pub parsed_data: Option<Value>,
    pub extracted_skills: Option<Vec<String>>,
    pub extracted_experience_years: Option<f64>,
    pub extracted_education_level: Option<String>,
    pub extracted_domains: Option<Vec<String>>,
    pub embedding: Option<Vec<f32>>,
}

impl ResumeRow {
    /// Candidate skills as lower-cased canonical tokens.
    pub fn skills_lower(&self) -> HashSet<String> {
        self.extracted_skills
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|s| lexicon::canonicalize(s))
            .collect()
    }

    pub fn candidate_years(&self) -> f64 {
        self.extracted_experience_years.unwrap_or(0.0).max(0.0)
    }

    pub fn candidate_name(&self) -> Option<String> {
        self.parsed_data
            .as_ref()?
            .get("personal_info")?
            .get("name")?
            .as_str()
            .map(str::to_string)
    }

    /// Typed view of the parsed JSONB structure; missing or malformed
    /// sections simply come back empty.
    pub fn parsed(&self) -> ParsedResume {
        self.parsed_data
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }
}

/// One sentence of a résumé, split and embedded by the backfill job.
/// `section` is `summary | skills | experience | projects | raw` or NULL
/// for sentences the splitter could not attribute.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeSentenceRow {
    pub id: Uuid,
    pub resume_id: Uuid,
    pub section: Option<String>,
    pub idx: i32,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
}

/// Structured résumé content used by the fallback sentence collector when
/// no sentence rows exist for a résumé.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParsedResume {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub work_experience: Vec<WorkExperience>,
    #[serde(default)]
    pub projects: Vec<ProjectEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkExperience {
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub responsibilities: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub responsibilities: Vec<String>,
}
