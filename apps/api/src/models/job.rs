use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// A job posting joined with its company name.
/// Embeddings are stored as `real[]` columns and are unit-norm by ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobPostingRow {
    pub id: Uuid,
    pub company_id: Option<Uuid>,
    pub company_name: Option<String>,
    pub title: String,
    pub description: String,
    pub requirements: Option<Value>,
    pub qualifications: Option<Value>,
    pub responsibilities: Option<Value>,
    pub benefits: Option<Value>,
    pub employment_type: Option<String>,
    pub experience_level: Option<String>,
    pub min_experience_years: Option<f64>,
    pub max_experience_years: Option<f64>,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub salary_currency: Option<String>,
    pub location: Option<String>,
    pub parsed_skills: Option<Vec<String>>,
    pub embedding: Option<Vec<f32>>,
    pub is_active: bool,
    pub posted_at: Option<NaiveDate>,
}

/// Typed view of the `requirements` JSONB column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRequirements {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub preferred: Vec<String>,
}

impl JobPostingRow {
    pub fn requirements(&self) -> JobRequirements {
        self.requirements
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    pub fn parsed_skills(&self) -> &[String] {
        self.parsed_skills.as_deref().unwrap_or_default()
    }

    pub fn salary_range(&self) -> Option<String> {
        match (self.salary_min, self.salary_max) {
            (Some(min), Some(max)) => {
                let currency = self.salary_currency.as_deref().unwrap_or("KRW");
                Some(format!("{min}-{max} {currency}"))
            }
            _ => None,
        }
    }
}

/// One sentence of a job posting section, split and embedded by the
/// backfill job. `section` is one of `required`, `preferred`, `description`
/// (plus `experience` where the splitter emits it).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobSentenceRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub section: String,
    pub idx: i32,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
}

/// Optional search filters for job enumeration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchFilters {
    pub location: Option<String>,
    pub employment_type: Option<String>,
    pub experience_level: Option<String>,
    pub min_salary: Option<f64>,
    /// Upper bound on the years a posting may require.
    pub min_experience_years: Option<f64>,
    pub required_skills: Option<Vec<String>>,
}
