use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Secret for the HMAC-signed matching-id tokens.
    pub jwt_secret_key: String,
    pub embedding_service_url: String,
    pub embedding_model: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub port: u16,
    pub rust_log: String,
    pub weights: MatchWeights,
    pub grade_thresholds: GradeThresholds,
    pub penalties: PenaltyConfig,
}

/// Effective coefficients for the weighted category sum.
/// They do not have to sum to 1.
#[derive(Debug, Clone, Copy)]
pub struct MatchWeights {
    pub required_match: f64,
    pub experience_match: f64,
    pub overall_similarity: f64,
    pub preferred_match: f64,
    pub education: f64,
    pub certification: f64,
    pub language: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            required_match: 0.40,
            experience_match: 0.30,
            overall_similarity: 0.20,
            preferred_match: 0.08,
            education: 0.015,
            certification: 0.005,
            language: 0.0,
        }
    }
}

/// Lower bounds of the grade buckets; anything below `caution` is `poor`.
#[derive(Debug, Clone, Copy)]
pub struct GradeThresholds {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
    pub caution: f64,
}

impl Default for GradeThresholds {
    fn default() -> Self {
        Self {
            excellent: 0.85,
            good: 0.70,
            fair: 0.55,
            caution: 0.40,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PenaltyConfig {
    pub experience_level_mismatch: f64,
    pub experience_significantly_lacking: f64,
    /// Maximum magnitude; the emitted value scales with the missing ratio.
    pub required_skill_critical_missing: f64,
    /// Reserved kind; not emitted by the current pipeline.
    pub required_skill_missing: f64,
    /// Combined cap for the two experience-family penalties.
    pub experience_penalty_cap: f64,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            experience_level_mismatch: 0.25,
            experience_significantly_lacking: 0.20,
            required_skill_critical_missing: 0.25,
            required_skill_missing: 0.15,
            experience_penalty_cap: 0.15,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = MatchWeights::default();
        let weights = MatchWeights {
            required_match: env_f64("WEIGHT_REQUIRED_MATCH", defaults.required_match)?,
            experience_match: env_f64("WEIGHT_EXPERIENCE_MATCH", defaults.experience_match)?,
            overall_similarity: env_f64("WEIGHT_OVERALL_SIMILARITY", defaults.overall_similarity)?,
            preferred_match: env_f64("WEIGHT_PREFERRED_MATCH", defaults.preferred_match)?,
            education: env_f64("WEIGHT_EDUCATION", defaults.education)?,
            certification: env_f64("WEIGHT_CERTIFICATION", defaults.certification)?,
            language: env_f64("WEIGHT_LANGUAGE", defaults.language)?,
        };

        let grade_defaults = GradeThresholds::default();
        let grade_thresholds = GradeThresholds {
            excellent: env_f64("GRADE_EXCELLENT", grade_defaults.excellent)?,
            good: env_f64("GRADE_GOOD", grade_defaults.good)?,
            fair: env_f64("GRADE_FAIR", grade_defaults.fair)?,
            caution: env_f64("GRADE_CAUTION", grade_defaults.caution)?,
        };

        let penalty_defaults = PenaltyConfig::default();
        let penalties = PenaltyConfig {
            experience_level_mismatch: env_f64(
                "PENALTY_EXPERIENCE_LEVEL_MISMATCH",
                penalty_defaults.experience_level_mismatch,
            )?,
            experience_significantly_lacking: env_f64(
                "PENALTY_EXPERIENCE_SIGNIFICANTLY_LACKING",
                penalty_defaults.experience_significantly_lacking,
            )?,
            required_skill_critical_missing: env_f64(
                "PENALTY_REQUIRED_SKILL_CRITICAL_MISSING",
                penalty_defaults.required_skill_critical_missing,
            )?,
            required_skill_missing: env_f64(
                "PENALTY_REQUIRED_SKILL_MISSING",
                penalty_defaults.required_skill_missing,
            )?,
            experience_penalty_cap: env_f64(
                "EXPERIENCE_PENALTY_CAP",
                penalty_defaults.experience_penalty_cap,
            )?,
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            jwt_secret_key: require_env("JWT_SECRET_KEY")?,
            embedding_service_url: require_env("EMBEDDING_SERVICE_URL")?,
            embedding_model: std::env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "jhgan/ko-sroberta-multitask".to_string()),
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            weights,
            grade_thresholds,
            penalties,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_f64(key: &str, default: f64) -> Result<f64> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<f64>()
            .with_context(|| format!("Environment variable '{key}' must be a number")),
        Err(_) => Ok(default),
    }
}
