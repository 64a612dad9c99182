//! Skill lexicon — canonical vocabulary, synonym expansion, and condition
//! normalization. Everything here is pure and table-driven.

use std::collections::BTreeSet;
use std::collections::HashSet;

/// Canonical skill vocabulary (lower-cased). Matching is substring-based
/// against lower-cased condition text.
pub const SKILL_TOKENS: &[&str] = &[
    // 프로그래밍 언어
    "python", "java", "javascript", "typescript", "kotlin", "go", "rust",
    "c++", "c#", "php", "ruby", "swift", "scala", "html", "css",
    // 프레임워크 & 라이브러리
    "react", "vue", "angular", "svelte", "next.js", "nuxt.js", "react.js", "vue.js",
    "redux", "recoil", "zustand", "mobx", "react query", "tanstack query",
    "django", "flask", "fastapi", "spring", "spring boot", "springboot",
    "express", "nestjs", "nodejs", "node.js", "express.js",
    "jetpack compose", "rxjava", "coroutine",
    // CSS 프레임워크
    "tailwind", "tailwind css", "sass", "scss", "styled-components",
    "bootstrap", "mui", "material-ui", "ant design",
    // 데이터베이스
    "mysql", "postgresql", "postgres", "mongodb", "redis", "elasticsearch",
    "oracle", "mssql", "mariadb", "dynamodb", "cassandra",
    // 클라우드/인프라
    "aws", "azure", "gcp", "docker", "kubernetes", "k8s",
    "terraform", "ansible", "jenkins", "github actions",
    "gitlab ci", "circleci", "travis ci", "ec2", "s3", "rds",
    // 도구 & 테스팅
    "git", "jira", "confluence", "slack", "notion",
    "figma", "sketch", "zeplin", "grafana", "prometheus",
    "jest", "cypress", "junit", "mockito", "storybook",
    "sentry", "datadog",
    // AI/ML
    "llm", "langchain", "pytorch", "tensorflow", "scikit-learn",
    "huggingface", "openai", "rag", "vector db", "embedding",
    // 데이터
    "airflow", "kafka", "rabbitmq", "spark", "hadoop", "etl",
    // 기타
    "rest api", "restful api", "graphql", "grpc", "websocket",
    "microservices", "msa", "ci/cd", "tdd", "agile", "nginx",
];

/// Tokens that keep their `.js` suffix when canonicalized.
const KEEP_JS: &[&str] = &["next.js", "vue.js", "node.js", "express.js", "nuxt.js", "swiper.js"];

/// Synonym / paraphrase expansion applied during condition normalization.
const SYNONYMS: &[(&str, &[&str])] = &[
    (
        "rest api",
        &[
            "restful api",
            "api 연동",
            "api integration",
            "서비스 연동",
            "openapi",
            "swagger",
            "api 명세",
            "엔드포인트",
        ],
    ),
    (
        "api 설계",
        &["api 디자인", "api 디자인 원칙", "엔드포인트 설계", "리소스 모델링"],
    ),
    ("openapi", &["swagger", "api 명세", "api 문서화"]),
    (
        "ci/cd",
        &[
            "cicd",
            "배포 파이프라인",
            "지속적 통합",
            "지속적 배포",
            "배포 자동화",
            "pipeline",
            "github actions",
            "gitlab ci",
            "jenkins",
        ],
    ),
    (
        "sql",
        &["데이터 모델링", "erd", "정규화", "인덱스", "인덱싱", "트랜잭션", "join", "rdbms"],
    ),
    ("rdbms", &["관계형 db", "스키마 설계", "sql"]),
    (
        "테스트",
        &["테스트 자동화", "단위 테스트", "통합 테스트", "e2e 테스트", "coverage", "커버리지", "품질"],
    ),
    ("cloud", &["클라우드", "aws", "gcp", "azure"]),
];

/// Separators that break a condition phrase into atomic sub-conditions.
const SEPARATORS: &[&str] = &["/", ",", "·", " 및 ", " and ", " 또는 ", " or "];

const SQL_FAMILY: &[&str] = &[
    "sql", "rdbms", "데이터 모델링", "erd", "정규화", "인덱스", "트랜잭션", "join",
];

const TEST_FAMILY: &[&str] = &[
    "테스트", "단위 테스트", "통합 테스트", "e2e", "coverage", "jest", "pytest", "junit", "cypress",
];

/// Canonical form of a skill token: lower-cased, `.js` stripped except for
/// the keep-list.
pub fn canonicalize(token: &str) -> String {
    let lower = token.trim().to_lowercase();
    if KEEP_JS.contains(&lower.as_str()) {
        return lower;
    }
    match lower.strip_suffix(".js") {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => lower,
    }
}

/// Decomposes each condition into atomic sub-conditions, expands synonyms
/// and family rules, and deduplicates preserving first-seen order.
pub fn normalize_conditions(conditions: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();

    for condition in conditions {
        let base = condition.trim();
        if base.is_empty() {
            continue;
        }

        // 1차 분해: 구분자 기준 쪼개기
        let mut parts = vec![base.to_string()];
        for separator in SEPARATORS {
            let mut next = Vec::new();
            for part in parts {
                if part.contains(separator) {
                    next.extend(
                        part.split(separator)
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_string),
                    );
                } else {
                    next.push(part);
                }
            }
            parts = next;
        }

        // 동의어 확장
        for part in &parts {
            out.push(part.clone());
            let lower = part.to_lowercase();
            for (key, expansions) in SYNONYMS {
                if lower.contains(key) {
                    out.extend(expansions.iter().map(|s| s.to_string()));
                }
            }
        }

        let lower_all = base.to_lowercase();
        // "REST API 설계/연동" 류는 원자 항목으로 보강
        if lower_all.contains("api") && (base.contains("연동") || base.contains("설계")) {
            out.extend(["REST API", "API 설계", "서비스 연동"].map(String::from));
        }
        if SQL_FAMILY.iter().any(|k| lower_all.contains(k)) {
            out.extend(["SQL", "RDBMS", "데이터 모델링", "인덱스", "트랜잭션"].map(String::from));
        }
        if TEST_FAMILY.iter().any(|k| lower_all.contains(k)) {
            out.extend(["테스트", "테스트 자동화", "단위 테스트", "통합 테스트"].map(String::from));
        }
    }

    // 중복 제거 (순서 보존)
    let mut seen = HashSet::new();
    out.retain(|item| !item.is_empty() && seen.insert(item.clone()));
    out
}

/// Extracts canonical skill tokens mentioned in the given conditions.
pub fn extract_skill_tokens(conditions: &[String]) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    for condition in conditions {
        let lower = condition.to_lowercase();
        for token in SKILL_TOKENS {
            if lower.contains(token) {
                tokens.insert(canonicalize(token));
            }
        }
    }
    tokens
}

/// True when any lexicon token appears in both the condition text and the
/// candidate's (canonical, lower-cased) skill set.
pub fn condition_matches_skills(condition: &str, skills_lower: &HashSet<String>) -> bool {
    let lower = condition.to_lowercase();
    SKILL_TOKENS.iter().any(|token| {
        lower.contains(token)
            && (skills_lower.contains(*token) || skills_lower.contains(&canonicalize(token)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conditions(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_canonicalize_strips_js_suffix() {
        assert_eq!(canonicalize("React.js"), "react");
        assert_eq!(canonicalize("Backbone.js"), "backbone");
    }

    #[test]
    fn test_canonicalize_keeps_keep_list() {
        assert_eq!(canonicalize("Next.js"), "next.js");
        assert_eq!(canonicalize("node.js"), "node.js");
        assert_eq!(canonicalize("Swiper.js"), "swiper.js");
    }

    #[test]
    fn test_atomic_split_on_separators() {
        let normalized = normalize_conditions(&conditions(&["Python 및 Django 경험"]));
        assert!(normalized.contains(&"Python".to_string()));
        assert!(normalized.contains(&"Django 경험".to_string()));
    }

    #[test]
    fn test_split_on_slash_and_comma() {
        let normalized = normalize_conditions(&conditions(&["React, Vue"]));
        assert!(normalized.contains(&"React".to_string()));
        assert!(normalized.contains(&"Vue".to_string()));

        let normalized = normalize_conditions(&conditions(&["MySQL or PostgreSQL"]));
        assert!(normalized.contains(&"MySQL".to_string()));
        assert!(normalized.contains(&"PostgreSQL".to_string()));
    }

    #[test]
    fn test_synonym_expansion_rest_api() {
        let normalized = normalize_conditions(&conditions(&["REST API 개발 경험"]));
        assert!(normalized.contains(&"restful api".to_string()));
        assert!(normalized.contains(&"swagger".to_string()));
        assert!(normalized.contains(&"엔드포인트".to_string()));
    }

    #[test]
    fn test_api_design_rule_augment() {
        let normalized = normalize_conditions(&conditions(&["외부 API 연동 경험"]));
        assert!(normalized.contains(&"REST API".to_string()));
        assert!(normalized.contains(&"API 설계".to_string()));
        assert!(normalized.contains(&"서비스 연동".to_string()));
    }

    #[test]
    fn test_sql_family_augment() {
        let normalized = normalize_conditions(&conditions(&["ERD 설계 가능자"]));
        assert!(normalized.contains(&"SQL".to_string()));
        assert!(normalized.contains(&"RDBMS".to_string()));
        assert!(normalized.contains(&"트랜잭션".to_string()));
    }

    #[test]
    fn test_test_family_augment() {
        let normalized = normalize_conditions(&conditions(&["pytest 기반 테스트 작성"]));
        assert!(normalized.contains(&"테스트 자동화".to_string()));
        assert!(normalized.contains(&"통합 테스트".to_string()));
    }

    #[test]
    fn test_dedupe_preserves_first_seen_order() {
        let normalized = normalize_conditions(&conditions(&["Python", "Python"]));
        assert_eq!(normalized.iter().filter(|c| *c == "Python").count(), 1);
        assert_eq!(normalized[0], "Python");
    }

    #[test]
    fn test_empty_and_blank_conditions_are_dropped() {
        let normalized = normalize_conditions(&conditions(&["", "   "]));
        assert!(normalized.is_empty());
    }

    #[test]
    fn test_extract_skill_tokens() {
        let tokens = extract_skill_tokens(&conditions(&[
            "Python 3년 이상 경험이 있는 분",
            "AWS 환경에서의 운영 경험",
        ]));
        assert!(tokens.contains("python"));
        assert!(tokens.contains("aws"));
        assert!(!tokens.contains("java"));
    }

    #[test]
    fn test_condition_matches_skills() {
        let skills: HashSet<String> = ["python".to_string()].into();
        assert!(condition_matches_skills("Python 백엔드 개발", &skills));
        assert!(!condition_matches_skills("Java 백엔드 개발", &skills));
    }

    #[test]
    fn test_condition_matches_skills_via_canonical_js() {
        let skills: HashSet<String> = ["react".to_string()].into();
        assert!(condition_matches_skills("React.js 경험", &skills));
    }
}
