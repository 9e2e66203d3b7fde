//! Heuristic document enrichment.
//!
//! Each classifier is a pure function over `(name, content, path)` backed by
//! an ordered pattern table; the first matching row wins for single-label
//! classifiers, every matching row contributes for multi-label ones.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{ComplexityTier, Document, Enrichment, Maintainability, SourceType};
use crate::patterns::{all_labels, compile, first_label, Field, Rule};

const DEFAULT_PURPOSE: &str = "general";
const DEFAULT_CATEGORY: &str = "general";

/// Lines longer than this count against maintainability.
const LONG_LINE: usize = 120;

fn purpose_rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            Rule::new(Field::Path, r"(?i)(^|/)(tests?|spec|__tests__)/|_test\.\w+$|\.test\.\w+$|\.spec\.\w+$|(^|/)test_\w+\.py$", "test"),
            Rule::new(Field::Content, r"#\[(tokio::)?test\]|\bdef test_\w+|\bdescribe\(|\bit\(\s*['\x22]|@Test\b", "test"),
            Rule::new(Field::Path, r"(?i)(^|/)migrations?/|\.sql$", "database_migration"),
            Rule::new(Field::Path, r"(?i)(^|/)(Dockerfile|Makefile|build\.rs|build\.gradle|package\.json|Cargo\.toml|setup\.py|pyproject\.toml)$", "build_script"),
            Rule::new(Field::Path, r"(?i)\.(toml|ya?ml|ini|cfg|conf|env)$|(^|/)config(uration)?[/._]", "configuration"),
            Rule::new(Field::Content, r"(?i)\b(login|logout|authenticat\w*|authoriz\w*|jwt|oauth|password_hash|session_token)\b", "authentication"),
            Rule::new(Field::Content, r"(?i)@(app|router)\.(get|post|put|delete|patch)\b|\b(Router::new|HttpResponse|app\.(get|post)\(|@RequestMapping|@GetMapping|@PostMapping)", "api_endpoint"),
            Rule::new(Field::Path, r"(?i)(^|/)(routes?|handlers?|controllers?|endpoints?|api)/", "api_endpoint"),
            Rule::new(Field::Path, r"(?i)(^|/)(models?|entities|schemas?)[/.]", "data_model"),
            Rule::new(Field::Content, r"(?i)\b(class \w+\(\s*(models\.Model|Base|BaseModel)\s*\)|#\[derive\([^)]*Serialize|@Entity\b)", "data_model"),
            Rule::new(Field::Path, r"(?i)\.(jsx|tsx|vue|svelte)$|(^|/)components?/", "ui_component"),
            Rule::new(Field::Path, r"(?i)(^|/)(utils?|helpers?|common|lib)[/.]", "utility"),
            Rule::new(Field::Path, r"(?i)\.(md|rst|adoc|txt)$|(^|/)docs?/", "documentation"),
            Rule::new(Field::Content, r"(?i)invoice|payment|ledger|checkout|billing|pricing|inventory|customer|\border", "business_logic"),
        ]
    })
}

fn category_rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            Rule::new(Field::Path, r"(?i)(^|/)(tests?|spec|__tests__)/|_test\.\w+$|\.(test|spec)\.\w+$", "testing"),
            Rule::new(Field::Path, r"(?i)(^|/)(\.github|\.gitlab|deploy|infra|terraform|k8s|helm|ansible)/|Dockerfile$|\.tf$", "infrastructure"),
            Rule::new(Field::Path, r"(?i)\.(jsx|tsx|vue|svelte|css|scss|html)$|(^|/)(frontend|web|ui|components?)/", "frontend"),
            Rule::new(Field::Path, r"(?i)(^|/)(migrations?|db|database|data|etl|pipelines?)/|\.sql$", "data"),
            Rule::new(Field::Path, r"(?i)(^|/)(scripts?|tools?|bin)/|\.sh$", "tooling"),
            Rule::new(Field::Path, r"(?i)\.(md|rst|adoc)$|(^|/)docs?/", "documentation"),
            Rule::new(Field::Path, r"(?i)(^|/)(backend|server|api|services?|src)/|\.(rs|py|go|java|rb|kt|cs)$", "backend"),
            Rule::new(Field::Content, r"(?i)\b(useState|ReactDOM|<template>|document\.getElementById)\b", "frontend"),
            Rule::new(Field::Content, r"(?i)\b(SELECT .+ FROM|CREATE TABLE|INSERT INTO)\b", "data"),
        ]
    })
}

fn framework_rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            Rule::new(Field::Content, r#"from ['"]react['"]|\bimport React\b|\buseState\("#, "react"),
            Rule::new(Field::Content, r#"from ['"]vue['"]|<template>"#, "vue"),
            Rule::new(Field::Content, r"@angular/|@Component\(", "angular"),
            Rule::new(Field::Content, r"\bfrom django\b|\bimport django\b", "django"),
            Rule::new(Field::Content, r"\bfrom flask\b|\bFlask\(__name__\)", "flask"),
            Rule::new(Field::Content, r"\bfrom fastapi\b|\bFastAPI\(\)", "fastapi"),
            Rule::new(Field::Content, r#"require\(['"]express['"]\)|from ['"]express['"]"#, "express"),
            Rule::new(Field::Content, r"@SpringBootApplication|org\.springframework", "spring"),
            Rule::new(Field::Content, r"\bActiveRecord::|\bRails\.application", "rails"),
            Rule::new(Field::Content, r"#\[tokio::main\]|\btokio::", "tokio"),
            Rule::new(Field::Content, r"\baxum::", "axum"),
            Rule::new(Field::Content, r"\bactix_web::", "actix"),
            Rule::new(Field::Content, r"\bserde::|#\[derive\([^)]*Serialize", "serde"),
            Rule::new(Field::Content, r"\bimport pytest\b|@pytest\.", "pytest"),
            Rule::new(Field::Content, r"\bjest\.|\bexpect\([^)]*\)\.toBe", "jest"),
            Rule::new(Field::Content, r"\bsqlalchemy\b", "sqlalchemy"),
            Rule::new(Field::Content, r"(?m)^\s*apiVersion:\s|\bkubectl\b", "kubernetes"),
            Rule::new(Field::Path, r"(?i)Dockerfile$|docker-compose\.ya?ml$", "docker"),
            Rule::new(Field::Path, r"(?i)\.tf$", "terraform"),
            Rule::new(Field::Content, r"\btype Query\b|\bgql`|\bgraphql\b", "graphql"),
        ]
    })
}

fn design_pattern_rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            Rule::new(Field::Content, r"(?i)\bsingleton\b|\bget_instance\(|\bgetInstance\(|OnceLock<|lazy_static!", "singleton"),
            Rule::new(Field::Content, r"(?i)factory|\bcreate_\w+\(", "factory"),
            Rule::new(Field::Content, r"(?i)builder|\.build\(\)", "builder"),
            Rule::new(Field::Content, r"(?i)\b(subscribe|observer|add_listener|addEventListener|emit)\b", "observer"),
            Rule::new(Field::Content, r"(?i)repository", "repository"),
            Rule::new(Field::Content, r"(?i)\bmiddleware\b", "middleware"),
            Rule::new(Field::Content, r"(?i)\binject\w*\b|\bDepends\(", "dependency_injection"),
            Rule::new(Field::Content, r"\basync\s+(fn|def|function)\b|\bawait\b", "async_await"),
            Rule::new(Field::Content, r"\btry\s*[:{]|\bexcept\b|\bcatch\b|\bResult<|\?;", "error_handling"),
            Rule::new(Field::Content, r"(?i)cache|memoi[sz]e", "caching"),
            Rule::new(Field::Content, r"(?i)retry|retries|backoff", "retry"),
        ]
    })
}

fn definition_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        compile(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:export\s+)?(?:async\s+)?(?:fn|def|function|func|class|impl|struct|trait|interface)\b")
    })
}

/// Classify what a document is for, e.g. `test`, `api_endpoint`.
pub fn classify_purpose(name: &str, content: &str, path: &str) -> &'static str {
    first_label(purpose_rules(), name, path, content).unwrap_or(DEFAULT_PURPOSE)
}

/// Classify which part of a system a document belongs to, e.g. `frontend`.
pub fn classify_category(name: &str, content: &str, path: &str) -> &'static str {
    first_label(category_rules(), name, path, content).unwrap_or(DEFAULT_CATEGORY)
}

pub fn detect_frameworks(content: &str, path: &str) -> Vec<String> {
    all_labels(framework_rules(), "", path, content)
}

pub fn detect_patterns(content: &str) -> Vec<String> {
    all_labels(design_pattern_rules(), "", "", content)
}

/// Count of definition-looking lines (functions, classes, impls, ...).
pub fn count_definitions(content: &str) -> usize {
    definition_pattern().find_iter(content).count()
}

/// True for a line that is, or starts, a comment in a common syntax.
pub fn is_comment_line(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("//")
        || t.starts_with("/*")
        || t.starts_with("* ")
        || t == "*"
        || t.starts_with("\"\"\"")
        || t.starts_with("--")
        || (t.starts_with('#') && !t.starts_with("#[") && !t.starts_with("#!") && !t.starts_with("#include"))
}

/// Tier a document by size, definition count, and nesting depth.
pub fn complexity_tier(content: &str) -> ComplexityTier {
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let definitions = count_definitions(content);
    let max_depth = lines
        .iter()
        .map(|l| {
            let indent = l.len() - l.trim_start().len();
            let tabs = l.chars().take_while(|c| *c == '\t').count();
            tabs + (indent - tabs) / 4
        })
        .max()
        .unwrap_or(0);

    if lines.len() > 300 || definitions > 20 || max_depth >= 6 {
        ComplexityTier::Complex
    } else if lines.len() < 40 && definitions <= 3 && max_depth <= 3 {
        ComplexityTier::Simple
    } else {
        ComplexityTier::Moderate
    }
}

pub fn maintainability(content: &str, has_description: bool) -> Maintainability {
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return Maintainability {
            has_docs: has_description,
            ..Default::default()
        };
    }
    let comments = lines.iter().filter(|l| is_comment_line(l)).count();
    let total_len: usize = lines.iter().map(|l| l.chars().count()).sum();
    Maintainability {
        has_docs: has_description || comments > 0,
        comment_ratio: comments as f64 / lines.len() as f64,
        long_lines: lines.iter().filter(|l| l.chars().count() > LONG_LINE).count(),
        avg_line_length: total_len as f64 / lines.len() as f64,
    }
}

/// Build the full enrichment record for a document.
pub fn enrich(doc: &Document) -> Enrichment {
    let name = doc.display_name();
    let path = doc.metadata.file_path.as_deref().unwrap_or("");
    let content = doc.content.as_str();
    let has_description = doc
        .metadata
        .description
        .as_deref()
        .is_some_and(|d| !d.trim().is_empty());

    let purpose = match doc.source_type() {
        SourceType::Conversation => "discussion",
        t if t.is_ticket_like() => "work_item",
        _ => classify_purpose(&name, content, path),
    };

    Enrichment {
        purpose: purpose.to_string(),
        category: classify_category(&name, content, path).to_string(),
        complexity: complexity_tier(content),
        frameworks: detect_frameworks(content, path),
        patterns: detect_patterns(content),
        maintainability: maintainability(content, has_description),
    }
}
