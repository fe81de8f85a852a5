//! The synchronous validation passes. Each pass appends issues
//! independently; ordering only affects report readability.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use grimoire_core::{kinds, Document, ResolvedDocument, SectionKind};
use regex::Regex;

use crate::{IssueKind, Severity, ValidationConfig, ValidationIssue};

fn semver_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("static pattern compiles"))
}

/// Keyword pairs considered self-contradictory when both hit within one
/// section: (label, pattern) twice. Data-driven so language coverage can
/// grow without code changes.
const CONTRADICTION_PATTERNS: &[(&str, &str, &str, &str)] = &[
    ("always", r"(?i)\balways\b", "never", r"(?i)\bnever\b"),
    ("allowed", r"(?i)\ballowed\b", "forbidden", r"(?i)\bforbidden\b"),
    ("允许", "允许", "禁止", "禁止"),
    ("必须", "必须", "不得", "不得"),
];

fn contradiction_patterns() -> &'static Vec<(&'static str, Regex, &'static str, Regex)> {
    static RE: OnceLock<Vec<(&'static str, Regex, &'static str, Regex)>> = OnceLock::new();
    RE.get_or_init(|| {
        CONTRADICTION_PATTERNS
            .iter()
            .map(|(label_a, a, label_b, b)| {
                (
                    *label_a,
                    Regex::new(a).expect("static pattern compiles"),
                    *label_b,
                    Regex::new(b).expect("static pattern compiles"),
                )
            })
            .collect()
    })
}

/// A "rule-like" phrase: an imperative keyword and the rest of its sentence.
fn rule_phrase_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\bmust\b|\bnever\b|\balways\b|\bcannot\b|必须|不得|禁止)[^.。!！?？\n]*")
            .expect("static pattern compiles")
    })
}

// --- Structural ---

pub fn structural(document: &Document, config: &ValidationConfig, issues: &mut Vec<ValidationIssue>) {
    for section in &document.sections {
        if section.content.trim().is_empty() {
            issues.push(ValidationIssue {
                kind: IssueKind::Structure,
                severity: Severity::Warning,
                message: format!("section '{}' is empty", section.name),
                location: Some(section.name.clone()),
                suggestion: Some(format!(
                    "add content to '{}' or remove the heading",
                    section.name
                )),
            });
        } else if section.content.chars().count() < config.min_section_length {
            issues.push(ValidationIssue {
                kind: IssueKind::Structure,
                severity: Severity::Info,
                message: format!(
                    "section '{}' is shorter than {} characters",
                    section.name, config.min_section_length
                ),
                location: Some(section.name.clone()),
                suggestion: None,
            });
        }
    }

    if let Some(version) = document.metadata.get("version") {
        if !semver_pattern().is_match(version) {
            issues.push(ValidationIssue {
                kind: IssueKind::Structure,
                severity: Severity::Warning,
                message: format!("version '{}' is not a semantic version", version),
                location: Some("version".to_string()),
                suggestion: Some("use MAJOR.MINOR.PATCH, e.g. 1.0.0".to_string()),
            });
        }
    }
}

// --- Completeness ---

pub fn completeness(
    document: &Document,
    config: &ValidationConfig,
    issues: &mut Vec<ValidationIssue>,
) {
    for kind in &config.recommended_kinds {
        if document.sections.iter().any(|s| s.kind == *kind) {
            continue;
        }
        let keywords = kinds::kind_keywords(*kind).join("/");
        issues.push(ValidationIssue {
            kind: IssueKind::Completeness,
            severity: Severity::Warning,
            message: format!("no section matching recommended kind '{}'", kind.as_str()),
            location: None,
            suggestion: Some(format!(
                "add a '# ...' section named after one of: {}",
                keywords
            )),
        });
    }

    for field in &config.required_metadata {
        if !document.metadata.contains(field) {
            issues.push(ValidationIssue {
                kind: IssueKind::Completeness,
                severity: Severity::Warning,
                message: format!("missing metadata field '{}'", field),
                location: Some(field.clone()),
                suggestion: Some(format!("add '{}: ...' to the header block", field)),
            });
        }
    }
}

// --- Consistency ---

pub fn consistency(document: &Document, issues: &mut Vec<ValidationIssue>) {
    if let (Some(created), Some(updated)) = (
        document.metadata.get("created").and_then(parse_when),
        document.metadata.get("updated").and_then(parse_when),
    ) {
        if updated < created {
            issues.push(ValidationIssue {
                kind: IssueKind::Consistency,
                severity: Severity::Warning,
                message: "'updated' timestamp is earlier than 'created'".to_string(),
                location: Some("updated".to_string()),
                suggestion: None,
            });
        }
    }

    let mut by_kind: HashMap<SectionKind, Vec<&str>> = HashMap::new();
    for section in &document.sections {
        if section.kind != SectionKind::Custom {
            by_kind.entry(section.kind).or_default().push(&section.name);
        }
    }
    for (kind, names) in by_kind {
        if names.len() > 1 {
            issues.push(ValidationIssue {
                kind: IssueKind::Consistency,
                severity: Severity::Info,
                message: format!(
                    "{} sections share kind '{}': {}",
                    names.len(),
                    kind.as_str(),
                    names.join(", ")
                ),
                location: None,
                suggestion: Some(format!("consider merging the '{}' sections", kind.as_str())),
            });
        }
    }
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, or RFC 3339. Unparseable
/// values skip the check rather than failing it.
fn parse_when(value: &str) -> Option<NaiveDateTime> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.naive_utc())
}

// --- Conflict ---

pub fn conflict(document: &Document, issues: &mut Vec<ValidationIssue>) {
    for section in &document.sections {
        for (label_a, a, label_b, b) in contradiction_patterns() {
            if a.is_match(&section.content) && b.is_match(&section.content) {
                issues.push(ValidationIssue {
                    kind: IssueKind::Conflict,
                    severity: Severity::Warning,
                    message: format!(
                        "section '{}' contains both '{}' and '{}' phrasing",
                        section.name, label_a, label_b
                    ),
                    location: Some(section.name.clone()),
                    suggestion: Some("reword so the rules do not contradict".to_string()),
                });
            }
        }
    }

    // The same rule-like phrase appearing verbatim in several sections is
    // usually a copy-paste that will drift apart.
    let mut phrase_sections: HashMap<String, Vec<&str>> = HashMap::new();
    for section in &document.sections {
        for m in rule_phrase_pattern().find_iter(&section.content) {
            let phrase = m.as_str().trim().to_lowercase();
            if phrase.chars().count() < 12 {
                continue;
            }
            let entry = phrase_sections.entry(phrase).or_default();
            if !entry.contains(&section.name.as_str()) {
                entry.push(&section.name);
            }
        }
    }
    for (phrase, sections) in phrase_sections {
        if sections.len() > 1 {
            issues.push(ValidationIssue {
                kind: IssueKind::Conflict,
                severity: Severity::Info,
                message: format!(
                    "rule phrase '{}' repeats across sections: {}",
                    phrase,
                    sections.join(", ")
                ),
                location: None,
                suggestion: Some("keep each rule in a single section".to_string()),
            });
        }
    }
}

// --- Reference ---

/// Only meaningful for documents that went through the resolver: surfaces
/// unresolved cross-references and the cycle marker.
pub fn reference(resolved: &ResolvedDocument, issues: &mut Vec<ValidationIssue>) {
    for r in resolved.unresolved_references() {
        issues.push(ValidationIssue {
            kind: IssueKind::Reference,
            severity: Severity::Warning,
            message: format!("unresolved reference '[@{}]'", r.target),
            location: Some(format!("{}:{}", r.source_section, r.line)),
            suggestion: Some(format!(
                "add a section matching '{}' or fix the tag",
                r.target
            )),
        });
    }

    if let Some(marker) = &resolved.cycle {
        issues.push(ValidationIssue {
            kind: IssueKind::Structure,
            severity: Severity::Critical,
            message: marker.clone(),
            location: None,
            suggestion: Some("break the cycle by removing one of the references".to_string()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grimoire_core::parse;

    fn run_sync(text: &str) -> Vec<ValidationIssue> {
        let doc = parse("canon.md", text);
        let config = ValidationConfig::default();
        let mut issues = Vec::new();
        structural(&doc, &config, &mut issues);
        completeness(&doc, &config, &mut issues);
        consistency(&doc, &mut issues);
        conflict(&doc, &mut issues);
        issues
    }

    #[test]
    fn test_empty_section_warning() {
        let issues = run_sync("# World\n# Tone\nA calm and steady baseline for every scene.\n");
        assert!(issues.iter().any(|i| {
            i.kind == IssueKind::Structure
                && i.severity == Severity::Warning
                && i.message.contains("'World' is empty")
        }));
    }

    #[test]
    fn test_short_section_info() {
        let issues = run_sync("# World\ntiny\n# Tone\nA calm and steady baseline for every scene.\n");
        assert!(issues.iter().any(|i| {
            i.kind == IssueKind::Structure
                && i.severity == Severity::Info
                && i.message.contains("'World'")
        }));
    }

    #[test]
    fn test_bad_semver_warning() {
        let issues = run_sync("---\nversion: v2-beta\n---\n# World\nEnough content to pass the length check easily.\n");
        assert!(issues
            .iter()
            .any(|i| i.kind == IssueKind::Structure && i.message.contains("v2-beta")));
    }

    #[test]
    fn test_good_semver_no_warning() {
        let issues = run_sync("---\nversion: 2.10.3\n---\n# World\nEnough content to pass the length check easily.\n# Tone\nWarm but wary, a city holding its breath at night.\n");
        assert!(!issues.iter().any(|i| i.message.contains("semantic version")));
    }

    #[test]
    fn test_updated_before_created() {
        let issues = run_sync(
            "---\ncreated: 2024-06-01\nupdated: 2024-01-01\n---\n# World\nEnough content to pass the length check easily.\n# Tone\nWarm but wary, a city holding its breath at night.\n",
        );
        assert!(issues
            .iter()
            .any(|i| i.kind == IssueKind::Consistency && i.severity == Severity::Warning));
    }

    #[test]
    fn test_updated_after_created_ok() {
        let issues = run_sync(
            "---\ncreated: 2024-01-01\nupdated: 2024-06-01\n---\n# World\nEnough content to pass the length check easily.\n# Tone\nWarm but wary, a city holding its breath at night.\n",
        );
        assert!(!issues.iter().any(|i| i.kind == IssueKind::Consistency));
    }

    #[test]
    fn test_duplicate_kind_info() {
        let issues = run_sync(
            "# World\nThe city and its salvaged arc lamps, described properly.\n\
             # Setting Notes\nMore of the same world, split off for no clear reason.\n\
             # Tone\nWarm but wary, a city holding its breath at night.\n",
        );
        assert!(issues.iter().any(|i| {
            i.kind == IssueKind::Consistency
                && i.severity == Severity::Info
                && i.message.contains("world")
        }));
    }

    #[test]
    fn test_contradiction_warning() {
        let issues = run_sync(
            "# Permissions\nPlayers must always ask before acting, but the keeper will never answer them.\n\
             # Tone\nWarm but wary, a city holding its breath at night.\n# World\nEnough content to pass the length check easily.\n",
        );
        assert!(issues.iter().any(|i| {
            i.kind == IssueKind::Conflict
                && i.severity == Severity::Warning
                && i.location.as_deref() == Some("Permissions")
        }));
    }

    #[test]
    fn test_chinese_contradiction_warning() {
        let issues = run_sync(
            "# 权限\n玩家必须先询问守密人，但守密人不得回答任何问题。\n\
             # Tone\nWarm but wary, a city holding its breath at night.\n# World\nEnough content to pass the length check easily.\n",
        );
        assert!(issues
            .iter()
            .any(|i| i.kind == IssueKind::Conflict && i.severity == Severity::Warning));
    }

    #[test]
    fn test_repeated_rule_phrase_info() {
        let issues = run_sync(
            "# World\nCharacters must never leave the walled district after curfew.\n\
             # Permissions\nCharacters must never leave the walled district after curfew.\n\
             # Tone\nWarm but wary, a city holding its breath at night.\n",
        );
        assert!(issues.iter().any(|i| {
            i.kind == IssueKind::Conflict
                && i.severity == Severity::Info
                && i.message.contains("repeats across sections")
        }));
    }

    #[test]
    fn test_reference_pass_only_flags_unresolved() {
        let resolved = grimoire_core::resolve(&parse(
            "canon.md",
            "# World\nSee [@Tone] and also [@Ghosts] for the missing parts.\n\
             # Tone\nWarm but wary, a city holding its breath at night.\n",
        ));
        let mut issues = Vec::new();
        reference(&resolved, &mut issues);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("Ghosts"));
    }
}
