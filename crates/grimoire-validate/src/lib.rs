mod checks;
mod diff;
mod semantic;

pub use diff::{compare_documents, generate_fix_suggestions, DocumentDiff, FixSuggestion, MetadataChange};
pub use semantic::{SemanticCritic, SemanticFinding};

use grimoire_core::{Document, ResolvedDocument, SectionKind};
use serde::{Deserialize, Serialize};

// --- Issue model ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Scoring weight. Critical issues dominate; Info barely registers.
    pub fn weight(&self) -> f64 {
        match self {
            Severity::Critical => 1.0,
            Severity::Error => 0.7,
            Severity::Warning => 0.3,
            Severity::Info => 0.1,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    Structure,
    Semantic,
    Consistency,
    Completeness,
    Conflict,
    Reference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    /// Section name, optionally with a line (`"World:12"`), or a metadata key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeverityCounts {
    pub info: usize,
    pub warning: usize,
    pub error: usize,
    pub critical: usize,
}

impl SeverityCounts {
    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Info => self.info,
            Severity::Warning => self.warning,
            Severity::Error => self.error,
            Severity::Critical => self.critical,
        }
    }
}

/// The structured output of running all validation passes over a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    pub severity_counts: SeverityCounts,
    /// In [0, 1], decreasing with weighted issue count. Does not affect
    /// validity.
    pub score: f64,
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    pub fn from_issues(issues: Vec<ValidationIssue>, config: &ValidationConfig) -> Self {
        let mut counts = SeverityCounts::default();
        let mut weighted = 0.0;
        for issue in &issues {
            match issue.severity {
                Severity::Info => counts.info += 1,
                Severity::Warning => counts.warning += 1,
                Severity::Error => counts.error += 1,
                Severity::Critical => counts.critical += 1,
            }
            weighted += issue.severity.weight();
        }
        let score = (1.0 - weighted / config.score_normalization).clamp(0.0, 1.0);

        let mut suggestions = Vec::new();
        for issue in &issues {
            if let Some(s) = &issue.suggestion {
                if !suggestions.contains(s) {
                    suggestions.push(s.clone());
                }
            }
        }

        ValidationReport {
            issues,
            severity_counts: counts,
            score,
            suggestions,
        }
    }

    /// Validity depends only on Critical/Error counts: a report can carry an
    /// arbitrarily low score from Warnings and still be valid.
    pub fn is_valid(&self) -> bool {
        self.severity_counts.critical == 0 && self.severity_counts.error == 0
    }
}

// --- Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidationConfig {
    /// Sections shorter than this (in characters) get an Info note; the
    /// semantic pass only looks at sections at or above it.
    pub min_section_length: usize,
    /// Section kinds a complete canon is expected to carry.
    pub recommended_kinds: Vec<SectionKind>,
    /// Metadata fields a complete canon is expected to carry.
    pub required_metadata: Vec<String>,
    /// Divisor for the weighted issue sum when computing the score.
    pub score_normalization: f64,
    /// Bound on each semantic critique call; expiry degrades to no findings.
    pub semantic_timeout_secs: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_section_length: 20,
            recommended_kinds: vec![SectionKind::World, SectionKind::Tone],
            required_metadata: vec![
                "version".to_string(),
                "author".to_string(),
                "created".to_string(),
            ],
            score_normalization: 10.0,
            semantic_timeout_secs: 20,
        }
    }
}

// --- Entry points ---

/// Run the synchronous passes over a basic document: structural,
/// completeness, consistency, conflict.
pub fn validate(document: &Document, config: &ValidationConfig) -> ValidationReport {
    let mut issues = Vec::new();
    checks::structural(document, config, &mut issues);
    checks::completeness(document, config, &mut issues);
    checks::consistency(document, &mut issues);
    checks::conflict(document, &mut issues);
    ValidationReport::from_issues(issues, config)
}

/// Run the synchronous passes plus the reference pass (unresolved
/// cross-references and the cycle marker).
pub fn validate_resolved(resolved: &ResolvedDocument, config: &ValidationConfig) -> ValidationReport {
    let mut issues = Vec::new();
    let document = &resolved.document;
    checks::structural(document, config, &mut issues);
    checks::completeness(document, config, &mut issues);
    checks::consistency(document, &mut issues);
    checks::conflict(document, &mut issues);
    checks::reference(resolved, &mut issues);
    ValidationReport::from_issues(issues, config)
}

/// `validate_resolved` plus the optional semantic pass. Any critic failure
/// (error, timeout, malformed response) contributes zero semantic issues;
/// the report's structure is identical with or without a working critic.
pub async fn validate_with_semantics(
    resolved: &ResolvedDocument,
    config: &ValidationConfig,
    critic: &dyn SemanticCritic,
) -> ValidationReport {
    let mut issues = Vec::new();
    let document = &resolved.document;
    checks::structural(document, config, &mut issues);
    checks::completeness(document, config, &mut issues);
    checks::consistency(document, &mut issues);
    checks::conflict(document, &mut issues);
    checks::reference(resolved, &mut issues);
    issues.extend(semantic::semantic_issues(document, config, critic).await);
    ValidationReport::from_issues(issues, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grimoire_core::parse;

    fn full_doc() -> Document {
        parse(
            "canon.md",
            "---\nversion: 1.2.0\nauthor: gm\ncreated: 2024-01-01\n---\n\
             # World\nA sprawling city beneath a shattered moon, lit by salvaged arc lamps.\n\
             # Tone\nMelancholy but hopeful; quiet moments matter more than battles.\n",
        )
    }

    #[test]
    fn test_complete_document_is_valid_with_high_score() {
        let report = validate(&full_doc(), &ValidationConfig::default());
        assert!(report.is_valid());
        assert!(report.score > 0.9, "score was {}", report.score);
        assert!(!report
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::Completeness));
    }

    #[test]
    fn test_missing_recommended_sections() {
        let doc = parse("canon.md", "# Characters\nA full cast of rivals and friends, described at length.\n");
        let report = validate(&doc, &ValidationConfig::default());
        let completeness: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::Completeness && i.severity == Severity::Warning)
            .collect();
        // Two section warnings; metadata defaults are merged at parse so no
        // metadata warnings here.
        assert_eq!(completeness.len(), 2);
        assert!(report.is_valid());
        assert!(report.score < 1.0);
    }

    #[test]
    fn test_score_monotonicity() {
        let config = ValidationConfig::default();
        let base = vec![ValidationIssue {
            kind: IssueKind::Structure,
            severity: Severity::Warning,
            message: "w".into(),
            location: None,
            suggestion: None,
        }];
        let base_score = ValidationReport::from_issues(base.clone(), &config).score;
        for severity in [
            Severity::Info,
            Severity::Warning,
            Severity::Error,
            Severity::Critical,
        ] {
            let mut issues = base.clone();
            issues.push(ValidationIssue {
                kind: IssueKind::Structure,
                severity,
                message: "x".into(),
                location: None,
                suggestion: None,
            });
            let score = ValidationReport::from_issues(issues, &config).score;
            assert!(score <= base_score, "{:?} raised the score", severity);
        }
    }

    #[test]
    fn test_validity_independent_of_score() {
        let config = ValidationConfig::default();
        let issues: Vec<ValidationIssue> = (0..40)
            .map(|i| ValidationIssue {
                kind: IssueKind::Completeness,
                severity: Severity::Warning,
                message: format!("warning {}", i),
                location: None,
                suggestion: None,
            })
            .collect();
        let report = ValidationReport::from_issues(issues, &config);
        assert_eq!(report.score, 0.0);
        assert!(report.is_valid());
    }

    #[test]
    fn test_error_invalidates() {
        let config = ValidationConfig::default();
        let report = ValidationReport::from_issues(
            vec![ValidationIssue {
                kind: IssueKind::Reference,
                severity: Severity::Error,
                message: "e".into(),
                location: None,
                suggestion: None,
            }],
            &config,
        );
        assert!(!report.is_valid());
    }

    #[test]
    fn test_severity_counts() {
        let config = ValidationConfig::default();
        let report = ValidationReport::from_issues(
            vec![
                ValidationIssue {
                    kind: IssueKind::Structure,
                    severity: Severity::Warning,
                    message: "a".into(),
                    location: None,
                    suggestion: None,
                },
                ValidationIssue {
                    kind: IssueKind::Structure,
                    severity: Severity::Warning,
                    message: "b".into(),
                    location: None,
                    suggestion: None,
                },
                ValidationIssue {
                    kind: IssueKind::Conflict,
                    severity: Severity::Info,
                    message: "c".into(),
                    location: None,
                    suggestion: None,
                },
            ],
            &config,
        );
        assert_eq!(report.severity_counts.warning, 2);
        assert_eq!(report.severity_counts.info, 1);
        assert_eq!(report.severity_counts.get(Severity::Error), 0);
    }

    #[test]
    fn test_unresolved_reference_warning_names_target() {
        let resolved = grimoire_core::resolve(&parse(
            "canon.md",
            "# World\nLong enough content referencing [@Nonexistent] somewhere in the text.\n\
             # Tone\nSteady, slow-burning dread with occasional levity to breathe.\n",
        ));
        let report = validate_resolved(&resolved, &ValidationConfig::default());
        let refs: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::Reference)
            .collect();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].severity, Severity::Warning);
        assert!(refs[0].message.contains("Nonexistent"));
        assert!(report.is_valid());
    }

    #[test]
    fn test_cycle_reported_as_single_critical() {
        let resolved = grimoire_core::resolve(&parse(
            "canon.md",
            "# A\nThis section points at [@B] for more detail on the matter.\n\
             # B\nAnd this one points back at [@A], closing the loop entirely.\n",
        ));
        let report = validate_resolved(&resolved, &ValidationConfig::default());
        let critical: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
            .collect();
        assert_eq!(critical.len(), 1);
        assert!(!report.is_valid());
    }

    #[test]
    fn test_dag_has_no_cycle_issue() {
        let resolved = grimoire_core::resolve(&parse(
            "canon.md",
            "# A\nPoints forward to [@B] and nothing else worth mentioning here.\n\
             # B\nPoints forward to [@C] continuing the chain without looping.\n\
             # C\nThe end of the chain, referencing nothing further at all.\n",
        ));
        let report = validate_resolved(&resolved, &ValidationConfig::default());
        assert!(!report.issues.iter().any(|i| i.severity == Severity::Critical));
    }
}
