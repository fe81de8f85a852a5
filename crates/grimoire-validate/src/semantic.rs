//! The optional semantic pass: free-text critique delegated to an external
//! collaborator behind a bounded timeout. Every failure mode (provider
//! error, timeout, malformed response) degrades to zero findings for that
//! section, never a validator failure.

use std::time::Duration;

use grimoire_core::Document;
use serde::{Deserialize, Serialize};

use crate::{IssueKind, Severity, ValidationConfig, ValidationIssue};

/// One structured finding from the critique collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticFinding {
    pub message: String,
    pub severity: Severity,
}

/// Capability interface for the external text-critique collaborator.
#[async_trait::async_trait]
pub trait SemanticCritic: Send + Sync {
    /// Critique one section's text. Implementations are best-effort; the
    /// caller treats `Err` the same as an empty result.
    async fn critique_section(
        &self,
        section_name: &str,
        content: &str,
    ) -> Result<Vec<SemanticFinding>, String>;
}

pub(crate) async fn semantic_issues(
    document: &Document,
    config: &ValidationConfig,
    critic: &dyn SemanticCritic,
) -> Vec<ValidationIssue> {
    let timeout = Duration::from_secs(config.semantic_timeout_secs);
    let mut issues = Vec::new();

    for section in &document.sections {
        if section.content.chars().count() < config.min_section_length {
            continue;
        }
        let findings = match tokio::time::timeout(
            timeout,
            critic.critique_section(&section.name, &section.content),
        )
        .await
        {
            Ok(Ok(findings)) => findings,
            Ok(Err(e)) => {
                tracing::warn!(section = %section.name, error = %e, "semantic critique failed");
                continue;
            }
            Err(_) => {
                tracing::warn!(section = %section.name, "semantic critique timed out");
                continue;
            }
        };
        for finding in findings {
            issues.push(ValidationIssue {
                kind: IssueKind::Semantic,
                severity: finding.severity,
                message: finding.message,
                location: Some(section.name.clone()),
                suggestion: None,
            });
        }
    }
    issues
}
