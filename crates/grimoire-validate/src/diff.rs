//! Document-to-document diffing and fix-suggestion generation.

use grimoire_core::{kinds, Document};
use serde::{Deserialize, Serialize};

use crate::{IssueKind, Severity, ValidationConfig, ValidationReport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetadataChange {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDiff {
    pub added_sections: Vec<String>,
    pub removed_sections: Vec<String>,
    /// Sections present in both whose content differs byte-for-byte.
    pub modified_sections: Vec<String>,
    pub metadata_changes: Vec<MetadataChange>,
    pub breaking_changes: Vec<String>,
}

impl DocumentDiff {
    pub fn is_empty(&self) -> bool {
        self.added_sections.is_empty()
            && self.removed_sections.is_empty()
            && self.modified_sections.is_empty()
            && self.metadata_changes.is_empty()
    }
}

/// Compare two parsed documents (typically consecutive versions of one path).
pub fn compare_documents(old: &Document, new: &Document) -> DocumentDiff {
    let mut diff = DocumentDiff::default();

    for section in &new.sections {
        match old.section(&section.name) {
            None => diff.added_sections.push(section.name.clone()),
            Some(prev) if prev.content != section.content => {
                diff.modified_sections.push(section.name.clone())
            }
            Some(_) => {}
        }
    }
    for section in &old.sections {
        if new.section(&section.name).is_none() {
            diff.removed_sections.push(section.name.clone());
        }
    }

    let mut keys: Vec<&str> = old.metadata.iter().map(|(k, _)| k).collect();
    for (k, _) in new.metadata.iter() {
        if !keys.contains(&k) {
            keys.push(k);
        }
    }
    for key in keys {
        let old_value = old.metadata.get(key);
        let new_value = new.metadata.get(key);
        if old_value != new_value {
            diff.metadata_changes.push(MetadataChange {
                key: key.to_string(),
                old: old_value.map(str::to_string),
                new: new_value.map(str::to_string),
            });
        }
    }

    // Breaking: version or requires changed, or a recommended-kind section
    // disappeared.
    for change in &diff.metadata_changes {
        if change.key == "version" || change.key == "requires" {
            diff.breaking_changes
                .push(format!("metadata field '{}' changed", change.key));
        }
    }
    let recommended = ValidationConfig::default().recommended_kinds;
    for name in &diff.removed_sections {
        if recommended.contains(&kinds::infer_kind(name)) {
            diff.breaking_changes
                .push(format!("removed recommended section '{}'", name));
        }
    }

    diff
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FixSuggestion {
    /// The issue being addressed.
    pub message: String,
    pub suggestion: String,
    /// Only Structure and Reference issues are mechanical enough to fix
    /// without a human.
    pub auto_fixable: bool,
}

/// One suggestion per Error/Critical issue in the report.
pub fn generate_fix_suggestions(report: &ValidationReport) -> Vec<FixSuggestion> {
    report
        .issues
        .iter()
        .filter(|i| matches!(i.severity, Severity::Error | Severity::Critical))
        .map(|issue| FixSuggestion {
            message: issue.message.clone(),
            suggestion: issue
                .suggestion
                .clone()
                .unwrap_or_else(|| format!("review and fix: {}", issue.message)),
            auto_fixable: matches!(issue.kind, IssueKind::Structure | IssueKind::Reference),
        })
        .collect()
}
