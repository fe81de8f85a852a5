use serde::{Deserialize, Serialize};

/// Semantic kind of a canon section, inferred from its heading.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum SectionKind {
    World,
    Tone,
    Conflict,
    Permissions,
    Causality,
    Meta,
    Custom,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::World => "world",
            SectionKind::Tone => "tone",
            SectionKind::Conflict => "conflict",
            SectionKind::Permissions => "permissions",
            SectionKind::Causality => "causality",
            SectionKind::Meta => "meta",
            SectionKind::Custom => "custom",
        }
    }
}

/// Keyword table for kind inference. Checked in order against the lowercased
/// section name with a substring match, so more specific keywords must come
/// before shorter ones they contain. Extend this table to add languages or
/// keywords; the parser never needs to change.
const KIND_KEYWORDS: &[(&str, SectionKind)] = &[
    ("world", SectionKind::World),
    ("setting", SectionKind::World),
    ("世界观", SectionKind::World),
    ("世界設定", SectionKind::World),
    ("设定", SectionKind::World),
    ("tone", SectionKind::Tone),
    ("style", SectionKind::Tone),
    ("基调", SectionKind::Tone),
    ("风格", SectionKind::Tone),
    ("conflict", SectionKind::Conflict),
    ("冲突", SectionKind::Conflict),
    ("permission", SectionKind::Permissions),
    ("allowed", SectionKind::Permissions),
    ("权限", SectionKind::Permissions),
    ("许可", SectionKind::Permissions),
    ("causality", SectionKind::Causality),
    ("causal", SectionKind::Causality),
    ("因果", SectionKind::Causality),
    ("metadata", SectionKind::Meta),
    ("meta", SectionKind::Meta),
    ("元信息", SectionKind::Meta),
    ("元设定", SectionKind::Meta),
];

/// Infer a section's kind from its name. Unmatched names are `Custom`.
pub fn infer_kind(name: &str) -> SectionKind {
    let lower = name.to_lowercase();
    KIND_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, kind)| *kind)
        .unwrap_or(SectionKind::Custom)
}

/// The keyword(s) describing a kind, used when reporting a missing
/// recommended section.
pub fn kind_keywords(kind: SectionKind) -> Vec<&'static str> {
    KIND_KEYWORDS
        .iter()
        .filter(|(_, k)| *k == kind)
        .map(|(keyword, _)| *keyword)
        .collect()
}
