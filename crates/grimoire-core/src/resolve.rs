//! Reference resolver.
//!
//! Extracts cross-references, include directives, macro definitions and uses,
//! and conditional markers from a parsed [`Document`]; builds the dependency
//! list; detects reference cycles; expands macro uses. `resolve` is a pure
//! transform; it never touches the filesystem (include content is loaded
//! lazily by the cache layer).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{Document, Section};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum RefKind {
    CrossRef,
    Include,
    Conditional,
    MacroUse,
}

/// An extracted reference tag with its originating line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub source_section: String,
    /// Raw tag payload: a section name or fragment for cross-refs, a relative
    /// path for includes, a macro id for uses, the opaque condition for
    /// conditionals.
    pub target: String,
    pub kind: RefKind,
    pub line: u32,
    /// For cross-refs, the section name the target resolved to. `None` means
    /// unresolved, flagged by the validator rather than treated as an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_target: Option<String>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub enum DepKind {
    Reference,
    Include,
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub source: String,
    pub target: String,
    pub kind: DepKind,
}

/// A named reusable block of text, substituted verbatim at its use sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MacroDef {
    pub id: String,
    pub body: String,
    pub source_section: String,
    pub line: u32,
}

/// A document plus everything the resolver derived from it. Section content
/// has macro uses expanded; references keep pre-expansion line numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDocument {
    pub document: Document,
    pub references: Vec<Reference>,
    pub dependencies: Vec<Dependency>,
    pub macros: Vec<MacroDef>,
    /// Set when the cross-reference/include graph contains a cycle. Reports
    /// presence only: the first cycle found, not an enumeration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle: Option<String>,
}

impl ResolvedDocument {
    pub fn unresolved_references(&self) -> impl Iterator<Item = &Reference> {
        self.references
            .iter()
            .filter(|r| r.kind == RefKind::CrossRef && r.resolved_target.is_none())
    }
}

/// Resolve a parsed document: extract references and macros, build the
/// dependency list, detect cycles, expand macro uses.
pub fn resolve(document: &Document) -> ResolvedDocument {
    let mut references = Vec::new();
    let mut macros = Vec::new();
    for section in &document.sections {
        extract_from_section(section, &mut references, &mut macros);
    }

    for reference in &mut references {
        if reference.kind == RefKind::CrossRef {
            reference.resolved_target = resolve_target(&reference.target, &document.sections);
        }
    }

    let dependencies = build_dependencies(document, &references);
    let cycle = detect_cycle(&dependencies);

    let mut document = document.clone();
    if !macros.is_empty() {
        for section in &mut document.sections {
            section.content = expand_macros(&section.content, &macros);
        }
    }

    ResolvedDocument {
        document,
        references,
        dependencies,
        macros,
        cycle,
    }
}

// --- Extraction ---

fn extract_from_section(section: &Section, refs: &mut Vec<Reference>, macros: &mut Vec<MacroDef>) {
    let lines: Vec<&str> = section.content.lines().collect();
    // Content was trimmed of blank edges, so its last line is `end_line`.
    let first_line = section.end_line + 1 - lines.len() as u32;

    let mut macro_open: Option<(String, u32, Vec<String>)> = None;

    for (idx, line) in lines.iter().enumerate() {
        let line_no = first_line + idx as u32;

        if let Some((id, start, mut body)) = macro_open.take() {
            if line.contains("{{endmacro}}") {
                macros.push(MacroDef {
                    id,
                    body: body.join("\n"),
                    source_section: section.name.clone(),
                    line: start,
                });
            } else {
                body.push(line.to_string());
                macro_open = Some((id, start, body));
            }
            continue;
        }

        if let Some(id) = scan_tag(line, "{{macro:", "}}").into_iter().next() {
            macro_open = Some((id, line_no, Vec::new()));
            continue;
        }

        for target in scan_tag(line, "[@", "]") {
            refs.push(Reference {
                source_section: section.name.clone(),
                target,
                kind: RefKind::CrossRef,
                line: line_no,
                resolved_target: None,
            });
        }
        for target in scan_tag(line, "{{include:", "}}") {
            refs.push(Reference {
                source_section: section.name.clone(),
                target,
                kind: RefKind::Include,
                line: line_no,
                resolved_target: None,
            });
        }
        for target in scan_tag(line, "{{use:", "}}") {
            refs.push(Reference {
                source_section: section.name.clone(),
                target,
                kind: RefKind::MacroUse,
                line: line_no,
                resolved_target: None,
            });
        }
        for target in scan_tag(line, "{{if:", "}}") {
            refs.push(Reference {
                source_section: section.name.clone(),
                target,
                kind: RefKind::Conditional,
                line: line_no,
                resolved_target: None,
            });
        }
    }

    // An unterminated macro block swallows the rest of the section; keep what
    // was collected so the definition is still usable.
    if let Some((id, start, body)) = macro_open {
        macros.push(MacroDef {
            id,
            body: body.join("\n"),
            source_section: section.name.clone(),
            line: start,
        });
    }
}

/// All payloads between `open` and `close` on one line, in order.
fn scan_tag(line: &str, open: &str, close: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = line;
    while let Some(start) = rest.find(open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(close) else { break };
        let payload = after[..end].trim();
        if !payload.is_empty() {
            out.push(payload.to_string());
        }
        rest = &after[end + close.len()..];
    }
    out
}

// --- Cross-reference resolution ---

/// Resolve a cross-ref target against section names: exact match, then
/// case-insensitive substring, then exact against the name with any
/// parenthetical suffix stripped. `None` when nothing matches.
fn resolve_target(target: &str, sections: &[Section]) -> Option<String> {
    if let Some(s) = sections.iter().find(|s| s.name == target) {
        return Some(s.name.clone());
    }

    let target_lower = target.to_lowercase();
    if let Some(s) = sections.iter().find(|s| {
        let name_lower = s.name.to_lowercase();
        name_lower.contains(&target_lower) || target_lower.contains(&name_lower)
    }) {
        return Some(s.name.clone());
    }

    sections
        .iter()
        .find(|s| strip_parenthetical(&s.name) == target)
        .map(|s| s.name.clone())
}

fn strip_parenthetical(name: &str) -> &str {
    match name.find('(') {
        Some(pos) => name[..pos].trim_end(),
        None => name,
    }
}

// --- Dependencies ---

fn build_dependencies(document: &Document, references: &[Reference]) -> Vec<Dependency> {
    let mut deps = Vec::new();
    for reference in references {
        match reference.kind {
            RefKind::CrossRef => {
                let target = reference
                    .resolved_target
                    .clone()
                    .unwrap_or_else(|| reference.target.clone());
                deps.push(Dependency {
                    source: reference.source_section.clone(),
                    target,
                    kind: DepKind::Reference,
                });
            }
            RefKind::Include => deps.push(Dependency {
                source: reference.source_section.clone(),
                target: reference.target.clone(),
                kind: DepKind::Include,
            }),
            RefKind::Conditional | RefKind::MacroUse => {}
        }
    }

    // `requires` metadata: a single value or a comma-separated list.
    if let Some(requires) = document.metadata.get("requires") {
        for target in requires.split(',') {
            let target = target.trim();
            if !target.is_empty() {
                deps.push(Dependency {
                    source: document.path.clone(),
                    target: target.to_string(),
                    kind: DepKind::Metadata,
                });
            }
        }
    }
    deps
}

// --- Cycle detection ---

/// DFS over Reference and Include edges with an explicit recursion-stack set.
/// Returns a marker naming the node where the first cycle was found; cycles
/// are not enumerated.
fn detect_cycle(dependencies: &[Dependency]) -> Option<String> {
    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    for dep in dependencies {
        if matches!(dep.kind, DepKind::Reference | DepKind::Include) {
            adj.entry(dep.source.as_str())
                .or_default()
                .push(dep.target.as_str());
        }
    }

    let mut visiting = HashSet::new();
    let mut visited = HashSet::new();
    let roots: Vec<&str> = adj.keys().copied().collect();
    for root in roots {
        if !visited.contains(root) {
            if let Some(node) = dfs(root, &adj, &mut visiting, &mut visited) {
                return Some(format!("reference cycle involving '{}'", node));
            }
        }
    }
    None
}

fn dfs<'a>(
    node: &'a str,
    adj: &HashMap<&'a str, Vec<&'a str>>,
    visiting: &mut HashSet<&'a str>,
    visited: &mut HashSet<&'a str>,
) -> Option<&'a str> {
    if visiting.contains(node) {
        return Some(node);
    }
    if visited.contains(node) {
        return None;
    }
    visiting.insert(node);
    if let Some(neighbors) = adj.get(node) {
        for next in neighbors {
            if let Some(found) = dfs(next, adj, visiting, visited) {
                return Some(found);
            }
        }
    }
    visiting.remove(node);
    visited.insert(node);
    None
}

// --- Macro expansion ---

/// Substitute each `{{use:id}}` with the matching macro body, verbatim, in a
/// single sweep over the original content. Bodies are not rescanned: a macro
/// whose body uses another macro is substituted literally, not re-expanded.
/// Unknown ids are left in place.
fn expand_macros(content: &str, macros: &[MacroDef]) -> String {
    let bodies: HashMap<&str, &str> = macros
        .iter()
        .map(|m| (m.id.as_str(), m.body.as_str()))
        .collect();

    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find("{{use:") {
        let after = &rest[start + "{{use:".len()..];
        let Some(end) = after.find("}}") else { break };
        let id = after[..end].trim();
        out.push_str(&rest[..start]);
        match bodies.get(id) {
            Some(body) => out.push_str(body),
            None => out.push_str(&rest[start..start + "{{use:".len() + end + "}}".len()]),
        }
        rest = &after[end + "}}".len()..];
    }
    out.push_str(rest);
    out
}
