//! Canon markup parser.
//!
//! Turns raw text into a [`Document`]. Parsing never fails: malformed input
//! degrades (bad header block → empty metadata, stray pre-heading content →
//! discarded) and the validator reports on the result afterwards.

use chrono::Utc;

use crate::kinds::infer_kind;
use crate::{Document, Metadata, Section};

const HEADER_DELIMITER: &str = "---";

/// Parse raw canon text into a `Document`.
pub fn parse(path: &str, raw: &str) -> Document {
    let lines: Vec<&str> = raw.lines().collect();

    let (metadata, body_start) = parse_header(&lines);
    let metadata = with_defaults(metadata);
    let sections = parse_sections(&lines, body_start);

    Document {
        path: path.to_string(),
        raw_content: raw.to_string(),
        metadata,
        sections,
    }
}

/// Parse the optional leading `--- key: value ... ---` block. Returns the
/// metadata and the index of the first body line. Any malformed interior
/// line makes the whole block count as absent, delimiters included.
fn parse_header(lines: &[&str]) -> (Metadata, usize) {
    if lines.first().map(|l| l.trim()) != Some(HEADER_DELIMITER) {
        return (Metadata::new(), 0);
    }
    let Some(close) = lines
        .iter()
        .skip(1)
        .position(|l| l.trim() == HEADER_DELIMITER)
        .map(|i| i + 1)
    else {
        return (Metadata::new(), 0);
    };

    let mut metadata = Metadata::new();
    for line in &lines[1..close] {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            return (Metadata::new(), 0);
        };
        let key = key.trim();
        if key.is_empty() {
            return (Metadata::new(), 0);
        }
        metadata.set(key, value.trim());
    }
    (metadata, close + 1)
}

fn with_defaults(mut metadata: Metadata) -> Metadata {
    if !metadata.contains("version") {
        metadata.set("version", "1.0.0");
    }
    if !metadata.contains("author") {
        metadata.set("author", "unknown");
    }
    if !metadata.contains("created") {
        metadata.set("created", Utc::now().format("%Y-%m-%d").to_string());
    }
    metadata
}

/// Split body lines on `# <name>` headings. Content before the first heading
/// is discarded. A duplicate heading keeps its first position in the section
/// list but carries the last occurrence's content.
fn parse_sections(lines: &[&str], body_start: usize) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut open: Option<(String, u32, Vec<(u32, String)>)> = None;

    for (idx, line) in lines.iter().enumerate().skip(body_start) {
        let line_no = (idx + 1) as u32;
        if let Some(name) = heading_name(line) {
            if let Some((name, start, content)) = open.take() {
                push_section(&mut sections, name, start, content);
            }
            open = Some((name.to_string(), line_no, Vec::new()));
        } else if let Some((_, _, content)) = open.as_mut() {
            content.push((line_no, line.to_string()));
        }
    }
    if let Some((name, start, content)) = open.take() {
        push_section(&mut sections, name, start, content);
    }
    sections
}

/// A heading line is exactly one `#` followed by one space and a name.
fn heading_name(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("# ")?;
    let name = rest.trim();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn push_section(sections: &mut Vec<Section>, name: String, start_line: u32, raw: Vec<(u32, String)>) {
    // Trim leading/trailing blank lines, keep interior ones.
    let bounds = raw
        .iter()
        .position(|(_, l)| !l.trim().is_empty())
        .and_then(|first| {
            raw.iter()
                .rposition(|(_, l)| !l.trim().is_empty())
                .map(|last| (first, last))
        });
    let (content, end_line) = match bounds {
        Some((first, last)) => {
            let body: Vec<&str> = raw[first..=last].iter().map(|(_, l)| l.as_str()).collect();
            (body.join("\n"), raw[last].0)
        }
        None => (String::new(), start_line),
    };

    let section = Section {
        kind: infer_kind(&name),
        name,
        content,
        start_line,
        end_line,
    };
    match sections.iter_mut().find(|s| s.name == section.name) {
        Some(existing) => *existing = section,
        None => sections.push(section),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SectionKind;

    #[test]
    fn test_sections_keep_source_order() {
        let doc = parse("p", "# One\na\n# Two\nb\n# Three\nc\n");
        let names: Vec<&str> = doc.section_names().collect();
        assert_eq!(names, vec!["One", "Two", "Three"]);
    }

    #[test]
    fn test_header_parsed_and_defaults_merged() {
        let doc = parse("p", "---\ntitle: Demo\nversion: 2.1.0\n---\n# World\nx\n");
        assert_eq!(doc.metadata.get("title"), Some("Demo"));
        assert_eq!(doc.metadata.get("version"), Some("2.1.0"));
        assert_eq!(doc.metadata.get("author"), Some("unknown"));
        assert!(doc.metadata.contains("created"));
    }

    #[test]
    fn test_malformed_header_treated_as_absent() {
        let doc = parse("p", "---\nthis line has no separator\n---\n# World\nx\n");
        // Defaults only; the malformed block contributed nothing.
        assert_eq!(doc.metadata.len(), 3);
        assert_eq!(doc.metadata.get("version"), Some("1.0.0"));
        // The delimiter lines are body content with no heading, so discarded.
        assert_eq!(doc.sections.len(), 1);
    }

    #[test]
    fn test_unclosed_header_treated_as_absent() {
        let doc = parse("p", "---\ntitle: Demo\n# World\nx\n");
        assert_eq!(doc.metadata.get("title"), None);
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].name, "World");
    }

    #[test]
    fn test_pre_heading_content_discarded() {
        let doc = parse("p", "stray text\nmore stray\n# World\nkept\n");
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].content, "kept");
    }

    #[test]
    fn test_duplicate_heading_last_wins_first_position() {
        let doc = parse("p", "# A\nfirst\n# B\nmiddle\n# A\nsecond\n");
        let names: Vec<&str> = doc.section_names().collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(doc.section("A").unwrap().content, "second");
    }

    #[test]
    fn test_content_trimmed_of_blank_edges() {
        let doc = parse("p", "# A\n\n\nline one\n\nline two\n\n\n# B\nb\n");
        assert_eq!(doc.section("A").unwrap().content, "line one\n\nline two");
    }

    #[test]
    fn test_double_hash_is_not_a_heading() {
        let doc = parse("p", "# A\n## not a section\ntext\n");
        assert_eq!(doc.sections.len(), 1);
        assert!(doc.section("A").unwrap().content.contains("## not a section"));
    }

    #[test]
    fn test_line_numbers() {
        let doc = parse("p", "---\nv: 1\n---\n# A\n\ncontent\n# B\nb\n");
        let a = doc.section("A").unwrap();
        assert_eq!(a.start_line, 4);
        assert_eq!(a.end_line, 6);
        let b = doc.section("B").unwrap();
        assert_eq!(b.start_line, 7);
        assert_eq!(b.end_line, 8);
    }

    #[test]
    fn test_empty_section() {
        let doc = parse("p", "# A\n# B\nb\n");
        let a = doc.section("A").unwrap();
        assert_eq!(a.content, "");
        assert_eq!(a.end_line, a.start_line);
    }

    #[test]
    fn test_kind_inference_applied() {
        let doc = parse("p", "# 世界观\nx\n# Tone\ny\n# Cast\nz\n");
        assert_eq!(doc.sections[0].kind, SectionKind::World);
        assert_eq!(doc.sections[1].kind, SectionKind::Tone);
        assert_eq!(doc.sections[2].kind, SectionKind::Custom);
    }

    #[test]
    fn test_empty_input() {
        let doc = parse("p", "");
        assert!(doc.sections.is_empty());
        assert_eq!(doc.metadata.len(), 3);
    }
}
