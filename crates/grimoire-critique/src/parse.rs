use grimoire_validate::{SemanticFinding, Severity};

#[derive(serde::Deserialize)]
struct LlmFinding {
    msg: String,
    sev: Option<String>,
}

/// Parse raw LLM output into findings. Returns empty on total parse failure
/// (graceful degradation).
pub fn parse_findings(raw: &str) -> Vec<SemanticFinding> {
    let json_str = match extract_json_array(raw) {
        Some(s) => s,
        None => return vec![],
    };

    // Try full array parse first
    let findings: Vec<LlmFinding> = match serde_json::from_str(&json_str) {
        Ok(f) => f,
        Err(_) => {
            // Fall back to line-by-line extraction
            parse_line_by_line(&json_str)
        }
    };

    findings
        .into_iter()
        .filter(|f| !f.msg.trim().is_empty())
        .map(|f| SemanticFinding {
            message: f.msg,
            severity: map_severity(f.sev.as_deref()),
        })
        .collect()
}

/// Extract the JSON array substring from raw LLM output.
fn extract_json_array(raw: &str) -> Option<String> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    if end <= start {
        return None;
    }
    Some(raw[start..=end].to_string())
}

/// Try to parse individual objects from a malformed JSON array.
fn parse_line_by_line(json_str: &str) -> Vec<LlmFinding> {
    let inner = json_str
        .trim()
        .strip_prefix('[')
        .unwrap_or(json_str)
        .strip_suffix(']')
        .unwrap_or(json_str);

    let mut findings = Vec::new();
    let mut depth = 0;
    let mut start = None;

    for (i, ch) in inner.char_indices() {
        match ch {
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        let obj_str = &inner[s..=i];
                        if let Ok(finding) = serde_json::from_str::<LlmFinding>(obj_str) {
                            findings.push(finding);
                        }
                    }
                    start = None;
                }
            }
            _ => {}
        }
    }

    findings
}

fn map_severity(s: Option<&str>) -> Severity {
    match s {
        Some("w") => Severity::Warning,
        _ => Severity::Info,
    }
}
