//! Prompt construction for the critique call.

/// Review guidelines: single source of truth for what the critique pass
/// looks for in a canon section.
const GUIDELINES: &str = "\
1. Internal coherence. A rule section must not assert something and its opposite — \
look for permissions granted in one sentence and revoked in another, or tone \
directives that cancel each other out.\n\
2. Actionability. A rule should constrain play. Flag sentences that sound like \
rules but commit to nothing (\"things may or may not happen\").\n\
3. Scope fit. Content should belong to its section: world facts in a world section, \
voice and mood in a tone section. Flag clear misplacements, not judgement calls.\n\
4. Ambiguity that changes outcomes. Flag wording where two reasonable readers would \
run different scenes (undefined terms used as if defined, pronouns with no referent, \
thresholds with no number).\n\
5. Do NOT flag style, spelling, or brevity. Short and plain is fine. Only flag \
problems that would make the rules land differently at the table.";

pub fn system_prompt() -> String {
    format!(
        "You are a reviewer of narrative rule canons — the rule documents that govern \
an AI-driven story world. You receive one section at a time and critique its \
substance.\n\n\
## Review guidelines\n{}\n\n\
Output ONLY a JSON array. Each item: {{\"msg\":\"<finding>\",\"sev\":\"i\"|\"w\"}}. \
Use \"w\" for contradictions and outcome-changing ambiguity, \"i\" for constructive \
suggestions. If the section is sound, output [].\n\n\
Output ONLY the JSON array, nothing else.",
        GUIDELINES
    )
}

pub fn user_message(section_name: &str, content: &str) -> String {
    format!("SECTION \"{}\":\n{}", section_name, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_demands_json_array() {
        let p = system_prompt();
        assert!(p.contains("JSON array"));
        assert!(p.contains("\"sev\""));
    }

    #[test]
    fn test_user_message_carries_section() {
        let m = user_message("World", "a city");
        assert!(m.contains("SECTION \"World\""));
        assert!(m.contains("a city"));
    }
}
