pub mod engine;
mod parse;
mod prompt;

use grimoire_validate::{SemanticCritic, SemanticFinding};
use serde::{Deserialize, Serialize};

/// Provider settings for the critique backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CritiqueSettings {
    pub provider: String,
    pub api_key: String,
    pub model: String,
}

impl CritiqueSettings {
    /// Whether enough is configured to attempt a call. Ollama runs locally
    /// and needs no key.
    pub fn configured(&self) -> bool {
        !self.provider.is_empty()
            && !self.model.is_empty()
            && (self.provider == "ollama" || !self.api_key.is_empty())
    }
}

/// LLM-backed implementation of the validator's critique capability.
pub struct Critic {
    settings: CritiqueSettings,
}

impl Critic {
    pub fn new(settings: CritiqueSettings) -> Self {
        Self { settings }
    }
}

#[async_trait::async_trait]
impl SemanticCritic for Critic {
    async fn critique_section(
        &self,
        section_name: &str,
        content: &str,
    ) -> Result<Vec<SemanticFinding>, String> {
        if !self.settings.configured() {
            return Ok(vec![]);
        }

        let system = prompt::system_prompt();
        let user_msg = prompt::user_message(section_name, content);

        tracing::debug!(
            provider = %self.settings.provider,
            model = %self.settings.model,
            section = %section_name,
            "sending section for critique"
        );

        let raw = engine::generate(&self.settings, &system, &user_msg).await?;
        tracing::debug!(raw = %raw, "raw critique output");

        let findings = parse::parse_findings(&raw);
        tracing::debug!(count = findings.len(), "parsed critique findings");
        Ok(findings)
    }
}
