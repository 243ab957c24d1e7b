//! Prompt templates for the summarization backends.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Prompts {
    pub summary: SummaryPrompts,
    pub translation: TranslationPrompts,
}

/// Prompts for transcript summarization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryPrompts {
    pub system: String,
    pub user: String,
}

impl Default for SummaryPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are an expert at summarizing spoken content. Produce a detailed, well-structured summary of the transcript you are given.

Guidelines:
- Lead with a two or three sentence overview
- Follow with the key points as a bulleted list, in the order they are discussed
- Keep names, figures and technical terms exactly as they appear
- Skip greetings, sponsor reads and requests to subscribe
- Never add information that is not in the transcript"#
                .to_string(),

            user: r#"Summarize the following transcript:

{{transcript}}"#
                .to_string(),
        }
    }
}

/// Prompts for summary translation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationPrompts {
    pub system: String,
    pub user: String,
}

impl Default for TranslationPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are an expert translator. Translate the text into the requested language, keeping its meaning, tone and formatting. Reply with the translation only."#
                .to_string(),

            user: r#"Translate the following text into the language with code "{{language}}":

{{text}}"#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts, applying overrides from `custom_dir` when present.
    pub fn load(custom_dir: Option<&str>) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let summary_path = custom_path.join("summary.toml");
            if summary_path.exists() {
                let content = std::fs::read_to_string(&summary_path)?;
                prompts.summary = toml::from_str(&content)?;
            }

            let translation_path = custom_path.join("translation.toml");
            if translation_path.exists() {
                let content = std::fs::read_to_string(&translation_path)?;
                prompts.translation = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// User prompt asking for a summary of `transcript`.
    pub fn summary_request(&self, transcript: &str) -> String {
        let mut vars = HashMap::new();
        vars.insert("transcript".to_string(), transcript.to_string());
        Self::render(&self.summary.user, &vars)
    }

    /// User prompt asking for `text` in `language`.
    pub fn translation_request(&self, text: &str, language: &str) -> String {
        let mut vars = HashMap::new();
        vars.insert("text".to_string(), text.to_string());
        vars.insert("language".to_string(), language.to_string());
        Self::render(&self.translation.user, &vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(!prompts.summary.system.is_empty());
        assert!(!prompts.translation.system.is_empty());
    }

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} messages.";
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Alice".to_string());
        vars.insert("count".to_string(), "5".to_string());

        let result = Prompts::render(template, &vars);
        assert_eq!(result, "Hello Alice, you have 5 messages.");
    }

    #[test]
    fn test_translation_request() {
        let prompts = Prompts::default();
        let rendered = prompts.translation_request("Hola", "en");
        assert!(rendered.contains("\"en\""));
        assert!(rendered.ends_with("Hola"));
    }

    #[test]
    fn test_custom_dir_overrides_summary() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("summary.toml"),
            "system = \"Be brief.\"\nuser = \"TL;DR: {{transcript}}\"\n",
        )
        .unwrap();

        let prompts = Prompts::load(dir.path().to_str()).unwrap();
        assert_eq!(prompts.summary.system, "Be brief.");
        assert_eq!(prompts.summary_request("abc"), "TL;DR: abc");
        assert!(!prompts.translation.system.is_empty());
    }
}
