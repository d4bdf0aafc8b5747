//! Static mapping from command keys to upstream models.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Key every registry must carry; used when a request names no model.
pub const DEFAULT_MODEL_KEY: &str = "default";

/// One routable model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelSpec {
    /// Short command key, e.g. `claude`.
    pub key: String,
    /// Identifier passed verbatim to the upstream API.
    pub model_id: String,
    /// Name shown in reply headers.
    pub display_name: String,
}

impl ModelSpec {
    pub fn new(key: &str, model_id: &str, display_name: &str) -> Self {
        Self {
            key: key.to_string(),
            model_id: model_id.to_string(),
            display_name: display_name.to_string(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.key == DEFAULT_MODEL_KEY
    }
}

/// Immutable, ordered model table.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelSpec>,
}

impl ModelRegistry {
    /// Built-in table used when the config declares no models.
    pub fn builtin() -> Self {
        Self {
            models: vec![
                ModelSpec::new(DEFAULT_MODEL_KEY, "openai/gpt-4", "GPT-4"),
                ModelSpec::new("gpt", "openai/gpt-4o", "GPT-4o"),
                ModelSpec::new("claude", "anthropic/claude-3.5-sonnet", "Claude 3.5 Sonnet"),
                ModelSpec::new("gemini", "google/gemini-pro-1.5", "Gemini Pro 1.5"),
                ModelSpec::new("llama", "meta-llama/llama-3.1-70b-instruct", "Llama 3.1 70B"),
                ModelSpec::new("mistral", "mistralai/mistral-large", "Mistral Large"),
                ModelSpec::new("deepseek", "deepseek/deepseek-chat", "DeepSeek Chat"),
            ],
        }
    }

    /// Build from configured specs. Keys are lowercased and must be unique,
    /// and a `default` entry is required.
    pub fn from_specs(specs: Vec<ModelSpec>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut models = Vec::with_capacity(specs.len());

        for mut spec in specs {
            spec.key = spec.key.trim().to_lowercase();
            if spec.key.is_empty() {
                return Err(ConfigError::Invalid("model key must not be empty".into()));
            }
            if spec.model_id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "model '{}' has an empty model_id",
                    spec.key
                )));
            }
            if !seen.insert(spec.key.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate model key '{}'",
                    spec.key
                )));
            }
            models.push(spec);
        }

        if !seen.contains(DEFAULT_MODEL_KEY) {
            return Err(ConfigError::Invalid(format!(
                "models must include a '{}' entry",
                DEFAULT_MODEL_KEY
            )));
        }

        Ok(Self { models })
    }

    /// Case-insensitive lookup by command key.
    pub fn get(&self, key: &str) -> Option<&ModelSpec> {
        let key = key.trim();
        self.models.iter().find(|m| m.key.eq_ignore_ascii_case(key))
    }

    pub fn default_model(&self) -> &ModelSpec {
        // from_specs and builtin both guarantee the entry
        self.get(DEFAULT_MODEL_KEY).unwrap_or(&self.models[0])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.iter()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.key.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
