//! Chat command parsing.
//!
//! Turns a raw chat message into a [`Command`]. Model shortcuts such as
//! `/claude <text>` are resolved against the registry, so adding a model
//! to the config adds its command too.

use crate::registry::{ModelRegistry, DEFAULT_MODEL_KEY};
use regex::Regex;
use std::sync::LazyLock;

static COMMAND_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^/([^\s@]+)(?:@\S*)?(?:\s+(.*))?$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Models,
    Status,
    Stats,
    Ask { model_key: String, prompt: String },
    Unknown(String),
}

pub fn parse(text: &str, registry: &ModelRegistry) -> Command {
    let text = text.trim();

    let Some(caps) = COMMAND_REGEX.captures(text) else {
        if let Some(rest) = text.strip_prefix('/') {
            let name = rest.split_whitespace().next().unwrap_or_default();
            return Command::Unknown(name.to_string());
        }
        return Command::Ask {
            model_key: DEFAULT_MODEL_KEY.to_string(),
            prompt: text.to_string(),
        };
    };

    let name = caps[1].to_lowercase();
    let rest = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();

    match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "models" => Command::Models,
        "status" => Command::Status,
        "stats" => Command::Stats,
        "ask" => Command::Ask {
            model_key: DEFAULT_MODEL_KEY.to_string(),
            prompt: rest.to_string(),
        },
        key if registry.get(key).is_some() => Command::Ask {
            model_key: key.to_string(),
            prompt: rest.to_string(),
        },
        _ => Command::Unknown(name),
    }
}
