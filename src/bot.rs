//! Chat front end: routes parsed commands to the dispatcher.

use crate::commands::{self, Command};
use crate::dispatcher::{DispatchRequest, Dispatcher};
use crate::roles::{Role, UserId, ADMIN_QUOTA, PREMIUM_QUOTA, STANDARD_QUOTA};
use crate::usage::date_bucket;
use chrono::Utc;
use std::fmt::Write as _;
use std::sync::Arc;

#[derive(Clone)]
pub struct Bot {
    dispatcher: Arc<Dispatcher>,
}

impl Bot {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Handle one chat message and return the reply text.
    pub async fn handle_message(&self, user: &UserId, text: &str) -> String {
        match commands::parse(text, self.dispatcher.registry()) {
            Command::Start => self.welcome(user),
            Command::Help => self.help(),
            Command::Models => self.models(),
            Command::Status => self.dispatcher.probe().await.to_message(),
            Command::Stats => self.stats(user),
            Command::Ask { model_key, prompt } => {
                let request = DispatchRequest::new(user.clone(), Some(&model_key), prompt);
                self.dispatcher.dispatch(request).await.text
            }
            Command::Unknown(name) => {
                format!("Unknown command '/{}'. Use /help to see what I can do.", name)
            }
        }
    }

    fn welcome(&self, user: &UserId) -> String {
        let role = self.dispatcher.roles().role_of(user);
        format!(
            "Welcome! Send me a question and I will pass it to an AI model.\n\
             Your plan: {} ({} requests per minute).\n\
             Use /help to see all commands.",
            role,
            role.quota()
        )
    }

    fn help(&self) -> String {
        let mut out = String::from(
            "Commands:\n\
             /ask <question> - ask the default model\n",
        );
        for spec in self.dispatcher.registry().iter().filter(|m| !m.is_default()) {
            let _ = writeln!(out, "/{} <question> - ask {}", spec.key, spec.display_name);
        }
        let _ = write!(
            out,
            "/models - list available models\n\
             /status - check the AI service\n\
             /stats - usage statistics (admins)\n\n\
             Limits per minute: standard {}, premium {}, admin {}.",
            STANDARD_QUOTA, PREMIUM_QUOTA, ADMIN_QUOTA
        );
        out
    }

    fn models(&self) -> String {
        let mut out = String::from("Available models:\n");
        for spec in self.dispatcher.registry().iter() {
            let _ = writeln!(out, "• {} (/{})", spec.display_name, spec.key);
        }
        out.trim_end().to_string()
    }

    fn stats(&self, user: &UserId) -> String {
        if self.dispatcher.roles().role_of(user) != Role::Admin {
            return "Statistics are only available to administrators.".to_string();
        }

        let snapshot = self.dispatcher.usage().snapshot();
        let today = date_bucket(&Utc::now());
        let mut out = format!(
            "Usage statistics\nTotal requests: {}\nUsers: {}\nToday: {}\n",
            snapshot.total,
            snapshot.users_seen,
            snapshot.daily.get(&today).copied().unwrap_or(0)
        );

        if !snapshot.per_model.is_empty() {
            out.push_str("By model:\n");
            let mut models: Vec<_> = snapshot.per_model.iter().collect();
            models.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (model, count) in models {
                let _ = writeln!(out, "  {}: {}", model, count);
            }
        }
        out.trim_end().to_string()
    }
}
