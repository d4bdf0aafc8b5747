//! Dispatch summaries with configurable verbosity levels.
//!
//! Supports three verbosity levels:
//! - Minimal: One-liner nginx-style
//! - Compact: Request/response arrow pair
//! - Verbose: Full block with separators

use crate::config::LogVerbosity;

/// Everything worth logging about one finished dispatch.
#[derive(Debug, Clone)]
pub struct DispatchSummary {
    pub request_id: String,
    pub user: String,
    pub model: String,
    /// `delivered`, or the error tag of the failure.
    pub status: String,
    pub latency_ms: u64,
    pub prompt_chars: usize,
    pub reply_chars: usize,
}

/// Format duration in human-readable form.
fn format_duration(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}

/// Short request id for terminal output.
fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

pub fn format_dispatch(summary: &DispatchSummary, verbosity: LogVerbosity) -> String {
    match verbosity {
        LogVerbosity::Minimal => format_minimal(summary),
        LogVerbosity::Compact => format_compact(summary),
        LogVerbosity::Verbose => format_verbose(summary),
    }
}

fn format_minimal(s: &DispatchSummary) -> String {
    format!(
        "{} {} {} {} {}",
        short_id(&s.request_id),
        s.user,
        s.model,
        s.status,
        format_duration(s.latency_ms)
    )
}

fn format_compact(s: &DispatchSummary) -> String {
    let request_line = format!(
        "→ {} [{}] user={} ({} chars)",
        short_id(&s.request_id),
        s.model,
        s.user,
        s.prompt_chars
    );
    let response_line = format!(
        "← {} ({}, {} chars)",
        s.status,
        format_duration(s.latency_ms),
        s.reply_chars
    );
    format!("{}\n{}", request_line, response_line)
}

fn format_verbose(s: &DispatchSummary) -> String {
    let separator = "────────────────────────────────────────";
    format!(
        "{separator}\n\
         Request: {id}\n\
         User: {user}\n\
         Model: {model}\n\
         Status: {status}\n\
         Timing: {duration}\n\
         Size: {prompt} prompt chars, {reply} reply chars\n\
         {separator}",
        separator = separator,
        id = s.request_id,
        user = s.user,
        model = s.model,
        status = s.status,
        duration = format_duration(s.latency_ms),
        prompt = s.prompt_chars,
        reply = s.reply_chars,
    )
}
