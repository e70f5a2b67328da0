// src/formatting.rs

use crate::core::{AlertState, EvalContext, EvalMatch};

/// A trait for rendering an evaluation into a chat message.
pub trait TextFormatter: Send + Sync {
    fn format(&self, ctx: &EvalContext) -> String;
}

/// A formatter for Slack that creates a short, readable, and actionable message.
#[derive(Debug, Clone, Default)]
pub struct SlackTextFormatter {
    /// Prepended to the message for non-OK states, e.g. `@channel`.
    pub mention: Option<String>,
}

impl SlackTextFormatter {
    fn format_match(&self, m: &EvalMatch) -> String {
        let value = match m.value {
            Some(v) => format_value(v),
            None => "null".to_string(),
        };
        if m.tags.is_empty() {
            format!("• {}: {}", m.metric, value)
        } else {
            let tags: Vec<String> = m.tags.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            format!("• {} {{{}}}: {}", m.metric, tags.join(", "), value)
        }
    }
}

impl TextFormatter for SlackTextFormatter {
    fn format(&self, ctx: &EvalContext) -> String {
        let mut lines = Vec::new();

        let title = if ctx.rule_url.is_empty() {
            format!("*{}*", ctx.title)
        } else {
            format!("*<{}|{}>*", ctx.rule_url, ctx.title)
        };
        match (&self.mention, ctx.state) {
            (Some(mention), state) if state != AlertState::Ok => {
                lines.push(format!("{} {} {}", state_emoji(state), mention, title));
            }
            (_, state) => lines.push(format!("{} {}", state_emoji(state), title)),
        }

        if !ctx.rule_message.is_empty() {
            lines.push(ctx.rule_message.clone());
        }

        if !ctx.eval_matches.is_empty() {
            let matches: Vec<String> = ctx.eval_matches.iter().map(|m| self.format_match(m)).collect();
            lines.push(format!("```\n{}\n```", matches.join("\n")));
        }

        lines.join("\n")
    }
}

fn state_emoji(state: AlertState) -> &'static str {
    match state {
        AlertState::Ok => ":white_check_mark:",
        AlertState::Alerting => ":rotating_light:",
        AlertState::NoData => ":grey_question:",
        AlertState::Paused => ":double_vertical_bar:",
        AlertState::Error => ":x:",
    }
}

/// Drops the fractional part for whole numbers.
fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{:.3}", v)
    }
}
