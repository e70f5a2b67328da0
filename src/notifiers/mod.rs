//! Delivery channels.
//!
//! Each channel is a separate `Notifier` implementation exposing a
//! `plugin()` descriptor that the registry uses to build it from a
//! `NotifierConfig`.

pub mod slack;
pub mod sns;
pub mod webhook;

use crate::core::EvalContext;
use serde_json::{json, Value};

/// Legacy setting keys accepted in place of a required one.
pub fn setting_aliases(kind: &str, key: &str) -> &'static [&'static str] {
    match (kind, key) {
        (sns::TYPE, "destination") => &["url"],
        _ => &[],
    }
}

/// The generic key/value alert payload shared by JSON-speaking channels.
pub fn alert_payload(ctx: &EvalContext) -> Value {
    json!({
        "title": ctx.title,
        "message": ctx.rule_message,
        "ruleId": ctx.rule_id,
        "ruleName": ctx.rule_name,
        "state": ctx.state,
        "evalMatches": ctx.eval_matches,
        "ruleUrl": ctx.rule_url,
    })
}
