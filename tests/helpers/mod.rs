#![allow(dead_code)]
pub mod mock_notifier;

use alertrelay::core::{AlertState, EvalContext, NotifierConfig};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;

/// A fixed evaluation time so suppression decisions are deterministic.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 5, 10, 30, 0).unwrap()
}

/// Builds an evaluation for `rule_id` at `t0() + offset_secs`.
pub fn eval(rule_id: i64, state: AlertState, offset_secs: i64, notifier_ids: &[i64]) -> EvalContext {
    let mut ctx = EvalContext::new(rule_id, &format!("rule-{rule_id}"), state);
    ctx.eval_time = t0() + chrono::Duration::seconds(offset_secs);
    ctx.notifier_ids = notifier_ids.to_vec();
    ctx
}

pub fn notifier_config(id: i64, kind: &str, settings: &[(&str, &str)]) -> NotifierConfig {
    NotifierConfig {
        id,
        kind: kind.to_string(),
        name: format!("{kind}-{id}"),
        is_default: false,
        enabled: true,
        settings: settings
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
    }
}
