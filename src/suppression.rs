//! Default `should_notify` policy shared by all notifier variants.

use crate::config::SuppressionConfig;
use crate::core::{AlertState, EvalContext, NotificationRecord};
use std::time::Duration;

/// Suppresses repeated notifications for an unchanged alert state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuppressionPolicy {
    /// How long an unchanged state stays suppressed. `None` means an
    /// unchanged state is never re-sent.
    pub repeat_interval: Option<Duration>,
    pub notify_on_no_data: bool,
    pub notify_on_paused: bool,
}

impl From<&SuppressionConfig> for SuppressionPolicy {
    fn from(config: &SuppressionConfig) -> Self {
        Self {
            repeat_interval: config.repeat_interval_seconds.map(Duration::from_secs),
            notify_on_no_data: config.notify_on_no_data,
            notify_on_paused: config.notify_on_paused,
        }
    }
}

impl SuppressionPolicy {
    /// Returns `true` if `ctx` should be delivered given the `last` decision
    /// recorded for the same rule and notifier.
    ///
    /// The evaluation timestamp is used as "now" so that decisions are a pure
    /// function of their inputs.
    pub fn should_notify(&self, ctx: &EvalContext, last: Option<&NotificationRecord>) -> bool {
        match ctx.state {
            AlertState::NoData if !self.notify_on_no_data => return false,
            AlertState::Paused if !self.notify_on_paused => return false,
            _ => {}
        }

        let Some(last) = last else {
            return true;
        };

        if last.state != ctx.state {
            return true;
        }

        match self.repeat_interval {
            None => false,
            Some(interval) => {
                // A clock going backwards counts as "within the window".
                let elapsed = (ctx.eval_time - last.time).to_std().unwrap_or_default();
                elapsed >= interval
            }
        }
    }
}
