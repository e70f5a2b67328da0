//! The process-wide notifier registry.
//!
//! Every notifier type is registered once during startup with a
//! `NotifierPlugin` describing its settings and how to build it. After
//! `install` the registry is frozen and read without locking.

use crate::core::{Notifier, NotifierConfig};
use crate::error::NotifyError;
use crate::notifiers;
use crate::suppression::SuppressionPolicy;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// Builds a notifier from its persisted configuration.
pub type NotifierFactory =
    fn(&NotifierConfig, SuppressionPolicy) -> Result<Arc<dyn Notifier>, NotifyError>;

/// UI metadata for one setting of a notifier type.
#[derive(Debug, Clone, Serialize)]
pub struct SettingDescriptor {
    pub key: &'static str,
    pub label: &'static str,
    pub placeholder: &'static str,
    pub required: bool,
}

/// Descriptor of a notifier type.
#[derive(Clone, Serialize)]
pub struct NotifierPlugin {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub settings: &'static [SettingDescriptor],
    #[serde(skip)]
    pub factory: NotifierFactory,
}

impl std::fmt::Debug for NotifierPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierPlugin")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct NotifierRegistry {
    plugins: BTreeMap<&'static str, NotifierPlugin>,
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every notifier type shipped with this crate.
    pub fn with_builtin() -> Result<Self, NotifyError> {
        let mut registry = Self::new();
        registry.register(notifiers::sns::plugin())?;
        registry.register(notifiers::webhook::plugin())?;
        registry.register(notifiers::slack::plugin())?;
        Ok(registry)
    }

    pub fn register(&mut self, plugin: NotifierPlugin) -> Result<(), NotifyError> {
        if self.plugins.contains_key(plugin.kind) {
            return Err(NotifyError::DuplicateType(plugin.kind.to_string()));
        }
        self.plugins.insert(plugin.kind, plugin);
        Ok(())
    }

    pub fn resolve(&self, kind: &str) -> Result<&NotifierPlugin, NotifyError> {
        self.plugins
            .get(kind)
            .ok_or_else(|| NotifyError::UnknownType(kind.to_string()))
    }

    /// Registered descriptors, ordered by type name.
    pub fn plugins(&self) -> impl Iterator<Item = &NotifierPlugin> {
        self.plugins.values()
    }

    /// Validates `config` against its descriptor and constructs the notifier.
    pub fn build(
        &self,
        config: &NotifierConfig,
        policy: SuppressionPolicy,
    ) -> Result<Arc<dyn Notifier>, NotifyError> {
        let plugin = self.resolve(&config.kind)?;
        for setting in plugin.settings.iter().filter(|s| s.required) {
            // Aliased keys are resolved by the factory itself.
            if config.setting(setting.key).is_none() && !has_alias(plugin, config, setting.key) {
                return Err(NotifyError::validation(format!(
                    "notifier '{}' is missing required setting '{}'",
                    config.name, setting.key
                )));
            }
        }
        (plugin.factory)(config, policy)
    }
}

fn has_alias(plugin: &NotifierPlugin, config: &NotifierConfig, key: &str) -> bool {
    notifiers::setting_aliases(plugin.kind, key)
        .iter()
        .any(|alias| config.setting(alias).is_some())
}

static GLOBAL: OnceLock<NotifierRegistry> = OnceLock::new();

/// Installs the process-wide registry. Fails if one is already installed.
pub fn install(registry: NotifierRegistry) -> Result<&'static NotifierRegistry, NotifyError> {
    let mut pending = Some(registry);
    let installed = GLOBAL.get_or_init(|| pending.take().unwrap_or_default());
    match pending {
        None => Ok(installed),
        Some(_) => Err(NotifyError::validation("notifier registry already installed")),
    }
}

/// The installed registry, if `install` has run.
pub fn global() -> Option<&'static NotifierRegistry> {
    GLOBAL.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(kind: &str, settings: &[(&str, &str)]) -> NotifierConfig {
        NotifierConfig {
            id: 1,
            kind: kind.to_string(),
            name: "ops".to_string(),
            is_default: false,
            enabled: true,
            settings: settings
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = NotifierRegistry::with_builtin().unwrap();
        let err = registry.register(notifiers::sns::plugin()).unwrap_err();
        assert!(matches!(err, NotifyError::DuplicateType(kind) if kind == "amazonsns"));
    }

    #[test]
    fn test_resolve_unknown_type() {
        let registry = NotifierRegistry::with_builtin().unwrap();
        let err = registry.resolve("pagerduty").unwrap_err();
        assert!(matches!(err, NotifyError::UnknownType(kind) if kind == "pagerduty"));
    }

    #[test]
    fn test_builtin_types_are_listed_in_order() {
        let registry = NotifierRegistry::with_builtin().unwrap();
        let kinds: Vec<_> = registry.plugins().map(|p| p.kind).collect();
        assert_eq!(kinds, vec!["amazonsns", "slack", "webhook"]);
    }

    #[test]
    fn test_build_rejects_missing_required_setting() {
        let registry = NotifierRegistry::with_builtin().unwrap();
        let err = registry
            .build(&config("webhook", &[]), SuppressionPolicy::default())
            .unwrap_err();
        assert!(matches!(err, NotifyError::Validation { .. }));
    }

    #[test]
    fn test_build_accepts_aliased_setting() {
        let registry = NotifierRegistry::with_builtin().unwrap();
        let notifier = registry
            .build(
                &config("amazonsns", &[("url", "arn:aws:sns:us-east-1:111111111111:topic")]),
                SuppressionPolicy::default(),
            )
            .unwrap();
        assert_eq!(notifier.base().kind, "amazonsns");
    }

    #[test]
    fn test_install_is_one_shot() {
        let first = install(NotifierRegistry::with_builtin().unwrap());
        let second = install(NotifierRegistry::new());
        assert!(first.is_ok());
        assert!(second.is_err());
        assert!(global().unwrap().resolve("amazonsns").is_ok());
    }
}
