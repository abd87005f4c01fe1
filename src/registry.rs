use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Trait implemented by all widget components.
///
/// Rendering lives in the host surface; the engine only needs to build
/// components from their JSON settings and push settings updates to them.
pub trait WidgetComponent: Send {
    fn on_config_updated(&mut self, _settings: &Value) {}
}

/// Factory for building widget components from JSON settings.
#[derive(Clone)]
pub struct ComponentFactory {
    ctor: Arc<dyn Fn(&Value) -> Box<dyn WidgetComponent> + Send + Sync>,
}

impl ComponentFactory {
    pub fn new<T: WidgetComponent + 'static, C: DeserializeOwned + Default + 'static>(
        build: fn(C) -> T,
    ) -> Self {
        Self {
            ctor: Arc::new(move |v| {
                let cfg = serde_json::from_value::<C>(v.clone()).unwrap_or_default();
                Box::new(build(cfg))
            }),
        }
    }

    pub fn create(&self, settings: &Value) -> Box<dyn WidgetComponent> {
        (self.ctor)(settings)
    }
}

/// Static metadata describing a widget type: sizing limits, defaults and the
/// context tags it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetDescriptor {
    pub widget_key: String,
    pub label: String,
    pub targets: Vec<String>,
    pub min_width: Option<u32>,
    pub default_width: u32,
    pub max_width: Option<u32>,
    pub min_height: Option<u32>,
    pub default_height: u32,
    pub max_height: Option<u32>,
    pub default_configuration: Value,
    /// Always present in every configuration of a matching workspace.
    pub permanent: bool,
    /// No longer offered, but tolerated (and pruned) in old persisted data.
    pub decommissioned: bool,
}

impl WidgetDescriptor {
    pub fn new(widget_key: &str, label: &str) -> Self {
        Self {
            widget_key: widget_key.to_string(),
            label: label.to_string(),
            targets: Vec::new(),
            min_width: None,
            default_width: 4,
            max_width: None,
            min_height: None,
            default_height: 3,
            max_height: None,
            default_configuration: json!({}),
            permanent: false,
            decommissioned: false,
        }
    }

    pub fn with_targets(mut self, targets: &[&str]) -> Self {
        self.targets = targets.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_default_size(mut self, width: u32, height: u32) -> Self {
        self.default_width = width;
        self.default_height = height;
        self
    }

    pub fn with_min_size(mut self, width: u32, height: u32) -> Self {
        self.min_width = Some(width);
        self.min_height = Some(height);
        self
    }

    pub fn with_max_size(mut self, width: u32, height: u32) -> Self {
        self.max_width = Some(width);
        self.max_height = Some(height);
        self
    }

    pub fn with_default_configuration(mut self, configuration: Value) -> Self {
        self.default_configuration = configuration;
        self
    }

    pub fn permanent(mut self) -> Self {
        self.permanent = true;
        self
    }

    pub fn decommissioned(mut self) -> Self {
        self.decommissioned = true;
        self
    }

    /// Whether this widget applies to any of the given context tags. An empty
    /// target list on either side means "unrestricted".
    pub fn applies_to(&self, targets: &[String]) -> bool {
        if self.targets.is_empty() || targets.is_empty() {
            return true;
        }
        self.targets.iter().any(|t| targets.contains(t))
    }
}

#[derive(Clone)]
struct RegistryEntry {
    descriptor: WidgetDescriptor,
    factory: ComponentFactory,
}

/// Process-wide table mapping widget keys to component factories and
/// descriptors. Populated during application bootstrap, before any
/// configuration is completed, and append-only afterwards.
#[derive(Clone, Default)]
pub struct WidgetRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite the entry for a widget key. A descriptor whose key is
    /// missing or does not match is logged and ignored; registration must
    /// never take down the caller.
    pub fn register(&mut self, widget_key: &str, factory: ComponentFactory, descriptor: WidgetDescriptor) {
        if descriptor.widget_key.is_empty() {
            tracing::error!(widget = %widget_key, "widget descriptor has no key; registration ignored");
            return;
        }
        if descriptor.widget_key != widget_key {
            tracing::error!(
                widget = %widget_key,
                descriptor = %descriptor.widget_key,
                "widget descriptor key mismatch; registration ignored"
            );
            return;
        }
        self.entries
            .insert(widget_key.to_string(), RegistryEntry { descriptor, factory });
    }

    pub fn contains(&self, widget_key: &str) -> bool {
        self.entries.contains_key(widget_key)
    }

    pub fn descriptor(&self, widget_key: &str) -> Option<&WidgetDescriptor> {
        self.entries.get(widget_key).map(|e| &e.descriptor)
    }

    pub fn component(&self, widget_key: &str) -> Option<&ComponentFactory> {
        self.entries.get(widget_key).map(|e| &e.factory)
    }

    pub fn default_configuration(&self, widget_key: &str) -> Option<Value> {
        self.entries
            .get(widget_key)
            .map(|e| e.descriptor.default_configuration.clone())
    }

    /// All non-decommissioned descriptors whose targets intersect the given
    /// set, sorted by widget key. Used to offer only widgets relevant to the
    /// current surface.
    pub fn compatible_descriptors(&self, targets: &[String]) -> Vec<&WidgetDescriptor> {
        let mut matches: Vec<&WidgetDescriptor> = self
            .entries
            .values()
            .map(|e| &e.descriptor)
            .filter(|d| !d.decommissioned && d.applies_to(targets))
            .collect();
        matches.sort_by(|a, b| a.widget_key.cmp(&b.widget_key));
        matches
    }

    /// Keys of descriptors flagged permanent that apply to the given targets.
    pub fn permanent_keys(&self, targets: &[String]) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .values()
            .map(|e| &e.descriptor)
            .filter(|d| d.permanent && !d.decommissioned && d.applies_to(targets))
            .map(|d| d.widget_key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}
