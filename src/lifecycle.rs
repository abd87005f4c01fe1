use crate::config::{
    ConfigurationKind, LayoutEntry, WidgetInstance, WorkspaceConfiguration, DATA_MODEL_VERSION,
};
use crate::ids::generate_id;
use crate::layout::{entry_for, generate_default_layout};
use crate::registry::WidgetRegistry;
use serde_json::Value;

/// Default-configuration generator for one workspace: the seed every fresh
/// configuration is built from, and the source of truth for the exclusion,
/// permanent and conditional widget policies. Policies are re-read from here
/// on every completion pass so persisted copies can never pin a user to a
/// stale policy.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceDefaults {
    pub name: String,
    pub label: String,
    pub kind: ConfigurationKind,
    pub targets: Vec<String>,
    pub default_widgets: Vec<String>,
    pub exclude_widgets: Vec<String>,
    pub permanent_widgets: Vec<String>,
    pub conditional_widgets: Vec<String>,
}

impl WorkspaceDefaults {
    pub fn new(name: &str, label: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: ConfigurationKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_targets(mut self, targets: &[&str]) -> Self {
        self.targets = targets.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_widgets(mut self, widget_keys: &[&str]) -> Self {
        self.default_widgets = widget_keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_excluded(mut self, widget_keys: &[&str]) -> Self {
        self.exclude_widgets = widget_keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_permanent(mut self, widget_keys: &[&str]) -> Self {
        self.permanent_widgets = widget_keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_conditional(mut self, widget_keys: &[&str]) -> Self {
        self.conditional_widgets = widget_keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Keys that must always be present: the workspace's own permanent list
    /// plus every registered descriptor flagged permanent that applies to
    /// this workspace's targets.
    pub fn permanent_keys(&self, registry: &WidgetRegistry) -> Vec<String> {
        let mut keys = self.permanent_widgets.clone();
        for key in registry.permanent_keys(&self.targets) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    /// Fresh widget instances for the workspace's default widget list.
    pub fn default_instances(&self, registry: &WidgetRegistry) -> Vec<WidgetInstance> {
        let mut instances = Vec::with_capacity(self.default_widgets.len());
        for key in &self.default_widgets {
            let Some(descriptor) = registry.descriptor(key) else {
                tracing::warn!(widget = %key, workspace = %self.name, "default widget not registered; skipped");
                continue;
            };
            if descriptor.decommissioned {
                continue;
            }
            instances.push(WidgetInstance::new(key, descriptor.default_configuration.clone()));
        }
        instances
    }

    /// Build a brand-new completed configuration for this workspace.
    pub fn build(&self, registry: &WidgetRegistry) -> WorkspaceConfiguration {
        let (configuration, _warnings) =
            complete_configuration(&Value::Null, self, registry);
        configuration
    }
}

/// Normalize, migrate and repair a raw persisted configuration into a fully
/// valid one. This runs on every read and every write, never fails, and is
/// idempotent: anything it cannot resolve is dropped (and reported in the
/// returned warnings) rather than surfaced as an error, because a workspace
/// with fewer widgets is an acceptable degraded state and a workspace that
/// fails to render is not.
pub fn complete_configuration(
    raw: &Value,
    defaults: &WorkspaceDefaults,
    registry: &WidgetRegistry,
) -> (WorkspaceConfiguration, Vec<String>) {
    let mut warnings = Vec::new();

    let mut cfg: WorkspaceConfiguration = match serde_json::from_value(raw.clone()) {
        Ok(cfg) => cfg,
        Err(e) => {
            if !raw.is_null() {
                tracing::warn!(workspace = %defaults.name, error = %e, "unreadable configuration; rebuilding from defaults");
                warnings.push(format!("unreadable configuration rebuilt from defaults: {e}"));
            }
            WorkspaceConfiguration::default()
        }
    };

    // Field defaulting. serde has already filled cols/row_height; identity
    // fields fall back to the workspace seed.
    if cfg.id.is_empty() {
        cfg.id = generate_id();
    }
    if cfg.name.is_empty() {
        cfg.name = defaults.name.clone();
    }
    if cfg.label.is_empty() {
        cfg.label = defaults.label.clone();
    }
    if cfg.targets.is_empty() {
        cfg.targets = defaults.targets.clone();
    }

    if cfg.data_model_version < DATA_MODEL_VERSION {
        // Outdated data is unsalvageable: discard the stored widgets and
        // layout and regenerate from the workspace defaults, keeping the
        // configuration's identity. A field-level upgrade chain only becomes
        // worthwhile once a second incompatible version has shipped.
        if !cfg.widgets.is_empty() || !cfg.layout.is_empty() {
            tracing::warn!(
                workspace = %cfg.name,
                configuration = %cfg.id,
                version = cfg.data_model_version,
                "configuration predates schema version; widgets and layout reset to defaults"
            );
            warnings.push(format!(
                "configuration '{}' predates schema version {DATA_MODEL_VERSION}; reset to defaults",
                cfg.label
            ));
        }
        cfg.widgets = defaults.default_instances(registry);
        cfg.layout = generate_default_layout(&cfg.widgets, registry);
        cfg.data_model_version = DATA_MODEL_VERSION;
    } else {
        drop_unresolved_widgets(&mut cfg, registry, &mut warnings);
        for instance in &mut cfg.widgets {
            if instance.id.is_empty() {
                instance.id = generate_id();
            }
        }
        if cfg.layout.is_empty() {
            cfg.layout = generate_default_layout(&cfg.widgets, registry);
        } else {
            cfg.layout = conform_layout(&cfg.widgets, &cfg.layout, registry);
        }
    }

    prune_decommissioned(&mut cfg, registry, &mut warnings);

    // Exclusion and permanence policies come from the current defaults, never
    // from the persisted copy.
    cfg.exclude_widgets = defaults.exclude_widgets.clone();
    apply_exclusions(&mut cfg, &mut warnings);

    cfg.permanent_widgets = defaults.permanent_keys(registry);
    guarantee_permanent(&mut cfg, registry);

    // Whether a conditional widget is actually shown is decided by the
    // consuming surface; completion only carries the current list through.
    cfg.conditional_widgets = defaults.conditional_widgets.clone();

    (cfg, warnings)
}

fn drop_unresolved_widgets(
    cfg: &mut WorkspaceConfiguration,
    registry: &WidgetRegistry,
    warnings: &mut Vec<String>,
) {
    cfg.widgets.retain(|instance| {
        if registry.contains(&instance.widget_key) {
            return true;
        }
        tracing::warn!(
            widget = %instance.widget_key,
            workspace = %cfg.name,
            "unknown widget key dropped from configuration"
        );
        warnings.push(format!("unknown widget '{}' dropped", instance.widget_key));
        false
    });
}

/// Pair every widget instance with a layout entry. Entries are matched by
/// instance id first, then positionally for legacy data that predates ids;
/// widgets left without an entry get one appended below everything else, and
/// entries left without a widget are dropped. Spans are filled from the
/// descriptor when missing and raised to the descriptor minimum when lower;
/// stored spans are never lowered to a new maximum, so a user's deliberate
/// sizing survives policy changes. Bound fields are always refreshed from
/// the descriptor.
fn conform_layout(
    widgets: &[WidgetInstance],
    layout: &[LayoutEntry],
    registry: &WidgetRegistry,
) -> Vec<LayoutEntry> {
    let mut used = vec![false; layout.len()];
    let mut conformed = Vec::with_capacity(widgets.len());
    let mut unplaced = Vec::new();

    for (i, instance) in widgets.iter().enumerate() {
        // Descriptors are guaranteed resolvable here; unknown keys were
        // already dropped.
        let Some(descriptor) = registry.descriptor(&instance.widget_key) else {
            continue;
        };
        let matched = layout
            .iter()
            .position(|e| !e.id.is_empty() && e.id == instance.id)
            .filter(|&idx| !used[idx])
            .or_else(|| {
                (i < layout.len() && layout[i].id.is_empty() && !used[i]).then_some(i)
            });
        match matched {
            Some(idx) => {
                used[idx] = true;
                let mut entry = layout[idx].clone();
                entry.id = instance.id.clone();
                entry.w = Some(raise_span(entry.w, descriptor.default_width, descriptor.min_width));
                entry.h = Some(raise_span(entry.h, descriptor.default_height, descriptor.min_height));
                entry.min_w = descriptor.min_width;
                entry.max_w = descriptor.max_width;
                entry.min_h = descriptor.min_height;
                entry.max_h = descriptor.max_height;
                conformed.push(entry);
            }
            None => unplaced.push(i),
        }
    }

    for (idx, entry) in layout.iter().enumerate() {
        if !used[idx] {
            tracing::warn!(entry = %entry.id, "layout entry without widget instance dropped");
        }
    }

    for i in unplaced {
        let instance = &widgets[i];
        let Some(descriptor) = registry.descriptor(&instance.widget_key) else {
            continue;
        };
        let bottom = conformed.iter().map(LayoutEntry::bottom).max().unwrap_or(0);
        conformed.push(entry_for(instance, descriptor, bottom));
    }

    conformed
}

fn raise_span(current: Option<u32>, default: u32, min: Option<u32>) -> u32 {
    let span = current.unwrap_or(default);
    match min {
        Some(min) => span.max(min),
        None => span,
    }
}

fn prune_decommissioned(
    cfg: &mut WorkspaceConfiguration,
    registry: &WidgetRegistry,
    warnings: &mut Vec<String>,
) {
    let decommissioned: Vec<String> = cfg
        .widgets
        .iter()
        .filter(|w| {
            registry
                .descriptor(&w.widget_key)
                .map(|d| d.decommissioned)
                .unwrap_or(false)
        })
        .map(|w| w.id.clone())
        .collect();
    if decommissioned.is_empty() {
        return;
    }
    for instance in cfg.widgets.iter().filter(|w| decommissioned.contains(&w.id)) {
        tracing::warn!(
            widget = %instance.widget_key,
            workspace = %cfg.name,
            "decommissioned widget removed from configuration"
        );
        warnings.push(format!(
            "decommissioned widget '{}' removed",
            instance.widget_key
        ));
    }
    cfg.widgets.retain(|w| !decommissioned.contains(&w.id));
    cfg.layout.retain(|e| !decommissioned.contains(&e.id));
}

fn apply_exclusions(cfg: &mut WorkspaceConfiguration, warnings: &mut Vec<String>) {
    let excluded: Vec<String> = cfg
        .widgets
        .iter()
        .filter(|w| cfg.exclude_widgets.contains(&w.widget_key))
        .map(|w| w.id.clone())
        .collect();
    if excluded.is_empty() {
        return;
    }
    for instance in cfg.widgets.iter().filter(|w| excluded.contains(&w.id)) {
        warnings.push(format!("excluded widget '{}' removed", instance.widget_key));
    }
    cfg.widgets.retain(|w| !excluded.contains(&w.id));
    cfg.layout.retain(|e| !excluded.contains(&e.id));
}

/// Append every missing permanent widget, with its default configuration and
/// a layout entry below the existing grid. Appended at the end, never
/// interleaved.
fn guarantee_permanent(cfg: &mut WorkspaceConfiguration, registry: &WidgetRegistry) {
    for key in cfg.permanent_widgets.clone() {
        if cfg.has_widget(&key) {
            continue;
        }
        let Some(descriptor) = registry.descriptor(&key) else {
            tracing::warn!(widget = %key, "permanent widget not registered; skipped");
            continue;
        };
        if descriptor.decommissioned {
            continue;
        }
        let instance = WidgetInstance::new(&key, descriptor.default_configuration.clone());
        let bottom = cfg.layout.iter().map(LayoutEntry::bottom).max().unwrap_or(0);
        cfg.layout.push(entry_for(&instance, descriptor, bottom));
        cfg.widgets.push(instance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ComponentFactory, WidgetDescriptor};
    use serde_json::json;

    #[derive(Default)]
    struct DummyComponent;

    #[derive(Default, serde::Deserialize)]
    struct DummyConfig;

    impl crate::registry::WidgetComponent for DummyComponent {}

    fn dummy_factory() -> ComponentFactory {
        ComponentFactory::new(|_: DummyConfig| DummyComponent)
    }

    fn test_registry() -> WidgetRegistry {
        let mut reg = WidgetRegistry::new();
        reg.register(
            "notes",
            dummy_factory(),
            WidgetDescriptor::new("notes", "Notes")
                .with_default_size(4, 3)
                .with_min_size(2, 2),
        );
        reg.register(
            "tasks",
            dummy_factory(),
            WidgetDescriptor::new("tasks", "Tasks").with_default_size(6, 4),
        );
        reg.register(
            "retired",
            dummy_factory(),
            WidgetDescriptor::new("retired", "Retired").decommissioned(),
        );
        reg
    }

    fn defaults() -> WorkspaceDefaults {
        WorkspaceDefaults::new("dashboard", "Dashboard").with_widgets(&["notes", "tasks"])
    }

    #[test]
    fn build_produces_completed_default() {
        let registry = test_registry();
        let cfg = defaults().build(&registry);
        assert!(!cfg.id.is_empty());
        assert_eq!(cfg.name, "dashboard");
        assert_eq!(cfg.data_model_version, DATA_MODEL_VERSION);
        assert_eq!(cfg.widgets.len(), 2);
        assert_eq!(cfg.layout.len(), 2);
        assert_eq!(cfg.layout[1].y, 3);
    }

    #[test]
    fn scalar_target_is_normalized() {
        let registry = test_registry();
        let raw = json!({ "data_model_version": DATA_MODEL_VERSION, "targets": "user" });
        let (cfg, _) = complete_configuration(&raw, &defaults(), &registry);
        assert_eq!(cfg.targets, vec!["user".to_string()]);
    }

    #[test]
    fn missing_version_discards_widgets_but_keeps_identity() {
        let registry = test_registry();
        let raw = json!({
            "id": "keep-me",
            "label": "Custom",
            "widgets": [{ "widget_key": "tasks", "configuration": {} }],
            "layout": [{ "x": 3, "y": 3, "w": 1, "h": 1 }]
        });
        let (cfg, warnings) = complete_configuration(&raw, &defaults(), &registry);
        assert_eq!(cfg.id, "keep-me");
        assert_eq!(cfg.label, "Custom");
        assert_eq!(cfg.widget_keys(), vec!["notes", "tasks"]);
        assert_eq!(cfg.layout[0].x, 0);
        assert!(!warnings.is_empty());
    }

    #[test]
    fn spans_are_raised_to_minimum_never_lowered() {
        let mut registry = test_registry();
        registry.register(
            "capped",
            dummy_factory(),
            WidgetDescriptor::new("capped", "Capped")
                .with_default_size(4, 3)
                .with_max_size(6, 6),
        );
        let raw = json!({
            "data_model_version": DATA_MODEL_VERSION,
            "widgets": [
                { "id": "a", "widget_key": "notes", "configuration": {} },
                { "id": "b", "widget_key": "capped", "configuration": {} }
            ],
            "layout": [
                { "id": "a", "x": 0, "y": 0, "w": 1, "h": 1 },
                { "id": "b", "x": 0, "y": 2, "w": 10, "h": 10 }
            ]
        });
        let (cfg, _) = complete_configuration(&raw, &defaults(), &registry);
        let notes = cfg.layout_for("a").unwrap();
        assert_eq!((notes.w, notes.h), (Some(2), Some(2)));
        // Stored spans above a maximum survive; only the live resize path
        // enforces maxima.
        let capped = cfg.layout_for("b").unwrap();
        assert_eq!((capped.w, capped.h), (Some(10), Some(10)));
        assert_eq!(capped.max_w, Some(6));
    }

    #[test]
    fn positional_layout_without_ids_is_adopted() {
        let registry = test_registry();
        let raw = json!({
            "data_model_version": DATA_MODEL_VERSION,
            "widgets": [
                { "widget_key": "notes", "configuration": {} },
                { "widget_key": "tasks", "configuration": {} }
            ],
            "layout": [
                { "x": 0, "y": 0, "w": 4, "h": 3 },
                { "x": 4, "y": 0, "w": 6, "h": 4 }
            ]
        });
        let (cfg, _) = complete_configuration(&raw, &defaults(), &registry);
        assert_eq!(cfg.widgets.len(), 2);
        assert_eq!(cfg.layout.len(), 2);
        for (w, l) in cfg.widgets.iter().zip(cfg.layout.iter()) {
            assert!(!w.id.is_empty());
            assert_eq!(w.id, l.id);
        }
        assert_eq!(cfg.layout[1].x, 4);
    }

    #[test]
    fn widget_without_layout_entry_is_placed_below() {
        let registry = test_registry();
        let raw = json!({
            "data_model_version": DATA_MODEL_VERSION,
            "widgets": [
                { "id": "a", "widget_key": "notes", "configuration": {} },
                { "id": "b", "widget_key": "tasks", "configuration": {} }
            ],
            "layout": [
                { "id": "a", "x": 0, "y": 0, "w": 4, "h": 3 }
            ]
        });
        let (cfg, _) = complete_configuration(&raw, &defaults(), &registry);
        assert_eq!(cfg.layout.len(), 2);
        let tasks = cfg.layout_for("b").unwrap();
        assert_eq!(tasks.y, 3);
        assert_eq!((tasks.w, tasks.h), (Some(6), Some(4)));
    }

    #[test]
    fn excluded_widgets_are_removed_per_current_policy() {
        let registry = test_registry();
        let defaults = defaults().with_excluded(&["tasks"]);
        let raw = json!({
            "data_model_version": DATA_MODEL_VERSION,
            // A stale persisted policy claims nothing is excluded.
            "exclude_widgets": [],
            "widgets": [
                { "id": "a", "widget_key": "notes", "configuration": {} },
                { "id": "b", "widget_key": "tasks", "configuration": {} }
            ],
            "layout": [
                { "id": "a", "x": 0, "y": 0, "w": 4, "h": 3 },
                { "id": "b", "x": 4, "y": 0, "w": 6, "h": 4 }
            ]
        });
        let (cfg, warnings) = complete_configuration(&raw, &defaults, &registry);
        assert_eq!(cfg.widget_keys(), vec!["notes"]);
        assert_eq!(cfg.layout.len(), 1);
        assert_eq!(cfg.exclude_widgets, vec!["tasks"]);
        assert!(warnings.iter().any(|w| w.contains("excluded")));
    }

    #[test]
    fn completion_is_idempotent() {
        let registry = test_registry();
        let defaults = defaults().with_permanent(&["notes"]);
        let raw = json!({
            "data_model_version": DATA_MODEL_VERSION,
            "widgets": [
                { "id": "a", "widget_key": "retired", "configuration": {} },
                { "id": "b", "widget_key": "tasks", "configuration": {} }
            ],
            "layout": [
                { "id": "a", "x": 0, "y": 0, "w": 2, "h": 2 },
                { "id": "b", "x": 0, "y": 2, "w": 6, "h": 4 }
            ]
        });
        let (once, _) = complete_configuration(&raw, &defaults, &registry);
        let (twice, warnings) =
            complete_configuration(&serde_json::to_value(&once).unwrap(), &defaults, &registry);
        assert_eq!(once, twice);
        assert!(warnings.is_empty());
        assert!(!once.has_widget("retired"));
        assert!(once.has_widget("notes"));
    }
}
