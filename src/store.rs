use crate::config::{LayoutEntry, WidgetInstance, WorkspaceConfiguration};
use crate::ids::generate_id;
use crate::layout::repair_layout;
use crate::lifecycle::{complete_configuration, WorkspaceDefaults};
use crate::registry::WidgetRegistry;
use anyhow::{anyhow, bail, Context};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::RwLock;

/// Per-user mapping from workspace name to saved configurations keyed by id.
pub type WorkspaceMap = BTreeMap<String, BTreeMap<String, WorkspaceConfiguration>>;

const WORKSPACES_KEY: &str = "workspaces";
/// Pre-rename persisted key; still read when `workspaces` is absent and
/// cleared on the next save.
const LEGACY_WORKSPACES_KEY: &str = "dashboards";

/// Abstract get/set contract of the host application's user-settings store.
/// The engine owns only the `workspaces` key inside the settings value;
/// sibling keys are preserved untouched on every write.
pub trait SettingsStore: Send + Sync {
    fn get(&self, user: &str) -> anyhow::Result<Option<Value>>;
    fn set(&self, user: &str, settings: Value) -> anyhow::Result<()>;
}

impl<S: SettingsStore + ?Sized> SettingsStore for std::sync::Arc<S> {
    fn get(&self, user: &str) -> anyhow::Result<Option<Value>> {
        (**self).get(user)
    }

    fn set(&self, user: &str, settings: Value) -> anyhow::Result<()> {
        (**self).set(user, settings)
    }
}

/// In-memory settings store for tests and embedding hosts.
#[derive(Default)]
pub struct MemorySettingsStore {
    inner: RwLock<HashMap<String, Value>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, user: &str) -> anyhow::Result<Option<Value>> {
        let map = self
            .inner
            .read()
            .map_err(|_| anyhow!("settings store lock poisoned"))?;
        Ok(map.get(user).cloned())
    }

    fn set(&self, user: &str, settings: Value) -> anyhow::Result<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| anyhow!("settings store lock poisoned"))?;
        map.insert(user.to_string(), settings);
        Ok(())
    }
}

/// File-backed settings store: one pretty-printed JSON document per user.
pub struct JsonFileSettingsStore {
    dir: PathBuf,
}

impl JsonFileSettingsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, user: &str) -> PathBuf {
        self.dir.join(format!("{user}.json"))
    }
}

impl SettingsStore for JsonFileSettingsStore {
    fn get(&self, user: &str) -> anyhow::Result<Option<Value>> {
        let content = std::fs::read_to_string(self.path_for(user)).unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(None);
        }
        let value = serde_json::from_str(&content)
            .with_context(|| format!("settings file for user '{user}' is not valid JSON"))?;
        Ok(Some(value))
    }

    fn set(&self, user: &str, settings: Value) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating settings directory {}", self.dir.display()))?;
        let json = serde_json::to_string_pretty(&settings)?;
        let path = self.path_for(user);
        std::fs::write(&path, json)
            .with_context(|| format!("writing settings file {}", path.display()))?;
        Ok(())
    }
}

fn parse_collection(raw: &Value) -> WorkspaceMap {
    let mut map = WorkspaceMap::new();
    let Some(workspaces) = raw.as_object() else {
        return map;
    };
    for (name, configs) in workspaces {
        let Some(configs) = configs.as_object() else {
            continue;
        };
        let entry: &mut BTreeMap<String, WorkspaceConfiguration> =
            map.entry(name.clone()).or_default();
        for (id, cfg) in configs {
            match serde_json::from_value(cfg.clone()) {
                Ok(cfg) => {
                    entry.insert(id.clone(), cfg);
                }
                Err(e) => {
                    tracing::warn!(
                        workspace = %name,
                        configuration = %id,
                        error = %e,
                        "unreadable saved configuration skipped"
                    );
                }
            }
        }
    }
    map
}

/// The persistence boundary: reads and writes the per-user collection of
/// named workspaces through the abstract settings store. Every mutation is a
/// read-merge-write against the latest stored value, so a racing autosave and
/// switch cannot lose each other's updates.
pub struct WorkspaceStore<S: SettingsStore> {
    settings: S,
    registry: WidgetRegistry,
}

impl<S: SettingsStore> WorkspaceStore<S> {
    pub fn new(settings: S, registry: WidgetRegistry) -> Self {
        Self { settings, registry }
    }

    pub fn registry(&self) -> &WidgetRegistry {
        &self.registry
    }

    fn load(&self, user: &str) -> anyhow::Result<(Value, WorkspaceMap)> {
        let settings = self.settings.get(user)?.unwrap_or_else(|| json!({}));
        let raw = settings
            .get(WORKSPACES_KEY)
            .or_else(|| settings.get(LEGACY_WORKSPACES_KEY))
            .cloned()
            .unwrap_or_else(|| json!({}));
        let map = parse_collection(&raw);
        Ok((settings, map))
    }

    fn persist(&self, user: &str, settings: Value, map: &WorkspaceMap) -> anyhow::Result<()> {
        let mut obj = match settings {
            Value::Object(obj) => obj,
            _ => Map::new(),
        };
        obj.remove(LEGACY_WORKSPACES_KEY);
        obj.insert(WORKSPACES_KEY.to_string(), serde_json::to_value(map)?);
        self.settings.set(user, Value::Object(obj))
    }

    /// Raw read of all saved configurations for one workspace, without
    /// completion.
    pub fn configurations_for(
        &self,
        user: &str,
        workspace: &str,
    ) -> anyhow::Result<BTreeMap<String, WorkspaceConfiguration>> {
        let (_, map) = self.load(user)?;
        Ok(map.get(workspace).cloned().unwrap_or_default())
    }

    /// Resolve the configuration a surface should render: the explicitly
    /// selected id if it exists, else the active non-broken configuration,
    /// else the first non-broken one, else a freshly synthesized (and saved)
    /// default. The result is always passed through completion.
    pub fn current_configuration(
        &self,
        user: &str,
        defaults: &WorkspaceDefaults,
        selected: Option<&str>,
    ) -> anyhow::Result<(WorkspaceConfiguration, Vec<String>)> {
        let (settings, mut map) = self.load(user)?;
        let configs = map.get(&defaults.name).cloned().unwrap_or_default();
        let chosen = selected
            .and_then(|id| configs.get(id))
            .or_else(|| configs.values().find(|c| c.active && !c.is_broken))
            .or_else(|| configs.values().find(|c| !c.is_broken));
        match chosen {
            Some(cfg) => {
                let raw = serde_json::to_value(cfg)?;
                Ok(complete_configuration(&raw, defaults, &self.registry))
            }
            None => {
                let mut cfg = defaults.build(&self.registry);
                cfg.active = true;
                map.entry(defaults.name.clone())
                    .or_default()
                    .insert(cfg.id.clone(), cfg.clone());
                self.persist(user, settings, &map)?;
                Ok((cfg, Vec::new()))
            }
        }
    }

    /// Merge one configuration into the collection, assigning an id when
    /// absent, and persist.
    pub fn save(
        &self,
        user: &str,
        mut configuration: WorkspaceConfiguration,
    ) -> anyhow::Result<WorkspaceConfiguration> {
        if configuration.name.is_empty() {
            bail!("configuration has no workspace name");
        }
        if configuration.id.is_empty() {
            configuration.id = generate_id();
        }
        let (settings, mut map) = self.load(user)?;
        map.entry(configuration.name.clone())
            .or_default()
            .insert(configuration.id.clone(), configuration.clone());
        self.persist(user, settings, &map)?;
        Ok(configuration)
    }

    /// Activate one configuration and deactivate the previous one in a single
    /// persisted write, so a reader can never observe zero or two active
    /// configurations for a workspace.
    pub fn switch(
        &self,
        user: &str,
        workspace: &str,
        id: &str,
        previous_active: Option<&str>,
    ) -> anyhow::Result<()> {
        let (settings, mut map) = self.load(user)?;
        let configs = map
            .get_mut(workspace)
            .with_context(|| format!("no saved configurations for workspace '{workspace}'"))?;
        if !configs.contains_key(id) {
            bail!("no configuration '{id}' in workspace '{workspace}'");
        }
        if let Some(previous) = previous_active {
            if previous != id && !configs.contains_key(previous) {
                tracing::warn!(
                    workspace = %workspace,
                    configuration = %previous,
                    "previously active configuration no longer exists"
                );
            }
        }
        for (config_id, cfg) in configs.iter_mut() {
            cfg.active = config_id == id;
        }
        self.persist(user, settings, &map)
    }

    /// Remove one configuration. Deleting the last one leaves an empty
    /// workspace mapping; the next read synthesizes a fresh default.
    pub fn delete(&self, user: &str, workspace: &str, id: &str) -> anyhow::Result<()> {
        let (settings, mut map) = self.load(user)?;
        let Some(configs) = map.get_mut(workspace) else {
            return Ok(());
        };
        if configs.remove(id).is_none() {
            return Ok(());
        }
        self.persist(user, settings, &map)
    }

    pub fn rename(
        &self,
        user: &str,
        workspace: &str,
        id: &str,
        label: &str,
    ) -> anyhow::Result<WorkspaceConfiguration> {
        self.update(user, workspace, id, |cfg| {
            cfg.label = label.to_string();
        })
    }

    /// Restore a configuration to the workspace defaults, keeping its id,
    /// label and active flag.
    pub fn reset(
        &self,
        user: &str,
        defaults: &WorkspaceDefaults,
        id: &str,
    ) -> anyhow::Result<WorkspaceConfiguration> {
        let (settings, mut map) = self.load(user)?;
        let configs = map
            .get_mut(&defaults.name)
            .with_context(|| format!("no saved configurations for workspace '{}'", defaults.name))?;
        let existing = configs
            .get(id)
            .with_context(|| format!("no configuration '{id}' in workspace '{}'", defaults.name))?;
        let mut fresh = defaults.build(&self.registry);
        fresh.id = existing.id.clone();
        fresh.label = existing.label.clone();
        fresh.active = existing.active;
        configs.insert(id.to_string(), fresh.clone());
        self.persist(user, settings, &map)?;
        Ok(fresh)
    }

    /// Record that a configuration failed to render. It loses its active flag
    /// so subsequent reads fall back to another configuration instead of
    /// repeatedly selecting the broken one.
    pub fn mark_broken(
        &self,
        user: &str,
        workspace: &str,
        id: &str,
    ) -> anyhow::Result<WorkspaceConfiguration> {
        self.update(user, workspace, id, |cfg| {
            cfg.is_broken = true;
            cfg.active = false;
        })
    }

    /// Add a widget instance with its default settings to a saved
    /// configuration; completion appends the layout entry.
    pub fn add_widget(
        &self,
        user: &str,
        defaults: &WorkspaceDefaults,
        id: &str,
        widget_key: &str,
    ) -> anyhow::Result<WorkspaceConfiguration> {
        let descriptor = self
            .registry
            .descriptor(widget_key)
            .with_context(|| format!("widget '{widget_key}' is not registered"))?;
        if descriptor.decommissioned {
            bail!("widget '{widget_key}' has been decommissioned");
        }
        if defaults.exclude_widgets.contains(&widget_key.to_string()) {
            bail!("widget '{widget_key}' is excluded from workspace '{}'", defaults.name);
        }
        let instance = WidgetInstance::new(widget_key, descriptor.default_configuration.clone());
        self.complete_and_save(user, defaults, id, |cfg| {
            cfg.widgets.push(instance);
            Ok(())
        })
    }

    /// Remove a widget instance and its layout entry. Permanent widgets
    /// cannot be removed (completion would reinstate them anyway).
    pub fn remove_widget(
        &self,
        user: &str,
        defaults: &WorkspaceDefaults,
        id: &str,
        instance_id: &str,
    ) -> anyhow::Result<WorkspaceConfiguration> {
        let permanent = defaults.permanent_keys(&self.registry);
        self.complete_and_save(user, defaults, id, |cfg| {
            if let Some(instance) = cfg.widgets.iter().find(|w| w.id == instance_id) {
                if permanent.contains(&instance.widget_key) {
                    bail!("widget '{}' is permanent and cannot be removed", instance.widget_key);
                }
            }
            cfg.widgets.retain(|w| w.id != instance_id);
            cfg.layout.retain(|e| e.id != instance_id);
            Ok(())
        })
    }

    /// Persist a layout produced by the drag/resize surface. This is the live
    /// path, so spans are clamped into the descriptor bounds in both
    /// directions before saving.
    pub fn apply_layout(
        &self,
        user: &str,
        defaults: &WorkspaceDefaults,
        id: &str,
        layout: Vec<LayoutEntry>,
    ) -> anyhow::Result<WorkspaceConfiguration> {
        let registry = self.registry.clone();
        self.complete_and_save(user, defaults, id, move |cfg| {
            cfg.layout = repair_layout(&cfg.widgets, &layout, &registry);
            Ok(())
        })
    }

    /// Import a configuration exported from another account or instance, save
    /// it, and make it the active configuration. Save and switch run
    /// sequentially against the same store, so the switch always sees the
    /// saved configuration.
    pub fn import(
        &self,
        user: &str,
        defaults: &WorkspaceDefaults,
        content: &str,
    ) -> anyhow::Result<WorkspaceConfiguration> {
        let existing = self.configurations_for(user, &defaults.name)?;
        let labels: Vec<String> = existing.values().map(|c| c.label.clone()).collect();
        let previous_active = existing
            .values()
            .find(|c| c.active)
            .map(|c| c.id.clone());
        let (imported, _warnings) =
            crate::codec::import_configuration(&defaults.name, content, &labels, defaults, &self.registry)?;
        let saved = self.save(user, imported)?;
        self.switch(user, &defaults.name, &saved.id, previous_active.as_deref())?;
        Ok(saved)
    }

    fn update(
        &self,
        user: &str,
        workspace: &str,
        id: &str,
        mutate: impl FnOnce(&mut WorkspaceConfiguration),
    ) -> anyhow::Result<WorkspaceConfiguration> {
        let (settings, mut map) = self.load(user)?;
        let configs = map
            .get_mut(workspace)
            .with_context(|| format!("no saved configurations for workspace '{workspace}'"))?;
        let cfg = configs
            .get_mut(id)
            .with_context(|| format!("no configuration '{id}' in workspace '{workspace}'"))?;
        mutate(cfg);
        let updated = cfg.clone();
        self.persist(user, settings, &map)?;
        Ok(updated)
    }

    fn complete_and_save(
        &self,
        user: &str,
        defaults: &WorkspaceDefaults,
        id: &str,
        mutate: impl FnOnce(&mut WorkspaceConfiguration) -> anyhow::Result<()>,
    ) -> anyhow::Result<WorkspaceConfiguration> {
        let (settings, mut map) = self.load(user)?;
        let configs = map
            .get_mut(&defaults.name)
            .with_context(|| format!("no saved configurations for workspace '{}'", defaults.name))?;
        let cfg = configs
            .get_mut(id)
            .with_context(|| format!("no configuration '{id}' in workspace '{}'", defaults.name))?;
        mutate(cfg)?;
        let raw = serde_json::to_value(&*cfg)?;
        let (completed, _warnings) = complete_configuration(&raw, defaults, &self.registry);
        configs.insert(id.to_string(), completed.clone());
        self.persist(user, settings, &map)?;
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips() {
        let store = MemorySettingsStore::new();
        assert!(store.get("alice").unwrap().is_none());
        store.set("alice", json!({ "workspaces": {} })).unwrap();
        assert_eq!(store.get("alice").unwrap().unwrap(), json!({ "workspaces": {} }));
    }

    #[test]
    fn parse_collection_skips_unreadable_entries() {
        let raw = json!({
            "dashboard": {
                "good": { "id": "good", "name": "dashboard", "label": "A" },
                "bad": [1, 2, 3]
            },
            "broken": 7
        });
        let map = parse_collection(&raw);
        assert_eq!(map.len(), 1);
        assert_eq!(map["dashboard"].len(), 1);
        assert!(map["dashboard"].contains_key("good"));
    }
}
