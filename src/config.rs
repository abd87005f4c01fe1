use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Current schema version written by this engine. Configurations persisted
/// with an older (or missing) version are treated as unsalvageable: their
/// widget and layout data is discarded and regenerated from the workspace
/// defaults. A field-level upgrade chain only becomes necessary once a second
/// incompatible version ships.
pub const DATA_MODEL_VERSION: u32 = 2;

fn default_cols() -> u32 {
    12
}

fn default_row_height() -> u32 {
    30
}

/// Deserialize a target list that may have been persisted as a single scalar.
fn scalar_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(target)) => vec![target],
        Some(OneOrMany::Many(targets)) => targets,
    })
}

/// Variant tag distinguishing the surface a configuration drives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigurationKind {
    Default,
    LeftPanel,
    RightPanel,
}

impl Default for ConfigurationKind {
    fn default() -> Self {
        Self::Default
    }
}

/// One widget inside a configuration: a weak reference into the registry plus
/// instance-local settings, independent across instances of the same key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WidgetInstance {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub widget_key: String,
    #[serde(default)]
    pub configuration: Value,
}

impl WidgetInstance {
    pub fn new(widget_key: &str, configuration: Value) -> Self {
        Self {
            id: crate::ids::generate_id(),
            widget_key: widget_key.to_string(),
            configuration,
        }
    }
}

/// Grid placement for one widget instance. `id` is the id of the paired
/// [`WidgetInstance`]; completion keeps the two lists index-aligned as well,
/// but the id is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayoutEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub x: u32,
    #[serde(default)]
    pub y: u32,
    /// Missing width/height is filled from the descriptor during completion.
    #[serde(default)]
    pub w: Option<u32>,
    #[serde(default)]
    pub h: Option<u32>,
    #[serde(default)]
    pub min_w: Option<u32>,
    #[serde(default)]
    pub max_w: Option<u32>,
    #[serde(default)]
    pub min_h: Option<u32>,
    #[serde(default)]
    pub max_h: Option<u32>,
}

impl LayoutEntry {
    pub fn width(&self) -> u32 {
        self.w.unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.h.unwrap_or(0)
    }

    /// Bottom edge of this entry, in grid rows.
    pub fn bottom(&self) -> u32 {
        self.y + self.height()
    }
}

/// One saved arrangement of widgets for a workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceConfiguration {
    #[serde(default)]
    pub id: String,
    /// Workspace this configuration belongs to, e.g. "dashboard".
    #[serde(default)]
    pub name: String,
    /// User-facing name, unique per workspace.
    #[serde(default)]
    pub label: String,
    #[serde(default, rename = "type")]
    pub kind: ConfigurationKind,
    #[serde(default, deserialize_with = "scalar_or_list")]
    pub targets: Vec<String>,
    /// Missing version means the data predates versioning entirely.
    #[serde(default)]
    pub data_model_version: u32,
    #[serde(default = "default_cols")]
    pub cols: u32,
    #[serde(default = "default_row_height")]
    pub row_height: u32,
    #[serde(default)]
    pub widgets: Vec<WidgetInstance>,
    #[serde(default)]
    pub layout: Vec<LayoutEntry>,
    /// Refreshed from the workspace defaults on every completion pass; never
    /// trusted from persisted data.
    #[serde(default)]
    pub exclude_widgets: Vec<String>,
    #[serde(default)]
    pub permanent_widgets: Vec<String>,
    #[serde(default)]
    pub conditional_widgets: Vec<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub is_broken: bool,
}

impl Default for WorkspaceConfiguration {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            label: String::new(),
            kind: ConfigurationKind::Default,
            targets: Vec::new(),
            data_model_version: 0,
            cols: default_cols(),
            row_height: default_row_height(),
            widgets: Vec::new(),
            layout: Vec::new(),
            exclude_widgets: Vec::new(),
            permanent_widgets: Vec::new(),
            conditional_widgets: Vec::new(),
            active: false,
            is_broken: false,
        }
    }
}

impl WorkspaceConfiguration {
    pub fn widget_keys(&self) -> Vec<String> {
        self.widgets.iter().map(|w| w.widget_key.clone()).collect()
    }

    pub fn has_widget(&self, widget_key: &str) -> bool {
        self.widgets.iter().any(|w| w.widget_key == widget_key)
    }

    pub fn layout_for(&self, instance_id: &str) -> Option<&LayoutEntry> {
        self.layout.iter().find(|l| l.id == instance_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: WorkspaceConfiguration = serde_json::from_value(json!({})).unwrap();
        assert_eq!(cfg.cols, 12);
        assert_eq!(cfg.row_height, 30);
        assert_eq!(cfg.data_model_version, 0);
        assert!(cfg.widgets.is_empty());
        assert!(!cfg.active);
    }

    #[test]
    fn scalar_target_normalizes_to_list() {
        let cfg: WorkspaceConfiguration =
            serde_json::from_value(json!({ "targets": "challenge" })).unwrap();
        assert_eq!(cfg.targets, vec!["challenge".to_string()]);

        let cfg: WorkspaceConfiguration =
            serde_json::from_value(json!({ "targets": ["user", "challenge"] })).unwrap();
        assert_eq!(cfg.targets.len(), 2);

        let cfg: WorkspaceConfiguration = serde_json::from_value(json!({ "targets": null })).unwrap();
        assert!(cfg.targets.is_empty());
    }

    #[test]
    fn kind_round_trips_as_kebab_case() {
        let v = serde_json::to_value(ConfigurationKind::LeftPanel).unwrap();
        assert_eq!(v, json!("left-panel"));
        let k: ConfigurationKind = serde_json::from_value(json!("right-panel")).unwrap();
        assert_eq!(k, ConfigurationKind::RightPanel);
    }

    #[test]
    fn layout_entry_bottom_accounts_for_height() {
        let entry = LayoutEntry {
            id: "a".into(),
            x: 0,
            y: 3,
            w: Some(4),
            h: Some(2),
            min_w: None,
            max_w: None,
            min_h: None,
            max_h: None,
        };
        assert_eq!(entry.bottom(), 5);
    }
}
