use crate::config::WorkspaceConfiguration;
use crate::ids::generate_id;
use crate::lifecycle::{complete_configuration, WorkspaceDefaults};
use crate::registry::WidgetRegistry;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Format tag written into every export file.
pub const EXPORT_FORMAT: &str = "workdeck/configuration";

/// Portable envelope around a single exported configuration. The payload is
/// kept as raw JSON and re-run through completion on import, so an export
/// from an older build is handled exactly like old persisted data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportFile {
    pub format: String,
    /// Workspace the configuration belongs to; imports into a different
    /// workspace are rejected.
    pub workspace: String,
    pub exported_at: i64,
    pub configuration: Value,
}

/// Serialize a configuration to the portable export format.
pub fn export_configuration(configuration: &WorkspaceConfiguration) -> anyhow::Result<String> {
    let file = ExportFile {
        format: EXPORT_FORMAT.to_string(),
        workspace: configuration.name.clone(),
        exported_at: chrono::Utc::now().timestamp(),
        configuration: serde_json::to_value(configuration)?,
    };
    Ok(serde_json::to_string_pretty(&file)?)
}

/// Write an export file to disk.
pub fn write_export(path: impl AsRef<Path>, configuration: &WorkspaceConfiguration) -> anyhow::Result<()> {
    let json = export_configuration(configuration)?;
    std::fs::write(path.as_ref(), json)
        .with_context(|| format!("writing export file {}", path.as_ref().display()))?;
    Ok(())
}

/// Parse an export file and prepare its configuration for saving into the
/// given workspace: validate the embedded workspace name, run the payload
/// through completion, assign a fresh id and a label disambiguated against
/// the labels already present. Nothing is persisted here; any failure leaves
/// the store untouched.
pub fn import_configuration(
    workspace: &str,
    content: &str,
    existing_labels: &[String],
    defaults: &WorkspaceDefaults,
    registry: &WidgetRegistry,
) -> anyhow::Result<(WorkspaceConfiguration, Vec<String>)> {
    let file: ExportFile =
        serde_json::from_str(content).context("import file is not a valid configuration export")?;
    if file.workspace != workspace {
        bail!(
            "import file belongs to workspace '{}', not '{workspace}'",
            file.workspace
        );
    }
    let (mut configuration, warnings) =
        complete_configuration(&file.configuration, defaults, registry);
    configuration.id = generate_id();
    configuration.name = workspace.to_string();
    configuration.label = disambiguate_label(&configuration.label, existing_labels);
    configuration.active = false;
    configuration.is_broken = false;
    Ok((configuration, warnings))
}

/// Append a numeric suffix to `label` until it collides with none of
/// `existing`.
pub fn disambiguate_label(label: &str, existing: &[String]) -> String {
    if !existing.iter().any(|l| l == label) {
        return label.to_string();
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{label} ({suffix})");
        if !existing.iter().any(|l| *l == candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_get_numeric_suffixes() {
        let existing = vec!["Board".to_string(), "Board (2)".to_string()];
        assert_eq!(disambiguate_label("Fresh", &existing), "Fresh");
        assert_eq!(disambiguate_label("Board", &existing), "Board (3)");
    }

    #[test]
    fn export_envelope_carries_workspace_name() {
        let mut cfg = WorkspaceConfiguration::default();
        cfg.id = "abc".into();
        cfg.name = "dashboard".into();
        cfg.label = "Mine".into();
        let json = export_configuration(&cfg).unwrap();
        let file: ExportFile = serde_json::from_str(&json).unwrap();
        assert_eq!(file.format, EXPORT_FORMAT);
        assert_eq!(file.workspace, "dashboard");
        assert_eq!(file.configuration["label"], "Mine");
    }
}
