use workdeck::codec::{export_configuration, import_configuration, write_export, ExportFile};
use workdeck::lifecycle::WorkspaceDefaults;
use workdeck::registry::{ComponentFactory, WidgetDescriptor, WidgetRegistry};
use workdeck::store::{MemorySettingsStore, WorkspaceStore};

#[derive(Default)]
struct DummyComponent;

#[derive(Default, serde::Deserialize)]
struct DummyConfig;

impl workdeck::registry::WidgetComponent for DummyComponent {}

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
    reg
}

fn defaults() -> WorkspaceDefaults {
    WorkspaceDefaults::new("dashboard", "Dashboard").with_widgets(&["notes", "tasks"])
}

#[test]
fn export_then_import_preserves_widgets_and_positions() {
    let registry = test_registry();
    let cfg = defaults().build(&registry);
    let exported = export_configuration(&cfg).unwrap();

    let (imported, warnings) =
        import_configuration("dashboard", &exported, &[], &defaults(), &registry).unwrap();
    assert!(warnings.is_empty());
    assert_eq!(imported.widget_keys(), cfg.widget_keys());
    assert_eq!(imported.label, cfg.label);
    assert_ne!(imported.id, cfg.id);
    for (original, roundtripped) in cfg.layout.iter().zip(imported.layout.iter()) {
        assert_eq!((original.x, original.y), (roundtripped.x, roundtripped.y));
        assert_eq!((original.w, original.h), (roundtripped.w, roundtripped.h));
    }
}

#[test]
fn import_rejects_wrong_workspace() {
    let registry = test_registry();
    let mut cfg = defaults().build(&registry);
    cfg.name = "globalActivity".into();
    let exported = export_configuration(&cfg).unwrap();

    let err = import_configuration("dashboard", &exported, &[], &defaults(), &registry)
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("globalActivity"));
    assert!(msg.contains("dashboard"));
}

#[test]
fn import_rejects_malformed_files() {
    let registry = test_registry();
    assert!(import_configuration("dashboard", "{ not json", &[], &defaults(), &registry).is_err());
    assert!(import_configuration("dashboard", "[1, 2]", &[], &defaults(), &registry).is_err());
}

#[test]
fn imported_labels_are_disambiguated() {
    let registry = test_registry();
    let cfg = defaults().build(&registry);
    let exported = export_configuration(&cfg).unwrap();

    let existing = vec!["Dashboard".to_string(), "Dashboard (2)".to_string()];
    let (imported, _) =
        import_configuration("dashboard", &exported, &existing, &defaults(), &registry).unwrap();
    assert_eq!(imported.label, "Dashboard (3)");
}

#[test]
fn store_import_saves_and_activates() {
    let store = WorkspaceStore::new(MemorySettingsStore::new(), test_registry());
    let (original, _) = store.current_configuration("alice", &defaults(), None).unwrap();
    let exported = export_configuration(&original).unwrap();

    let imported = store.import("alice", &defaults(), &exported).unwrap();
    assert_eq!(imported.label, "Dashboard (2)");

    let configs = store.configurations_for("alice", "dashboard").unwrap();
    assert_eq!(configs.len(), 2);
    let active: Vec<_> = configs.values().filter(|c| c.active).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, imported.id);
    assert_ne!(imported.id, original.id);
}

#[test]
fn failed_import_saves_nothing() {
    let store = WorkspaceStore::new(MemorySettingsStore::new(), test_registry());
    let (original, _) = store.current_configuration("alice", &defaults(), None).unwrap();

    assert!(store.import("alice", &defaults(), "garbage").is_err());

    let configs = store.configurations_for("alice", "dashboard").unwrap();
    assert_eq!(configs.len(), 1);
    assert!(configs.contains_key(&original.id));
}

#[test]
fn export_files_round_trip_through_disk() {
    let registry = test_registry();
    let cfg = defaults().build(&registry);
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("dashboard.json");

    write_export(&path, &cfg).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    let file: ExportFile = serde_json::from_str(&content).unwrap();
    assert_eq!(file.workspace, "dashboard");

    let (imported, _) =
        import_configuration("dashboard", &content, &[], &defaults(), &registry).unwrap();
    assert_eq!(imported.widget_keys(), cfg.widget_keys());
}
