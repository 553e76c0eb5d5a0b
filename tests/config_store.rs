use orthanc_cli::context::{
    ConfigKey, ConfigStore, ContextError, ContextUpdate, EnvOverrides, write_starter,
};
use pretty_assertions::assert_eq;
use std::fs;

const LEGACY: &str = "orthanc:\n  url: http://pacs:8042\n  username: admin\n  password: s3cret\noutput:\n  json: true\n";

#[test]
fn legacy_file_is_rewritten_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orthanc.yaml");
    fs::write(&path, LEGACY).unwrap();

    let mut store = ConfigStore::load(Some(&path)).unwrap();
    assert!(store.needs_migration_write());
    assert_eq!(fs::read_to_string(&path).unwrap(), LEGACY);

    assert!(store.persist_migration().unwrap());
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("contexts:"));
    assert!(written.contains("current-context: default"));
    assert!(!written.starts_with("orthanc:"));

    let mut reloaded = ConfigStore::load(Some(&path)).unwrap();
    assert!(!reloaded.needs_migration_write());
    assert!(!reloaded.persist_migration().unwrap());
    assert_eq!(fs::read_to_string(&path).unwrap(), written);

    let ctx = reloaded.stored_current().unwrap();
    assert_eq!(ctx.name, "default");
    assert_eq!(ctx.settings.url, "http://pacs:8042");
    assert_eq!(ctx.settings.password, "s3cret");
    assert!(reloaded.output_json());
}

#[test]
fn starter_config_loads_with_local_context() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/config.yaml");
    write_starter(&path).unwrap();

    let store = ConfigStore::load(Some(&path)).unwrap();
    let ctx = store.stored_current().unwrap();
    assert_eq!(ctx.name, "local");
    assert_eq!(ctx.settings.url, "http://localhost:8042");
    assert!(ctx.settings.has_credentials());
}

#[test]
fn edits_survive_a_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");

    let mut store = ConfigStore::load(Some(&path)).unwrap();
    store
        .set_context(
            "prod",
            ContextUpdate {
                url: Some("https://orthanc.example.org".into()),
                insecure: Some(true),
                ..Default::default()
            },
            false,
        )
        .unwrap();
    store
        .set_context(
            "dev",
            ContextUpdate {
                url: Some("http://localhost:8042".into()),
                ..Default::default()
            },
            true,
        )
        .unwrap();
    store.rename_context("prod", "production").unwrap();
    store.set_value(ConfigKey::OutputJson, "yes").unwrap();
    store.save().unwrap();

    let reloaded = ConfigStore::load(Some(&path)).unwrap();
    let names: Vec<_> = reloaded
        .list()
        .into_iter()
        .map(|(ctx, current)| (ctx.name, current))
        .collect();
    assert_eq!(
        names,
        vec![("dev".to_string(), true), ("production".to_string(), false)]
    );
    assert!(reloaded.get("production").unwrap().settings.insecure);
    assert_eq!(reloaded.get_value(ConfigKey::OutputJson).unwrap().as_deref(), Some("true"));
}

#[test]
fn environment_overrides_do_not_touch_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    write_starter(&path).unwrap();
    let before = fs::read_to_string(&path).unwrap();

    let store = ConfigStore::load(Some(&path)).unwrap();
    let env = EnvOverrides::from_lookup(|key: &str| match key {
        "ORTHANC_URL" => Some("http://override:8042".to_string()),
        "ORTHANC_INSECURE" => Some("1".to_string()),
        _ => None,
    });
    let ctx = store.current_context_with(&env).unwrap();

    assert_eq!(ctx.settings.url, "http://override:8042");
    assert!(ctx.settings.insecure);
    assert_eq!(ctx.settings.username, "orthanc");
    assert_eq!(fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn malformed_file_reports_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    fs::write(&path, "contexts: [unterminated").unwrap();

    let err = ConfigStore::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ContextError::Parse { .. }));
    assert!(err.to_string().contains("broken.yaml"));
}
