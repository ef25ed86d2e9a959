use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regolith_monitor_config::{
    parse_document, ConfigFlags, ConfigKey, ConfigStore, Configuration, LayoutMode,
    LayoutValidator, LogicalMonitorConfig, ModeSpec, MonitorConfig, MonitorSpec, StorePaths,
    StoreTier,
};
use tempfile::TempDir;

fn monitor_spec(serial: &str) -> MonitorSpec {
    MonitorSpec::new("DP-1", "MetaProduct Inc.", "MetaMonitor", serial)
}

fn configuration_xml(serial: &str, scale: u32) -> String {
    format!(
        r#"  <configuration>
    <layoutmode>logical</layoutmode>
    <logicalmonitor>
      <x>0</x>
      <y>0</y>
      <scale>{scale}</scale>
      <primary>yes</primary>
      <monitor>
        <monitorspec>
          <connector>DP-1</connector>
          <vendor>MetaProduct Inc.</vendor>
          <product>MetaMonitor</product>
          <serial>{serial}</serial>
        </monitorspec>
        <mode>
          <width>1920</width>
          <height>1080</height>
          <rate>60.000</rate>
        </mode>
      </monitor>
    </logicalmonitor>
  </configuration>
"#
    )
}

fn document(body: &[String]) -> String {
    format!("<monitors version=\"2\">\n{}</monitors>\n", body.concat())
}

fn policy_xml(stores: &[&str], dbus: Option<&str>) -> String {
    let mut policy = String::from("  <policy>\n");
    if !stores.is_empty() {
        policy.push_str("    <stores>\n");
        for store in stores {
            policy.push_str(&format!("      <store>{store}</store>\n"));
        }
        policy.push_str("    </stores>\n");
    }
    if let Some(dbus) = dbus {
        policy.push_str(&format!("    <dbus>{dbus}</dbus>\n"));
    }
    policy.push_str("  </policy>\n");
    policy
}

fn key(serial: &str) -> ConfigKey {
    ConfigKey::new([monitor_spec(serial)], LayoutMode::Logical)
}

fn logical_config(serial: &str) -> Configuration {
    let mut logical_monitor = LogicalMonitorConfig::new(
        0,
        0,
        1.0,
        vec![MonitorConfig::new(monitor_spec(serial), ModeSpec::new(1920, 1080, 60.0))],
    );
    logical_monitor.layout.width = 1920;
    logical_monitor.layout.height = 1080;
    logical_monitor.is_primary = true;
    Configuration::new(
        vec![logical_monitor],
        vec![],
        vec![],
        LayoutMode::Logical,
        ConfigFlags::empty(),
    )
}

struct Environment {
    dir: TempDir,
}

impl Environment {
    fn new() -> Environment {
        let _ = pretty_env_logger::try_init();
        Environment {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn system_dir(&self, index: usize) -> PathBuf {
        self.dir.path().join(format!("system{index}"))
    }

    fn user_file(&self) -> PathBuf {
        self.dir.path().join("config").join("monitors.xml")
    }

    fn write_system(&self, index: usize, contents: &str) {
        let dir = self.system_dir(index);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("monitors.xml"), contents).unwrap();
    }

    fn write_user(&self, contents: &str) {
        write_file(&self.user_file(), contents);
    }

    fn store(&self) -> ConfigStore {
        ConfigStore::new(
            StorePaths {
                system_dirs: vec![self.system_dir(0), self.system_dir(1)],
                user_file: self.user_file(),
            },
            LayoutValidator,
        )
    }
}

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

#[test]
fn system_and_user_documents_are_merged() {
    let env = Environment::new();
    env.write_system(0, &document(&[configuration_xml("system", 1)]));
    env.write_user(&document(&[configuration_xml("user", 1)]));

    let store = env.store();
    assert_eq!(store.config_count(), 2);

    let system = store.lookup(&key("system")).unwrap();
    assert!(system.is_system_config());
    let user = store.lookup(&key("user")).unwrap();
    assert!(!user.is_system_config());

    // Only user configurations are written back.
    let generated = parse_document(&store.generate_document(), ConfigFlags::empty(), &LayoutValidator)
        .unwrap();
    assert_eq!(generated.configs.len(), 1);
    assert!(generated.configs.contains_key(&key("user")));
}

#[test]
fn user_document_overrides_system_by_default() {
    let env = Environment::new();
    env.write_system(0, &document(&[configuration_xml("shared", 2)]));
    env.write_user(&document(&[configuration_xml("shared", 1)]));

    let store = env.store();
    let config = store.lookup(&key("shared")).unwrap();
    assert_eq!(config.logical_monitor_configs()[0].scale, 1.0);
    assert!(!config.is_system_config());
}

#[test]
fn stores_policy_order_decides_who_wins() {
    let env = Environment::new();
    env.write_system(
        0,
        &document(&[policy_xml(&["user", "system"], None), configuration_xml("shared", 2)]),
    );
    env.write_user(&document(&[configuration_xml("shared", 1)]));

    let store = env.store();
    assert_eq!(store.stores_policy(), Some(&[StoreTier::User, StoreTier::System][..]));
    let config = store.lookup(&key("shared")).unwrap();
    assert_eq!(config.logical_monitor_configs()[0].scale, 2.0);
    assert!(config.is_system_config());
}

#[test]
fn system_only_policy_ignores_user_tier() {
    let env = Environment::new();
    env.write_system(
        0,
        &document(&[policy_xml(&["system"], None), configuration_xml("system", 1)]),
    );
    let user_document = document(&[configuration_xml("user", 1)]);
    env.write_user(&user_document);

    let mut store = env.store();
    assert_eq!(store.config_count(), 1);
    assert!(store.lookup(&key("user")).is_none());

    // Adding a configuration doesn't touch the user document either.
    store.add(Arc::new(logical_config("added")));
    assert_eq!(store.config_count(), 2);
    drop(store);
    assert_eq!(fs::read_to_string(env.user_file()).unwrap(), user_document);
}

#[test]
fn first_policy_wins() {
    let env = Environment::new();
    env.write_system(0, &document(&[policy_xml(&["system"], Some("no"))]));
    env.write_system(1, &document(&[policy_xml(&["system", "user"], Some("yes"))]));

    let store = env.store();
    assert_eq!(store.stores_policy(), Some(&[StoreTier::System][..]));
    assert!(!store.policy().enable_dbus);
}

#[test]
fn dbus_policy_without_stores_policy() {
    let env = Environment::new();
    env.write_system(0, &document(&[policy_xml(&[], Some("no"))]));

    let store = env.store();
    assert_eq!(store.stores_policy(), None);
    assert!(!store.policy().enable_dbus);
}

#[test]
fn policy_in_user_document_rejects_the_document() {
    let env = Environment::new();
    let user_document = document(&[policy_xml(&["user"], None), configuration_xml("user", 1)]);
    env.write_user(&user_document);

    let store = env.store();
    assert_eq!(store.config_count(), 0);
    assert_eq!(store.stores_policy(), None);
    drop(store);
    assert_eq!(fs::read_to_string(env.user_file()).unwrap(), user_document);
}

#[test]
fn malformed_system_document_is_skipped() {
    let env = Environment::new();
    env.write_system(0, "<monitors version=\"2\"><configuration>");
    env.write_system(1, &document(&[configuration_xml("system", 1)]));

    let store = env.store();
    assert_eq!(store.config_count(), 1);
    assert!(store.lookup(&key("system")).is_some());
}

#[test]
fn malformed_user_document_is_left_alone() {
    let env = Environment::new();
    env.write_system(0, &document(&[configuration_xml("system", 1)]));
    env.write_user("this is not a monitors document");

    let mut store = env.store();
    assert_eq!(store.config_count(), 1);

    store.reset();
    assert_eq!(store.config_count(), 1);
    drop(store);
    assert_eq!(
        fs::read_to_string(env.user_file()).unwrap(),
        "this is not a monitors document"
    );
}

#[test]
fn unknown_elements_are_tolerated() {
    let env = Environment::new();
    let plain = document(&[configuration_xml("user", 1)]);
    let extended = plain
        .replace(
            "<monitors version=\"2\">\n",
            "<monitors version=\"2\">\n  <future>\n    <setting>1</setting>\n  </future>\n",
        )
        .replace(
            "<layoutmode>logical</layoutmode>",
            "<layoutmode>logical</layoutmode>\n    <hint>fast</hint>",
        )
        .replace("<x>0</x>", "<x>0</x>\n      <color>blue</color>");

    let custom = env.dir.path().join("extended.xml");
    write_file(&custom, &extended);
    let mut store = env.store();
    store.set_custom(&custom, None, ConfigFlags::empty()).unwrap();

    let plain = parse_document(&plain, ConfigFlags::empty(), &LayoutValidator).unwrap();
    let loaded: Vec<&Configuration> = store.configs().map(Arc::as_ref).collect();
    let expected: Vec<&Configuration> = plain.configs.values().collect();
    assert_eq!(loaded, expected);
}

#[test]
fn custom_write_path_is_written_synchronously() {
    let env = Environment::new();
    let custom = env.dir.path().join("custom.xml");
    let written = env.dir.path().join("written.xml");
    write_file(&custom, &document(&[configuration_xml("user", 1)]));

    let mut store = env.store();
    store
        .set_custom(&custom, Some(&written), ConfigFlags::empty())
        .unwrap();
    assert!(!written.exists());

    store.add(Arc::new(logical_config("added")));
    let contents = fs::read_to_string(&written).unwrap();
    assert_eq!(contents, store.generate_document());

    let config = store.lookup(&key("added")).unwrap();
    store.remove(&config);
    assert_eq!(fs::read_to_string(&written).unwrap(), store.generate_document());
    assert!(!env.user_file().exists());
}

#[test]
fn system_configs_are_never_persisted() {
    let env = Environment::new();
    let custom = env.dir.path().join("custom.xml");
    let written = env.dir.path().join("written.xml");
    write_file(&custom, &document(&[configuration_xml("system", 1)]));

    let mut store = env.store();
    store
        .set_custom(&custom, Some(&written), ConfigFlags::SYSTEM_CONFIG)
        .unwrap();
    let config = store.lookup(&key("system")).unwrap();
    assert!(config.is_system_config());

    store.add(config);
    assert!(!written.exists());
}

#[tokio::test]
async fn add_persists_asynchronously() {
    let env = Environment::new();
    let mut store = env.store();

    store.add(Arc::new(logical_config("first")));
    store.add(Arc::new(logical_config("second")));
    store.flush().await.unwrap();

    let contents = fs::read_to_string(env.user_file()).unwrap();
    assert_eq!(contents, store.generate_document());
    let parsed = parse_document(&contents, ConfigFlags::empty(), &LayoutValidator).unwrap();
    assert_eq!(parsed.configs.len(), 2);
}

#[tokio::test]
async fn dropping_the_store_flushes_pending_writes() {
    let env = Environment::new();
    let mut store = env.store();
    store.add(Arc::new(logical_config("first")));
    let expected = store.generate_document();
    drop(store);

    assert_eq!(fs::read_to_string(env.user_file()).unwrap(), expected);
}

#[tokio::test]
async fn migrated_user_document_is_rewritten() {
    let env = Environment::new();
    let legacy = document(&[configuration_xml("user", 1)])
        .replace("    <layoutmode>logical</layoutmode>\n", "");
    env.write_user(&legacy);

    let mut store = env.store();
    store.flush().await.unwrap();
    assert_eq!(store.config_count(), 2);

    let contents = fs::read_to_string(env.user_file()).unwrap();
    assert_ne!(contents, legacy);
    assert_eq!(contents, store.generate_document());
}

#[test]
fn migrated_system_document_does_not_replace_malformed_user_document() {
    let env = Environment::new();
    let legacy = document(&[configuration_xml("system", 1)])
        .replace("    <layoutmode>logical</layoutmode>\n", "");
    env.write_system(0, &legacy);
    env.write_user("this is not a monitors document");

    let store = env.store();
    assert_eq!(store.config_count(), 2);
    drop(store);
    assert_eq!(
        fs::read_to_string(env.user_file()).unwrap(),
        "this is not a monitors document"
    );
}

#[test]
fn migrated_system_document_is_not_written_to_the_user_tier() {
    let env = Environment::new();
    let legacy = document(&[configuration_xml("system", 1)])
        .replace("    <layoutmode>logical</layoutmode>\n", "");
    env.write_system(0, &legacy);

    let store = env.store();
    assert_eq!(store.config_count(), 2);
    drop(store);
    assert!(!env.user_file().exists());
}

#[tokio::test]
async fn reset_keeps_the_latest_addition() {
    let env = Environment::new();
    let mut store = env.store();

    store.add(Arc::new(logical_config("added")));
    store.reset();
    assert!(store.lookup(&key("added")).is_some());

    let contents = fs::read_to_string(env.user_file()).unwrap();
    let parsed = parse_document(&contents, ConfigFlags::empty(), &LayoutValidator).unwrap();
    assert!(parsed.configs.contains_key(&key("added")));
}

#[test]
fn custom_write_path_ignores_stores_policy() {
    let env = Environment::new();
    let custom = env.dir.path().join("custom.xml");
    let written = env.dir.path().join("written.xml");
    write_file(
        &custom,
        &document(&[policy_xml(&["system"], None), configuration_xml("system", 1)]),
    );

    let mut store = env.store();
    store
        .set_custom(&custom, Some(&written), ConfigFlags::SYSTEM_CONFIG)
        .unwrap();
    assert_eq!(store.stores_policy(), Some(&[StoreTier::System][..]));

    store.add(Arc::new(logical_config("added")));
    let parsed = parse_document(
        &fs::read_to_string(&written).unwrap(),
        ConfigFlags::empty(),
        &LayoutValidator,
    )
    .unwrap();
    assert_eq!(parsed.configs.len(), 1);
    assert!(parsed.configs.contains_key(&key("added")));
    assert!(!env.user_file().exists());
}
