use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::config::{ConfigFlags, ConfigKey, ConfigPolicy, Configuration, StoreTier};
use crate::error::{ConfigError, PersistenceError};
use crate::parser::{parse_document, ParsedDocument, ParsedPolicy};
use crate::persistence::DocumentWriter;
use crate::validator::Validator;
use crate::writer;

pub const CONFIG_FILE_NAME: &str = "monitors.xml";
const DEFAULT_SYSTEM_CONFIG_DIRS: &str = "/etc/xdg";

/// Where monitors documents are looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    /// Directories searched for a system document, in search-path order.
    pub system_dirs: Vec<PathBuf>,
    /// The writable user document.
    pub user_file: PathBuf,
}

impl StorePaths {
    /// Resolves the XDG locations. `None` when no user config directory can
    /// be determined.
    pub fn from_env() -> Option<StorePaths> {
        let system_dirs = env::var("XDG_CONFIG_DIRS")
            .ok()
            .filter(|dirs| !dirs.is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_CONFIG_DIRS.to_owned());

        Some(StorePaths {
            system_dirs: system_dirs
                .split(':')
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from)
                .collect(),
            user_file: dirs::config_dir()?.join(CONFIG_FILE_NAME),
        })
    }

    fn system_files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.system_dirs.iter().map(|dir| dir.join(CONFIG_FILE_NAME))
    }
}

/// In-memory table of known monitor configurations backed by the system
/// and user documents.
pub struct ConfigStore {
    validator: Box<dyn Validator>,
    paths: StorePaths,
    configs: BTreeMap<ConfigKey, Arc<Configuration>>,

    custom_read_file: Option<PathBuf>,
    custom_write_file: Option<PathBuf>,

    stores_policy: Option<Vec<StoreTier>>,
    policy: ConfigPolicy,
    has_dbus_policy: bool,

    writer: DocumentWriter,
}

impl ConfigStore {
    /// Creates a store and loads the documents found at `paths`.
    pub fn new(paths: StorePaths, validator: impl Validator + 'static) -> ConfigStore {
        let mut store = ConfigStore {
            validator: Box::new(validator),
            paths,
            configs: BTreeMap::new(),
            custom_read_file: None,
            custom_write_file: None,
            stores_policy: None,
            policy: ConfigPolicy::default(),
            has_dbus_policy: false,
            writer: DocumentWriter::new(),
        };
        store.reset();
        store
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn validator(&self) -> &dyn Validator {
        self.validator.as_ref()
    }

    pub fn lookup(&self, key: &ConfigKey) -> Option<Arc<Configuration>> {
        self.configs.get(key).cloned()
    }

    /// Inserts or replaces the configuration with the same key.
    pub fn add(&mut self, config: Arc<Configuration>) {
        let is_system_config = config.is_system_config();
        self.configs.insert(config.key().clone(), config);
        if !is_system_config {
            self.maybe_save();
        }
    }

    pub fn remove(&mut self, config: &Configuration) {
        if self.configs.remove(config.key()).is_some() && !config.is_system_config() {
            self.maybe_save();
        }
    }

    pub fn config_count(&self) -> usize {
        self.configs.len()
    }

    pub fn configs(&self) -> impl Iterator<Item = &Arc<Configuration>> {
        self.configs.values()
    }

    /// The store tiers a system document restricted loading to, if any.
    pub fn stores_policy(&self) -> Option<&[StoreTier]> {
        self.stores_policy.as_deref()
    }

    pub fn policy(&self) -> &ConfigPolicy {
        &self.policy
    }

    /// The document persistence would write right now.
    pub fn generate_document(&self) -> String {
        writer::generate_document(self.configs.values().map(Arc::as_ref))
    }

    /// Waits for an in-flight asynchronous write to finish.
    pub async fn flush(&mut self) -> Result<(), PersistenceError> {
        self.writer.flush().await
    }

    fn clear(&mut self) {
        self.configs.clear();
        self.custom_read_file = None;
        self.custom_write_file = None;
        self.stores_policy = None;
        self.policy = ConfigPolicy::default();
        self.has_dbus_policy = false;
    }

    fn allows(&self, tier: StoreTier) -> bool {
        self.stores_policy
            .as_ref()
            .map_or(true, |stores| stores.contains(&tier))
    }

    fn read_document(&self, path: &Path, flags: ConfigFlags) -> Result<ParsedDocument, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        parse_document(&text, flags, self.validator.as_ref()).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    fn apply_policy(&mut self, policy: ParsedPolicy, path: &Path) {
        if let Some(stores) = policy.stores {
            if self.stores_policy.is_some() {
                warn!(
                    "Ignoring stores policy from '{}', a stores policy is already set",
                    path.display()
                );
            } else {
                self.stores_policy = Some(stores);
            }
        }

        if let Some(enable_dbus) = policy.enable_dbus {
            if self.has_dbus_policy {
                warn!(
                    "Ignoring D-Bus policy from '{}', a D-Bus policy is already set",
                    path.display()
                );
            } else {
                self.has_dbus_policy = true;
                self.policy.enable_dbus = enable_dbus;
            }
        }
    }

    /// Drops all state and reloads the system documents followed by the
    /// user document. Unreadable documents are logged and skipped. Only a
    /// migrated user document is written back.
    pub fn reset(&mut self) {
        self.finish_pending_write();
        self.clear();

        let mut needs_rewrite = false;
        let mut system_configs = BTreeMap::new();
        let system_files: Vec<PathBuf> = self.paths.system_files().collect();
        for path in system_files {
            if !path.exists() {
                continue;
            }
            match self.read_document(&path, ConfigFlags::SYSTEM_CONFIG) {
                Ok(document) => {
                    debug!(
                        "Read {} configuration(s) from '{}'",
                        document.configs.len(),
                        path.display()
                    );
                    self.apply_policy(document.policy, &path);
                    system_configs.extend(document.configs);
                }
                Err(err) => warn!("Failed to read system monitors config: {}", err),
            }
        }

        let mut user_configs = BTreeMap::new();
        let user_file = self.paths.user_file.clone();
        if !self.allows(StoreTier::User) {
            debug!("Store policy excludes the user tier, not reading '{}'", user_file.display());
        } else if user_file.exists() {
            match self.read_document(&user_file, ConfigFlags::empty()) {
                Ok(document) => {
                    needs_rewrite = document.needs_rewrite;
                    user_configs = document.configs;
                }
                Err(err) => warn!("Failed to read user monitors config: {}", err),
            }
        }

        let order = self
            .stores_policy
            .clone()
            .unwrap_or_else(|| vec![StoreTier::System, StoreTier::User]);
        for tier in order {
            let configs = match tier {
                StoreTier::System => mem::take(&mut system_configs),
                StoreTier::User => mem::take(&mut user_configs),
            };
            for (key, config) in configs {
                self.configs.insert(key, Arc::new(config));
            }
        }

        info!("Loaded {} monitor configuration(s)", self.configs.len());

        if needs_rewrite {
            self.maybe_save();
        }
    }

    /// Replaces all state with the single document at `read_path`. When
    /// `write_path` is given every later save goes there, synchronously;
    /// without it nothing is written back.
    pub fn set_custom(
        &mut self,
        read_path: &Path,
        write_path: Option<&Path>,
        flags: ConfigFlags,
    ) -> Result<(), ConfigError> {
        self.writer.cancel();
        self.clear();
        self.custom_read_file = Some(read_path.to_owned());
        self.custom_write_file = write_path.map(Path::to_owned);

        let document = self.read_document(read_path, flags)?;
        self.apply_policy(document.policy, read_path);
        for (key, config) in document.configs {
            self.configs.insert(key, Arc::new(config));
        }

        if document.needs_rewrite {
            self.maybe_save();
        }
        Ok(())
    }

    fn maybe_save(&mut self) {
        // A custom document without a custom write target must never end
        // up replacing the user document.
        if self.custom_read_file.is_some() && self.custom_write_file.is_none() {
            return;
        }
        self.save();
    }

    fn save(&mut self) {
        let contents = self.generate_document();
        let result = match &self.custom_write_file {
            Some(path) => self.writer.write_sync(path, &contents),
            None if !self.allows(StoreTier::User) => {
                debug!("Store policy excludes the user tier, not saving");
                return;
            }
            None => self.writer.write(self.paths.user_file.clone(), contents),
        };
        if let Err(err) = result {
            warn!("Saving monitor configuration failed: {}", err);
        }
    }

    /// Replaces an in-flight asynchronous write of the user document with a
    /// synchronous one, so the document holds the current state on return.
    fn finish_pending_write(&mut self) {
        if !self.writer.has_pending() {
            return;
        }
        self.writer.cancel();
        let contents = self.generate_document();
        if let Err(err) = self.writer.write_sync(&self.paths.user_file, &contents) {
            warn!("Saving monitor configuration failed: {}", err);
        }
    }
}

impl Drop for ConfigStore {
    fn drop(&mut self) {
        self.finish_pending_write();
    }
}
