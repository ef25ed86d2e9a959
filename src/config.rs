use bitflags::bitflags;
use std::sync::{Arc, Weak};

use crate::geometry::Rectangle;
use crate::monitor::{LogicalMonitorConfig, MonitorSpec};

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConfigFlags: u32 {
        /// Provided by an administrator; never written back.
        const SYSTEM_CONFIG = 1 << 0;
    }
}

/// Whether logical monitor layouts are in device pixels or already divided
/// by the scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayoutMode {
    Logical,
    Physical,
}

impl LayoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutMode::Logical => "logical",
            LayoutMode::Physical => "physical",
        }
    }

    pub fn from_name(name: &str) -> Option<LayoutMode> {
        match name {
            "logical" => Some(LayoutMode::Logical),
            "physical" => Some(LayoutMode::Physical),
            _ => None,
        }
    }
}

/// Storage tiers a system policy may enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreTier {
    System,
    User,
}

impl StoreTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreTier::System => "system",
            StoreTier::User => "user",
        }
    }

    pub fn from_name(name: &str) -> Option<StoreTier> {
        match name {
            "system" => Some(StoreTier::System),
            "user" => Some(StoreTier::User),
            _ => None,
        }
    }
}

/// Policy knobs outside of store selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigPolicy {
    pub enable_dbus: bool,
}

impl Default for ConfigPolicy {
    fn default() -> Self {
        ConfigPolicy { enable_dbus: true }
    }
}

/// Lookup identity of a configuration: the sorted set of monitors it
/// references, qualified by layout mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigKey {
    monitor_specs: Vec<MonitorSpec>,
    layout_mode: LayoutMode,
}

impl ConfigKey {
    pub fn new(
        monitor_specs: impl IntoIterator<Item = MonitorSpec>,
        layout_mode: LayoutMode,
    ) -> ConfigKey {
        let mut monitor_specs: Vec<MonitorSpec> = monitor_specs.into_iter().collect();
        monitor_specs.sort();
        ConfigKey {
            monitor_specs,
            layout_mode,
        }
    }

    pub fn monitor_specs(&self) -> &[MonitorSpec] {
        &self.monitor_specs
    }

    pub fn layout_mode(&self) -> LayoutMode {
        self.layout_mode
    }
}

/// A complete monitors configuration ("MonitorsConfig").
#[derive(Debug, Clone)]
pub struct Configuration {
    logical_monitor_configs: Vec<LogicalMonitorConfig>,
    disabled_monitor_specs: Vec<MonitorSpec>,
    for_lease_monitor_specs: Vec<MonitorSpec>,
    layout_mode: LayoutMode,
    flags: ConfigFlags,
    key: ConfigKey,
    parent: Option<Weak<Configuration>>,
}

impl Configuration {
    pub fn new(
        logical_monitor_configs: Vec<LogicalMonitorConfig>,
        disabled_monitor_specs: Vec<MonitorSpec>,
        for_lease_monitor_specs: Vec<MonitorSpec>,
        layout_mode: LayoutMode,
        flags: ConfigFlags,
    ) -> Configuration {
        // Monitors for lease are always disabled too, so they add nothing.
        let key = ConfigKey::new(
            logical_monitor_configs
                .iter()
                .flat_map(|logical_monitor| logical_monitor.monitor_specs())
                .chain(disabled_monitor_specs.iter())
                .cloned(),
            layout_mode,
        );

        Configuration {
            logical_monitor_configs,
            disabled_monitor_specs,
            for_lease_monitor_specs,
            layout_mode,
            flags,
            key,
            parent: None,
        }
    }

    /// Marks this configuration as derived from `parent`. The link does not
    /// keep the parent alive.
    pub fn with_parent(mut self, parent: &Arc<Configuration>) -> Configuration {
        self.parent = Some(Arc::downgrade(parent));
        self
    }

    /// The parent, if one was set and is still alive.
    pub fn parent(&self) -> Option<Arc<Configuration>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Whether a parent link was ever set, even if it since went away.
    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    pub fn key(&self) -> &ConfigKey {
        &self.key
    }

    pub fn logical_monitor_configs(&self) -> &[LogicalMonitorConfig] {
        &self.logical_monitor_configs
    }

    pub fn disabled_monitor_specs(&self) -> &[MonitorSpec] {
        &self.disabled_monitor_specs
    }

    pub fn for_lease_monitor_specs(&self) -> &[MonitorSpec] {
        &self.for_lease_monitor_specs
    }

    pub fn layout_mode(&self) -> LayoutMode {
        self.layout_mode
    }

    pub fn flags(&self) -> ConfigFlags {
        self.flags
    }

    pub fn is_system_config(&self) -> bool {
        self.flags.contains(ConfigFlags::SYSTEM_CONFIG)
    }

    pub fn is_monitor_enabled(&self, monitor_spec: &MonitorSpec) -> bool {
        self.logical_monitor_configs
            .iter()
            .any(|logical_monitor| logical_monitor.has_monitor(monitor_spec))
    }

    pub fn primary_logical_monitor(&self) -> Option<&LogicalMonitorConfig> {
        self.logical_monitor_configs
            .iter()
            .find(|logical_monitor| logical_monitor.is_primary)
    }

    /// Bounding box of every logical monitor.
    pub fn bounds(&self) -> Option<Rectangle> {
        Rectangle::union_all(
            self.logical_monitor_configs
                .iter()
                .map(|logical_monitor| &logical_monitor.layout),
        )
    }
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.flags == other.flags
            && self.logical_monitor_configs == other.logical_monitor_configs
            && self.disabled_monitor_specs == other.disabled_monitor_specs
            && self.for_lease_monitor_specs == other.for_lease_monitor_specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::ModeSpec;
    use crate::monitor::MonitorConfig;

    fn logical_monitor(connector: &str, x: i32) -> LogicalMonitorConfig {
        let spec = MonitorSpec::new(connector, "Vendor", "Product", "Serial");
        LogicalMonitorConfig::new(
            x,
            0,
            1.0,
            vec![MonitorConfig::new(spec, ModeSpec::new(1024, 768, 60.0))],
        )
    }

    #[test]
    fn key_ignores_logical_monitor_order() {
        let forward = Configuration::new(
            vec![logical_monitor("DP-1", 0), logical_monitor("DP-2", 1024)],
            vec![MonitorSpec::new("HDMI-1", "V", "P", "S")],
            vec![],
            LayoutMode::Logical,
            ConfigFlags::empty(),
        );
        let reversed = Configuration::new(
            vec![logical_monitor("DP-2", 0), logical_monitor("DP-1", 1024)],
            vec![MonitorSpec::new("HDMI-1", "V", "P", "S")],
            vec![],
            LayoutMode::Logical,
            ConfigFlags::empty(),
        );
        assert_eq!(forward.key(), reversed.key());
        assert_eq!(forward.key().monitor_specs().len(), 3);
    }

    #[test]
    fn key_distinguishes_layout_mode() {
        let logical = Configuration::new(
            vec![logical_monitor("DP-1", 0)],
            vec![],
            vec![],
            LayoutMode::Logical,
            ConfigFlags::empty(),
        );
        let physical = Configuration::new(
            vec![logical_monitor("DP-1", 0)],
            vec![],
            vec![],
            LayoutMode::Physical,
            ConfigFlags::empty(),
        );
        assert_ne!(logical.key(), physical.key());
        assert!(logical.key() < physical.key());
    }

    #[test]
    fn parent_link_does_not_keep_parent_alive() {
        let parent = Arc::new(Configuration::new(
            vec![logical_monitor("DP-1", 0)],
            vec![],
            vec![],
            LayoutMode::Logical,
            ConfigFlags::empty(),
        ));
        let child = Configuration::new(
            vec![logical_monitor("DP-1", 0)],
            vec![],
            vec![],
            LayoutMode::Logical,
            ConfigFlags::empty(),
        )
        .with_parent(&parent);

        assert!(child.parent().is_some());
        drop(parent);
        assert!(child.parent().is_none());
        assert!(child.has_parent());
    }
}
