use std::collections::BTreeMap;
use std::mem;

use log::{info, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::config::{ConfigFlags, ConfigKey, Configuration, LayoutMode, StoreTier};
use crate::error::{ConfigRejection, ParseError, ParseErrorKind};
use crate::migration::{migrate, PendingConfiguration};
use crate::modes::{ModeFlags, ModeSpec, RefreshRateMode};
use crate::monitor::{
    ColorMode, LogicalMonitorConfig, MonitorConfig, MonitorSpec, MonitorTransform, RgbRange,
};
use crate::validator::Validator;

pub const MONITORS_CONFIG_FORMAT_VERSION: &str = "2";
const LEGACY_FORMAT_VERSION: &str = "1";

/// Largest accepted coordinate or mode dimension.
const MAX_INT_VALUE: i64 = i16::MAX as i64;

/// Everything learned from one document.
#[derive(Debug, Default)]
pub struct ParsedDocument {
    pub configs: BTreeMap<ConfigKey, Configuration>,
    /// Set when at least one configuration had to be migrated.
    pub needs_rewrite: bool,
    pub policy: ParsedPolicy,
    /// Configurations dropped because they failed validation or migration.
    pub rejected: Vec<ConfigRejection>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedPolicy {
    pub stores: Option<Vec<StoreTier>>,
    pub enable_dbus: Option<bool>,
}

/// Leaf elements: each holds a single text value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leaf {
    LayoutMode,
    X,
    Y,
    Scale,
    Primary,
    Presentation,
    Rotation,
    Flipped,
    Connector,
    Vendor,
    Product,
    Serial,
    Width,
    Height,
    Rate,
    RateMode,
    Flag,
    Underscanning,
    MaxBpc,
    RgbRange,
    ColorMode,
    Store,
    Dbus,
}

impl Leaf {
    fn name(self) -> &'static str {
        match self {
            Leaf::LayoutMode => "layoutmode",
            Leaf::X => "x",
            Leaf::Y => "y",
            Leaf::Scale => "scale",
            Leaf::Primary => "primary",
            Leaf::Presentation => "presentation",
            Leaf::Rotation => "rotation",
            Leaf::Flipped => "flipped",
            Leaf::Connector => "connector",
            Leaf::Vendor => "vendor",
            Leaf::Product => "product",
            Leaf::Serial => "serial",
            Leaf::Width => "width",
            Leaf::Height => "height",
            Leaf::Rate => "rate",
            Leaf::RateMode => "ratemode",
            Leaf::Flag => "flag",
            Leaf::Underscanning => "underscanning",
            Leaf::MaxBpc => "maxbpc",
            Leaf::RgbRange => "rgbrange",
            Leaf::ColorMode => "colormode",
            Leaf::Store => "store",
            Leaf::Dbus => "dbus",
        }
    }

    fn parent(self) -> State {
        match self {
            Leaf::LayoutMode => State::Configuration,
            Leaf::X | Leaf::Y | Leaf::Scale | Leaf::Primary | Leaf::Presentation => {
                State::LogicalMonitor
            }
            Leaf::Rotation | Leaf::Flipped => State::Transform,
            Leaf::Connector | Leaf::Vendor | Leaf::Product | Leaf::Serial => State::MonitorSpec,
            Leaf::Width | Leaf::Height | Leaf::Rate | Leaf::RateMode | Leaf::Flag => State::Mode,
            Leaf::Underscanning | Leaf::MaxBpc | Leaf::RgbRange | Leaf::ColorMode => State::Monitor,
            Leaf::Store => State::Stores,
            Leaf::Dbus => State::Policy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    Monitors,
    Configuration,
    LogicalMonitor,
    Transform,
    Monitor,
    MonitorSpec,
    Mode,
    Disabled,
    ForLease,
    Policy,
    Stores,
    Leaf(Leaf),
    Unknown,
    Finished,
}

impl State {
    fn element(self) -> &'static str {
        match self {
            State::Initial | State::Finished => "document",
            State::Monitors => "monitors",
            State::Configuration => "configuration",
            State::LogicalMonitor => "logicalmonitor",
            State::Transform => "transform",
            State::Monitor => "monitor",
            State::MonitorSpec => "monitorspec",
            State::Mode => "mode",
            State::Disabled => "disabled",
            State::ForLease => "forlease",
            State::Policy => "policy",
            State::Stores => "stores",
            State::Leaf(leaf) => leaf.name(),
            State::Unknown => "unknown",
        }
    }
}

fn mark_seen(
    seen: &mut Vec<&'static str>,
    element: &'static str,
    parent: &'static str,
) -> Result<(), ParseErrorKind> {
    if seen.contains(&element) {
        return Err(ParseErrorKind::Duplicate { element, parent });
    }
    seen.push(element);
    Ok(())
}

#[derive(Debug, Default)]
struct ConfigurationBuilder {
    layout_mode: Option<LayoutMode>,
    logical_monitors: Vec<LogicalMonitorConfig>,
    disabled: Vec<MonitorSpec>,
    for_lease: Vec<MonitorSpec>,
    seen: Vec<&'static str>,
}

#[derive(Debug, Default)]
struct LogicalMonitorBuilder {
    x: i32,
    y: i32,
    scale: Option<f32>,
    is_primary: bool,
    is_presentation: bool,
    transform: MonitorTransform,
    rotation: MonitorTransform,
    flipped: bool,
    transform_seen: Vec<&'static str>,
    monitors: Vec<MonitorConfig>,
    seen: Vec<&'static str>,
}

#[derive(Debug, Default)]
struct MonitorBuilder {
    monitor_spec: Option<MonitorSpec>,
    mode_spec: Option<ModeSpec>,
    underscanning: bool,
    max_bpc: Option<u32>,
    rgb_range: RgbRange,
    color_mode: ColorMode,
    seen: Vec<&'static str>,
}

#[derive(Debug, Default)]
struct MonitorSpecBuilder {
    connector: Option<String>,
    vendor: Option<String>,
    product: Option<String>,
    serial: Option<String>,
    seen: Vec<&'static str>,
}

#[derive(Debug)]
struct ModeBuilder {
    mode: ModeSpec,
    seen: Vec<&'static str>,
}

impl Default for ModeBuilder {
    fn default() -> Self {
        ModeBuilder {
            mode: ModeSpec::new(0, 0, 0.0),
            seen: Vec::new(),
        }
    }
}

struct ConfigParser<'a> {
    state: State,
    flags: ConfigFlags,
    validator: &'a dyn Validator,
    document: ParsedDocument,

    monitor_spec_parent: State,
    unknown_root: State,
    unknown_level: u32,
    text: String,

    current_config: ConfigurationBuilder,
    current_logical_monitor: LogicalMonitorBuilder,
    current_monitor: MonitorBuilder,
    current_monitor_spec: MonitorSpecBuilder,
    current_mode: ModeBuilder,

    seen_policy: bool,
    policy_seen: Vec<&'static str>,
    current_stores: Vec<StoreTier>,
}

fn read_int(element: &'static str, text: &str) -> Result<i32, ParseErrorKind> {
    match text.parse::<i64>() {
        Ok(value) if (0..=MAX_INT_VALUE).contains(&value) => Ok(value as i32),
        _ => Err(ParseErrorKind::InvalidValue {
            element,
            value: text.to_owned(),
            reason: "expected a number between 0 and 32767",
        }),
    }
}

fn read_float(element: &'static str, text: &str) -> Result<f32, ParseErrorKind> {
    match text.parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ParseErrorKind::InvalidValue {
            element,
            value: text.to_owned(),
            reason: "expected a decimal number",
        }),
    }
}

fn read_bool(element: &'static str, text: &str) -> Result<bool, ParseErrorKind> {
    match text {
        "yes" => Ok(true),
        "no" => Ok(false),
        _ => Err(ParseErrorKind::InvalidValue {
            element,
            value: text.to_owned(),
            reason: "expected 'yes' or 'no'",
        }),
    }
}

fn read_name<T>(
    element: &'static str,
    text: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, ParseErrorKind> {
    parse(text).ok_or_else(|| ParseErrorKind::InvalidValue {
        element,
        value: text.to_owned(),
        reason: "unknown value",
    })
}

impl<'a> ConfigParser<'a> {
    fn new(flags: ConfigFlags, validator: &'a dyn Validator) -> ConfigParser<'a> {
        ConfigParser {
            state: State::Initial,
            flags,
            validator,
            document: ParsedDocument::default(),
            monitor_spec_parent: State::Monitor,
            unknown_root: State::Monitors,
            unknown_level: 0,
            text: String::new(),
            current_config: ConfigurationBuilder::default(),
            current_logical_monitor: LogicalMonitorBuilder::default(),
            current_monitor: MonitorBuilder::default(),
            current_monitor_spec: MonitorSpecBuilder::default(),
            current_mode: ModeBuilder::default(),
            seen_policy: false,
            policy_seen: Vec::new(),
            current_stores: Vec::new(),
        }
    }

    fn enter_unknown(&mut self, element: &str, root: State) {
        warn!(
            "Unknown element <{}> under <{}>, ignoring",
            element,
            root.element()
        );
        self.unknown_root = root;
        self.unknown_level = 1;
        self.state = State::Unknown;
    }

    fn enter_leaf(&mut self, leaf: Leaf) {
        self.text.clear();
        self.state = State::Leaf(leaf);
    }

    fn unexpected(&self, element: &str) -> ParseErrorKind {
        ParseErrorKind::UnexpectedElement {
            element: element.to_owned(),
            parent: self.state.element(),
        }
    }

    fn start_element(&mut self, element: &str, start: &BytesStart) -> Result<(), ParseErrorKind> {
        match self.state {
            State::Initial => {
                if element != "monitors" {
                    return Err(ParseErrorKind::InvalidDocumentElement(element.to_owned()));
                }
                let version = start
                    .try_get_attribute("version")
                    .map_err(quick_xml::Error::from)?
                    .ok_or(ParseErrorKind::MissingVersion)?
                    .unescape_value()?
                    .into_owned();
                if version == LEGACY_FORMAT_VERSION {
                    return Err(ParseErrorKind::LegacyFormat);
                }
                if version != MONITORS_CONFIG_FORMAT_VERSION {
                    return Err(ParseErrorKind::UnsupportedVersion(version));
                }
                self.state = State::Monitors;
            }
            State::Monitors => match element {
                "configuration" => {
                    self.current_config = ConfigurationBuilder::default();
                    self.state = State::Configuration;
                }
                "policy" => {
                    if !self.flags.contains(ConfigFlags::SYSTEM_CONFIG) {
                        return Err(ParseErrorKind::PolicyNotAllowed);
                    }
                    if self.seen_policy {
                        return Err(ParseErrorKind::MultiplePolicies);
                    }
                    self.seen_policy = true;
                    self.state = State::Policy;
                }
                _ => self.enter_unknown(element, State::Monitors),
            },
            State::Configuration => match element {
                "layoutmode" => {
                    mark_seen(&mut self.current_config.seen, "layoutmode", "configuration")?;
                    self.enter_leaf(Leaf::LayoutMode);
                }
                "logicalmonitor" => {
                    self.current_logical_monitor = LogicalMonitorBuilder::default();
                    self.state = State::LogicalMonitor;
                }
                "disabled" => {
                    mark_seen(&mut self.current_config.seen, "disabled", "configuration")?;
                    self.state = State::Disabled;
                }
                "forlease" => {
                    mark_seen(&mut self.current_config.seen, "forlease", "configuration")?;
                    self.state = State::ForLease;
                }
                _ => self.enter_unknown(element, State::Configuration),
            },
            State::LogicalMonitor => {
                let leaf = match element {
                    "x" => Leaf::X,
                    "y" => Leaf::Y,
                    "scale" => Leaf::Scale,
                    "primary" => Leaf::Primary,
                    "presentation" => Leaf::Presentation,
                    "transform" => {
                        mark_seen(&mut self.current_logical_monitor.seen, "transform", "logicalmonitor")?;
                        self.current_logical_monitor.rotation = MonitorTransform::Normal;
                        self.current_logical_monitor.flipped = false;
                        self.current_logical_monitor.transform_seen.clear();
                        self.state = State::Transform;
                        return Ok(());
                    }
                    "monitor" => {
                        self.current_monitor = MonitorBuilder::default();
                        self.state = State::Monitor;
                        return Ok(());
                    }
                    _ => {
                        self.enter_unknown(element, State::LogicalMonitor);
                        return Ok(());
                    }
                };
                mark_seen(&mut self.current_logical_monitor.seen, leaf.name(), "logicalmonitor")?;
                self.enter_leaf(leaf);
            }
            State::Transform => {
                let leaf = match element {
                    "rotation" => Leaf::Rotation,
                    "flipped" => Leaf::Flipped,
                    _ => return Err(self.unexpected(element)),
                };
                mark_seen(&mut self.current_logical_monitor.transform_seen, leaf.name(), "transform")?;
                self.enter_leaf(leaf);
            }
            State::Monitor => match element {
                "monitorspec" => {
                    mark_seen(&mut self.current_monitor.seen, "monitorspec", "monitor")?;
                    self.current_monitor_spec = MonitorSpecBuilder::default();
                    self.monitor_spec_parent = State::Monitor;
                    self.state = State::MonitorSpec;
                }
                "mode" => {
                    mark_seen(&mut self.current_monitor.seen, "mode", "monitor")?;
                    self.current_mode = ModeBuilder::default();
                    self.state = State::Mode;
                }
                "underscanning" | "maxbpc" | "rgbrange" | "colormode" => {
                    let leaf = match element {
                        "underscanning" => Leaf::Underscanning,
                        "maxbpc" => Leaf::MaxBpc,
                        "rgbrange" => Leaf::RgbRange,
                        _ => Leaf::ColorMode,
                    };
                    mark_seen(&mut self.current_monitor.seen, leaf.name(), "monitor")?;
                    self.enter_leaf(leaf);
                }
                _ => return Err(self.unexpected(element)),
            },
            State::MonitorSpec => {
                let leaf = match element {
                    "connector" => Leaf::Connector,
                    "vendor" => Leaf::Vendor,
                    "product" => Leaf::Product,
                    "serial" => Leaf::Serial,
                    _ => return Err(self.unexpected(element)),
                };
                mark_seen(&mut self.current_monitor_spec.seen, leaf.name(), "monitorspec")?;
                self.enter_leaf(leaf);
            }
            State::Mode => {
                let leaf = match element {
                    "width" => Leaf::Width,
                    "height" => Leaf::Height,
                    "rate" => Leaf::Rate,
                    "ratemode" => Leaf::RateMode,
                    "flag" => {
                        self.enter_leaf(Leaf::Flag);
                        return Ok(());
                    }
                    _ => return Err(self.unexpected(element)),
                };
                mark_seen(&mut self.current_mode.seen, leaf.name(), "mode")?;
                self.enter_leaf(leaf);
            }
            State::Disabled | State::ForLease => {
                if element != "monitorspec" {
                    return Err(self.unexpected(element));
                }
                self.current_monitor_spec = MonitorSpecBuilder::default();
                self.monitor_spec_parent = self.state;
                self.state = State::MonitorSpec;
            }
            State::Policy => match element {
                "stores" => {
                    mark_seen(&mut self.policy_seen, "stores", "policy")?;
                    self.current_stores.clear();
                    self.state = State::Stores;
                }
                "dbus" => {
                    mark_seen(&mut self.policy_seen, "dbus", "policy")?;
                    self.enter_leaf(Leaf::Dbus);
                }
                _ => self.enter_unknown(element, State::Policy),
            },
            State::Stores => match element {
                "store" => self.enter_leaf(Leaf::Store),
                _ => self.enter_unknown(element, State::Stores),
            },
            State::Unknown => self.unknown_level += 1,
            State::Leaf(_) | State::Finished => return Err(self.unexpected(element)),
        }

        Ok(())
    }

    fn handle_text(&mut self, text: &str) -> Result<(), ParseErrorKind> {
        match self.state {
            State::Leaf(_) => self.text.push_str(text),
            State::Unknown => {}
            state => {
                if !text.trim().is_empty() {
                    return Err(ParseErrorKind::UnexpectedContent {
                        text: text.to_owned(),
                        parent: state.element(),
                    });
                }
            }
        }
        Ok(())
    }

    fn finish_leaf(&mut self, leaf: Leaf, text: &str) -> Result<(), ParseErrorKind> {
        let element = leaf.name();
        match leaf {
            Leaf::LayoutMode => {
                self.current_config.layout_mode = Some(read_name(element, text, LayoutMode::from_name)?);
            }
            Leaf::X => self.current_logical_monitor.x = read_int(element, text)?,
            Leaf::Y => self.current_logical_monitor.y = read_int(element, text)?,
            Leaf::Scale => {
                let scale = read_float(element, text)?;
                if scale <= 0.0 {
                    return Err(ParseErrorKind::InvalidValue {
                        element,
                        value: text.to_owned(),
                        reason: "scale must be positive",
                    });
                }
                self.current_logical_monitor.scale = Some(scale);
            }
            Leaf::Primary => self.current_logical_monitor.is_primary = read_bool(element, text)?,
            Leaf::Presentation => {
                self.current_logical_monitor.is_presentation = read_bool(element, text)?
            }
            Leaf::Rotation => {
                self.current_logical_monitor.rotation =
                    read_name(element, text, |name| MonitorTransform::from_parts(name, false))?;
            }
            Leaf::Flipped => self.current_logical_monitor.flipped = read_bool(element, text)?,
            Leaf::Connector => self.current_monitor_spec.connector = Some(text.to_owned()),
            Leaf::Vendor => self.current_monitor_spec.vendor = Some(text.to_owned()),
            Leaf::Product => self.current_monitor_spec.product = Some(text.to_owned()),
            Leaf::Serial => self.current_monitor_spec.serial = Some(text.to_owned()),
            Leaf::Width => self.current_mode.mode.width = read_int(element, text)?,
            Leaf::Height => self.current_mode.mode.height = read_int(element, text)?,
            Leaf::Rate => self.current_mode.mode.refresh_rate = read_float(element, text)?,
            Leaf::RateMode => {
                self.current_mode.mode.refresh_rate_mode =
                    read_name(element, text, RefreshRateMode::from_name)?;
            }
            Leaf::Flag => {
                let flag = read_name(element, text, |name| {
                    (name == "interlace").then_some(ModeFlags::INTERLACE)
                })?;
                self.current_mode.mode.flags |= flag;
            }
            Leaf::Underscanning => self.current_monitor.underscanning = read_bool(element, text)?,
            Leaf::MaxBpc => self.current_monitor.max_bpc = Some(read_int(element, text)? as u32),
            Leaf::RgbRange => self.current_monitor.rgb_range = read_name(element, text, RgbRange::from_name)?,
            Leaf::ColorMode => {
                self.current_monitor.color_mode = read_name(element, text, ColorMode::from_name)?
            }
            Leaf::Store => {
                if text.is_empty() {
                    return Err(ParseErrorKind::EmptyStore);
                }
                let store = read_name(element, text, StoreTier::from_name)?;
                if self.current_stores.contains(&store) {
                    return Err(ParseErrorKind::DuplicateStore);
                }
                self.current_stores.push(store);
            }
            Leaf::Dbus => self.document.policy.enable_dbus = Some(read_bool(element, text)?),
        }
        Ok(())
    }

    fn finish_monitor_spec(&mut self) -> Result<(), ParseErrorKind> {
        let builder = mem::take(&mut self.current_monitor_spec);
        let (Some(connector), Some(vendor), Some(product), Some(serial)) =
            (builder.connector, builder.vendor, builder.product, builder.serial)
        else {
            return Err(ParseErrorKind::Incomplete("monitorspec"));
        };
        let monitor_spec = MonitorSpec {
            connector,
            vendor,
            product,
            serial,
        };

        match self.monitor_spec_parent {
            State::Disabled => self.current_config.disabled.push(monitor_spec),
            State::ForLease => self.current_config.for_lease.push(monitor_spec),
            _ => self.current_monitor.monitor_spec = Some(monitor_spec),
        }
        Ok(())
    }

    fn finish_mode(&mut self) -> Result<(), ParseErrorKind> {
        let builder = mem::take(&mut self.current_mode);
        if !builder.mode.is_valid() {
            return Err(ParseErrorKind::InvalidValue {
                element: "mode",
                value: builder.mode.get_id(),
                reason: "width, height and rate must be positive",
            });
        }
        self.current_monitor.mode_spec = Some(builder.mode);
        Ok(())
    }

    fn finish_monitor(&mut self) -> Result<(), ParseErrorKind> {
        let builder = mem::take(&mut self.current_monitor);
        let (Some(monitor_spec), Some(mode_spec)) = (builder.monitor_spec, builder.mode_spec) else {
            return Err(ParseErrorKind::Incomplete("monitor"));
        };
        self.current_logical_monitor.monitors.push(MonitorConfig {
            monitor_spec,
            mode_spec,
            underscanning: builder.underscanning,
            max_bpc: builder.max_bpc,
            rgb_range: builder.rgb_range,
            color_mode: builder.color_mode,
        });
        Ok(())
    }

    fn finish_logical_monitor(&mut self) {
        let builder = mem::take(&mut self.current_logical_monitor);
        let mut logical_monitor = LogicalMonitorConfig::new(
            builder.x,
            builder.y,
            builder.scale.unwrap_or(1.0),
            builder.monitors,
        );
        logical_monitor.transform = builder.transform;
        logical_monitor.is_primary = builder.is_primary;
        logical_monitor.is_presentation = builder.is_presentation;
        self.current_config.logical_monitors.push(logical_monitor);
    }

    fn insert(&mut self, config: Configuration) {
        self.document.configs.insert(config.key().clone(), config);
    }

    fn reject(&mut self, rejection: ConfigRejection) {
        warn!("Ignoring invalid monitor configuration: {}", rejection);
        self.document.rejected.push(rejection);
    }

    fn finish_configuration(&mut self) {
        let builder = mem::take(&mut self.current_config);

        let Some(layout_mode) = builder.layout_mode else {
            let pending = PendingConfiguration {
                logical_monitor_configs: builder.logical_monitors,
                disabled_monitor_specs: builder.disabled,
                for_lease_monitor_specs: builder.for_lease,
                flags: self.flags,
            };
            self.document.needs_rewrite = true;

            match migrate(&pending, self.validator) {
                Ok(configs) => {
                    info!(
                        "Migrated monitor configuration without layout mode into {} configuration(s)",
                        configs.len()
                    );
                    for config in configs {
                        self.insert(config);
                    }
                }
                Err(err) => self.reject(err.into()),
            }
            return;
        };

        let mut logical_monitors = builder.logical_monitors;
        for logical_monitor in &mut logical_monitors {
            if let Err(err) = logical_monitor.derive_layout(layout_mode) {
                self.reject(err.into());
                return;
            }
        }

        let config = Configuration::new(
            logical_monitors,
            builder.disabled,
            builder.for_lease,
            layout_mode,
            self.flags,
        );

        match self.validator.validate(&config) {
            Ok(()) => self.insert(config),
            Err(err) => self.reject(err.into()),
        }
    }

    fn end_element(&mut self) -> Result<(), ParseErrorKind> {
        self.state = match self.state {
            State::Leaf(leaf) => {
                let text = mem::take(&mut self.text);
                self.finish_leaf(leaf, text.trim())?;
                leaf.parent()
            }
            State::Unknown => {
                self.unknown_level -= 1;
                if self.unknown_level == 0 {
                    self.unknown_root
                } else {
                    State::Unknown
                }
            }
            State::MonitorSpec => {
                self.finish_monitor_spec()?;
                self.monitor_spec_parent
            }
            State::Mode => {
                self.finish_mode()?;
                State::Monitor
            }
            State::Monitor => {
                self.finish_monitor()?;
                State::LogicalMonitor
            }
            State::Transform => {
                let (rotation, _) = self.current_logical_monitor.rotation.parts();
                self.current_logical_monitor.transform =
                    MonitorTransform::from_parts(rotation, self.current_logical_monitor.flipped)
                        .unwrap_or_default();
                State::LogicalMonitor
            }
            State::LogicalMonitor => {
                self.finish_logical_monitor();
                State::Configuration
            }
            State::Disabled | State::ForLease => State::Configuration,
            State::Configuration => {
                self.finish_configuration();
                State::Monitors
            }
            State::Stores => {
                self.document.policy.stores = Some(mem::take(&mut self.current_stores));
                State::Policy
            }
            State::Policy => State::Monitors,
            State::Monitors => State::Finished,
            State::Initial | State::Finished => return Err(ParseErrorKind::UnexpectedEof),
        };
        Ok(())
    }

    fn run(mut self, text: &str) -> Result<ParsedDocument, ParseError> {
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);

        loop {
            let position = reader.buffer_position();
            let result = match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    self.start_element(&name, e)
                }
                Ok(Event::Empty(ref e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    self.start_element(&name, e).and_then(|()| self.end_element())
                }
                Ok(Event::End(_)) => self.end_element(),
                Ok(Event::Text(ref e)) => match e.unescape() {
                    Ok(text) => self.handle_text(&text),
                    Err(err) => Err(err.into()),
                },
                Ok(Event::CData(e)) => {
                    let data = e.into_inner();
                    self.handle_text(&String::from_utf8_lossy(&data))
                }
                Ok(Event::Eof) => {
                    if self.state != State::Finished {
                        return Err(ParseError::new(position, ParseErrorKind::UnexpectedEof));
                    }
                    return Ok(self.document);
                }
                Ok(_) => Ok(()),
                Err(err) => Err(err.into()),
            };

            result.map_err(|kind| ParseError::new(position, kind))?;
        }
    }
}

/// Parses a complete monitors document.
///
/// `flags` are attached to every configuration read; only documents flagged
/// as system configuration may declare a policy. Configurations without a
/// layout mode are migrated, which marks the document as needing a rewrite.
pub fn parse_document(
    text: &str,
    flags: ConfigFlags,
    validator: &dyn Validator,
) -> Result<ParsedDocument, ParseError> {
    ConfigParser::new(flags, validator).run(text)
}
