use core::fmt;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::config::LayoutMode;
use crate::error::ValidationError;
use crate::geometry::Rectangle;
use crate::modes::ModeSpec;

/// Identity of a physical monitor: connector plus EDID derived strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorSpec {
    pub connector: String,
    pub vendor: String,
    pub product: String,
    pub serial: String,
}

impl MonitorSpec {
    pub fn new(connector: &str, vendor: &str, product: &str, serial: &str) -> MonitorSpec {
        MonitorSpec {
            connector: connector.to_owned(),
            vendor: vendor.to_owned(),
            product: product.to_owned(),
            serial: serial.to_owned(),
        }
    }
}

impl fmt::Display for MonitorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{} {} {}'",
            self.connector, self.vendor, self.product, self.serial
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, FromPrimitive)]
pub enum MonitorTransform {
    #[default]
    Normal = 0,
    Left = 1,
    Down = 2,
    Right = 3,
    Flipped = 4,
    FlippedLeft = 5,
    FlippedDown = 6,
    FlippedRight = 7,
}

const FLIPPED_OFFSET: u32 = 4;

impl MonitorTransform {
    /// Rotations by a quarter turn swap width and height.
    pub fn is_rotated(&self) -> bool {
        (*self as u32) % 2 == 1
    }

    pub fn is_flipped(&self) -> bool {
        (*self as u32) >= FLIPPED_OFFSET
    }

    /// Combines a rotation name with the flipped bit.
    pub fn from_parts(rotation: &str, flipped: bool) -> Option<MonitorTransform> {
        let base = match rotation {
            "normal" => 0,
            "left" => 1,
            "upside_down" => 2,
            "right" => 3,
            _ => return None,
        };
        let value = if flipped { base + FLIPPED_OFFSET } else { base };
        MonitorTransform::from_u32(value)
    }

    /// Decomposes the transform back into rotation name and flipped bit.
    pub fn parts(&self) -> (&'static str, bool) {
        let rotation = match (*self as u32) % FLIPPED_OFFSET {
            0 => "normal",
            1 => "left",
            2 => "upside_down",
            _ => "right",
        };
        (rotation, self.is_flipped())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RgbRange {
    #[default]
    Auto,
    Full,
    Limited,
}

impl RgbRange {
    pub fn from_name(name: &str) -> Option<RgbRange> {
        match name {
            "auto" => Some(RgbRange::Auto),
            "full" => Some(RgbRange::Full),
            "limited" => Some(RgbRange::Limited),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RgbRange::Auto => "auto",
            RgbRange::Full => "full",
            RgbRange::Limited => "limited",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ColorMode {
    #[default]
    Default,
    Bt2100,
}

impl ColorMode {
    pub fn from_name(name: &str) -> Option<ColorMode> {
        match name {
            "default" => Some(ColorMode::Default),
            "bt2100" => Some(ColorMode::Bt2100),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColorMode::Default => "default",
            ColorMode::Bt2100 => "bt2100",
        }
    }
}

/// One physical output of a logical monitor together with its mode.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub monitor_spec: MonitorSpec,
    pub mode_spec: ModeSpec,
    pub underscanning: bool,
    pub max_bpc: Option<u32>,
    pub rgb_range: RgbRange,
    pub color_mode: ColorMode,
}

impl MonitorConfig {
    pub fn new(monitor_spec: MonitorSpec, mode_spec: ModeSpec) -> MonitorConfig {
        MonitorConfig {
            monitor_spec,
            mode_spec,
            underscanning: false,
            max_bpc: None,
            rgb_range: RgbRange::Auto,
            color_mode: ColorMode::Default,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogicalMonitorConfig {
    pub layout: Rectangle,
    pub scale: f32,
    pub transform: MonitorTransform,
    pub is_primary: bool,
    pub is_presentation: bool,
    pub monitor_configs: Vec<MonitorConfig>,
}

impl LogicalMonitorConfig {
    pub fn new(x: i32, y: i32, scale: f32, monitor_configs: Vec<MonitorConfig>) -> LogicalMonitorConfig {
        LogicalMonitorConfig {
            layout: Rectangle::new(x, y, 0, 0),
            scale,
            transform: MonitorTransform::Normal,
            is_primary: false,
            is_presentation: false,
            monitor_configs,
        }
    }

    /// Size in device pixels of the first monitor's mode, with the transform
    /// applied.
    pub fn physical_size(&self) -> Option<(i32, i32)> {
        let mode = &self.monitor_configs.first()?.mode_spec;
        if self.transform.is_rotated() {
            Some((mode.height, mode.width))
        } else {
            Some((mode.width, mode.height))
        }
    }

    /// Recomputes the layout size from the monitors' mode, dividing by the
    /// scale in logical layout mode.
    pub fn derive_layout(&mut self, layout_mode: LayoutMode) -> Result<(), ValidationError> {
        let (width, height) = self
            .physical_size()
            .ok_or(ValidationError::EmptyLogicalMonitor)?;
        let first_mode = &self.monitor_configs[0].mode_spec;

        if self.monitor_configs.iter().any(|monitor_config| {
            monitor_config.mode_spec.width != first_mode.width
                || monitor_config.mode_spec.height != first_mode.height
        }) {
            return Err(ValidationError::MismatchedModes);
        }

        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(ValidationError::InvalidScale(self.scale));
        }

        let (width, height) = match layout_mode {
            LayoutMode::Logical => (
                (width as f32 / self.scale).round() as i32,
                (height as f32 / self.scale).round() as i32,
            ),
            LayoutMode::Physical => {
                if (self.scale - self.scale.round()).abs() > f32::EPSILON {
                    return Err(ValidationError::FractionalScale);
                }
                (width, height)
            }
        };

        self.layout.width = width;
        self.layout.height = height;
        Ok(())
    }

    pub fn has_monitor(&self, monitor_spec: &MonitorSpec) -> bool {
        self.monitor_configs
            .iter()
            .any(|monitor_config| &monitor_config.monitor_spec == monitor_spec)
    }

    pub fn monitor_specs(&self) -> impl Iterator<Item = &MonitorSpec> {
        self.monitor_configs
            .iter()
            .map(|monitor_config| &monitor_config.monitor_spec)
    }
}
