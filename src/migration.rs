use log::{debug, info};

use crate::config::{ConfigFlags, Configuration, LayoutMode};
use crate::error::{MigrationError, ValidationError};
use crate::geometry::Rectangle;
use crate::monitor::{LogicalMonitorConfig, MonitorSpec};
use crate::validator::Validator;

/// A configuration read without a layout mode. Logical monitor positions are
/// device pixels; their sizes are derived during migration.
#[derive(Debug, Clone, Default)]
pub struct PendingConfiguration {
    pub logical_monitor_configs: Vec<LogicalMonitorConfig>,
    pub disabled_monitor_specs: Vec<MonitorSpec>,
    pub for_lease_monitor_specs: Vec<MonitorSpec>,
    pub flags: ConfigFlags,
}

impl PendingConfiguration {
    fn build(&self, logical_monitor_configs: Vec<LogicalMonitorConfig>, layout_mode: LayoutMode) -> Configuration {
        Configuration::new(
            logical_monitor_configs,
            self.disabled_monitor_specs.clone(),
            self.for_lease_monitor_specs.clone(),
            layout_mode,
            self.flags,
        )
    }

    fn derive(&self, layout_mode: LayoutMode) -> Result<Configuration, ValidationError> {
        let mut logical_monitors = self.logical_monitor_configs.clone();
        for logical_monitor in &mut logical_monitors {
            logical_monitor.derive_layout(layout_mode)?;
        }
        Ok(self.build(logical_monitors, layout_mode))
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

impl Axis {
    fn origin(self, rect: &Rectangle) -> i32 {
        match self {
            Axis::Horizontal => rect.x,
            Axis::Vertical => rect.y,
        }
    }

    fn size(self, rect: &Rectangle) -> i32 {
        match self {
            Axis::Horizontal => rect.width,
            Axis::Vertical => rect.height,
        }
    }

    fn cross_origin(self, rect: &Rectangle) -> i32 {
        match self {
            Axis::Horizontal => rect.y,
            Axis::Vertical => rect.x,
        }
    }

    fn cross_size(self, rect: &Rectangle) -> i32 {
        match self {
            Axis::Horizontal => rect.height,
            Axis::Vertical => rect.width,
        }
    }

    fn set_origin(self, rect: &mut Rectangle, value: i32) {
        match self {
            Axis::Horizontal => rect.x = value,
            Axis::Vertical => rect.y = value,
        }
    }

    fn set_cross_origin(self, rect: &mut Rectangle, value: i32) {
        match self {
            Axis::Horizontal => rect.y = value,
            Axis::Vertical => rect.x = value,
        }
    }
}

const AXES: [Axis; 2] = [Axis::Horizontal, Axis::Vertical];

/// Rounds half away from zero, as libm's `roundf` does.
fn half(size: i32) -> i32 {
    (size as f32 / 2.0).round() as i32
}

fn is_integral(value: f32) -> bool {
    value.floor() == value
}

/// The layout as stored: original position with the unscaled mode size.
fn physical_rect(logical_monitor: &LogicalMonitorConfig) -> Rectangle {
    let (width, height) = logical_monitor.physical_size().unwrap_or((0, 0));
    Rectangle::new(logical_monitor.layout.x, logical_monitor.layout.y, width, height)
}

fn closest_scale(scales: &[f32], current: f32) -> Option<f32> {
    scales
        .iter()
        .copied()
        .min_by(|a, b| (a - current).abs().total_cmp(&(b - current).abs()))
}

/// Replaces scales that don't divide the mode evenly and rescales every
/// logical monitor, keeping the stored positions.
fn snap_scales(logical_monitors: &[LogicalMonitorConfig], validator: &dyn Validator) -> Vec<LogicalMonitorConfig> {
    logical_monitors
        .iter()
        .map(|logical_monitor| {
            let mut logical_monitor = logical_monitor.clone();
            let (width, height) = logical_monitor.physical_size().unwrap_or((0, 0));

            if !is_integral(width as f32 / logical_monitor.scale)
                || !is_integral(height as f32 / logical_monitor.scale)
            {
                let scales = logical_monitor
                    .monitor_configs
                    .first()
                    .map(|monitor_config| validator.supported_scales(&monitor_config.mode_spec, LayoutMode::Logical))
                    .unwrap_or_default();
                let snapped = closest_scale(&scales, logical_monitor.scale).unwrap_or(1.0);
                debug!(
                    "Snapping scale {} of {}x{} logical monitor to {}",
                    logical_monitor.scale, width, height, snapped
                );
                logical_monitor.scale = snapped;
            }

            logical_monitor.layout.width = (width as f32 / logical_monitor.scale).round() as i32;
            logical_monitor.layout.height = (height as f32 / logical_monitor.scale).round() as i32;
            logical_monitor
        })
        .collect()
}

/// Lays the monitors out again along one axis if they formed an unbroken line
/// along it, centering each on its predecessor on the other axis.
fn convert_line(
    original: &[LogicalMonitorConfig],
    scaled: &[LogicalMonitorConfig],
    axis: Axis,
) -> Option<Vec<LogicalMonitorConfig>> {
    let physical: Vec<Rectangle> = original.iter().map(physical_rect).collect();
    let mut expected = physical.iter().map(|rect| axis.origin(rect)).min()?;
    let mut placed = vec![false; physical.len()];
    let mut order = Vec::with_capacity(physical.len());

    while order.len() < physical.len() {
        let next = (0..physical.len()).find(|&i| !placed[i] && axis.origin(&physical[i]) == expected)?;
        placed[next] = true;
        order.push(next);
        expected += axis.size(&physical[next]);
    }

    let mut result = scaled.to_vec();
    let mut cursor = 0;
    let mut previous: Option<(i32, i32)> = None;

    for index in order {
        let layout = &mut result[index].layout;
        let cross_size = axis.cross_size(layout);
        let cross_origin = match previous {
            None => 0,
            Some((previous_origin, previous_size)) => {
                previous_origin + half(previous_size) - half(cross_size)
            }
        };

        axis.set_origin(layout, cursor);
        axis.set_cross_origin(layout, cross_origin);
        cursor += axis.size(layout);
        previous = Some((cross_origin, cross_size));
    }

    Some(result)
}

/// Repacks monitors hanging off both sides of a common baseline, keeping
/// each monitor's edge on the baseline.
fn convert_baseline(
    original: &[LogicalMonitorConfig],
    scaled: &[LogicalMonitorConfig],
    axis: Axis,
) -> Option<Vec<LogicalMonitorConfig>> {
    let physical: Vec<Rectangle> = original.iter().map(physical_rect).collect();
    let first = physical.first()?;

    let baseline = [
        axis.cross_origin(first),
        axis.cross_origin(first) + axis.cross_size(first),
    ]
    .into_iter()
    .find(|&baseline| {
        physical.iter().all(|rect| {
            axis.cross_origin(rect) == baseline
                || axis.cross_origin(rect) + axis.cross_size(rect) == baseline
        })
    })?;

    let leading: Vec<bool> = physical
        .iter()
        .map(|rect| axis.cross_origin(rect) == baseline)
        .collect();

    let mut result = scaled.to_vec();
    for (index, logical_monitor) in result.iter_mut().enumerate() {
        let layout = &mut logical_monitor.layout;
        if leading[index] {
            axis.set_cross_origin(layout, baseline);
        } else {
            let cross_size = axis.cross_size(layout);
            axis.set_cross_origin(layout, baseline - cross_size);
        }
    }

    let start = physical.iter().map(|rect| axis.origin(rect)).min()?;

    for side in [true, false] {
        let members: Vec<usize> = (0..physical.len()).filter(|&i| leading[i] == side).collect();
        let mut cursor = start;
        let mut placed = vec![false; physical.len()];

        for _ in 0..members.len() {
            let next = members
                .iter()
                .copied()
                .filter(|&i| !placed[i] && axis.origin(&physical[i]) >= cursor)
                .min_by_key(|&i| axis.origin(&physical[i]))?;
            placed[next] = true;

            let layout = &mut result[next].layout;
            axis.set_origin(layout, cursor);
            cursor += axis.size(layout);
        }
    }

    Some(result)
}

/// Ignores stored positions and lines every monitor up left to right.
fn convert_linear(scaled: &[LogicalMonitorConfig]) -> Vec<LogicalMonitorConfig> {
    let mut result = scaled.to_vec();
    let mut x = 0;
    for logical_monitor in &mut result {
        logical_monitor.layout.x = x;
        logical_monitor.layout.y = 0;
        x += logical_monitor.layout.width;
    }
    result
}

/// Moves the layout so that it starts at the origin.
fn normalize(logical_monitors: &mut [LogicalMonitorConfig]) {
    let min_x = logical_monitors.iter().map(|lm| lm.layout.x).min().unwrap_or(0);
    let min_y = logical_monitors.iter().map(|lm| lm.layout.y).min().unwrap_or(0);
    for logical_monitor in logical_monitors {
        logical_monitor.layout.x -= min_x;
        logical_monitor.layout.y -= min_y;
    }
}

fn convert_logical(pending: &PendingConfiguration, validator: &dyn Validator) -> Result<Configuration, ValidationError> {
    let original = &pending.logical_monitor_configs;
    let scaled = snap_scales(original, validator);

    let attempt = |name: &str, mut logical_monitors: Vec<LogicalMonitorConfig>| {
        normalize(&mut logical_monitors);
        let config = pending.build(logical_monitors, LayoutMode::Logical);
        match validator.validate(&config) {
            Ok(()) => {
                info!("Converted monitor layout using {name} strategy");
                Ok(config)
            }
            Err(err) => {
                debug!("Monitor layout conversion using {name} strategy rejected: {err}");
                Err(err)
            }
        }
    };

    if let Ok(config) = attempt("scale snapping", scaled.clone()) {
        return Ok(config);
    }

    for axis in AXES {
        if let Some(converted) = convert_line(original, &scaled, axis) {
            if let Ok(config) = attempt("line", converted) {
                return Ok(config);
            }
        }
    }

    for axis in AXES {
        if let Some(converted) = convert_baseline(original, &scaled, axis) {
            if let Ok(config) = attempt("baseline", converted) {
                return Ok(config);
            }
        }
    }

    attempt("linear", convert_linear(&scaled))
}

/// Derives the physical and the logical interpretation of a configuration
/// stored without a layout mode. At least one of them must validate.
pub fn migrate(
    pending: &PendingConfiguration,
    validator: &dyn Validator,
) -> Result<Vec<Configuration>, MigrationError> {
    let physical = pending
        .derive(LayoutMode::Physical)
        .and_then(|config| validator.validate(&config).map(|()| config));

    let logical = pending
        .derive(LayoutMode::Logical)
        .and_then(|config| validator.validate(&config).map(|()| config))
        .or_else(|err| {
            debug!("Logical interpretation invalid ({err}), converting layout");
            convert_logical(pending, validator)
        });

    match (physical, logical) {
        (Err(physical), Err(logical)) => Err(MigrationError::NoValidLayout { physical, logical }),
        (physical, logical) => Ok(physical.into_iter().chain(logical).collect()),
    }
}
