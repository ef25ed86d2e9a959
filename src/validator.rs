use std::collections::HashSet;

use crate::config::{Configuration, LayoutMode};
use crate::error::ValidationError;
use crate::modes::ModeSpec;
use crate::monitor::LogicalMonitorConfig;

const MINIMUM_SCALE_FACTOR: f32 = 1.0;
const MAXIMUM_SCALE_FACTOR: f32 = 4.0;
const SCALE_FACTORS_PER_INTEGER: i32 = 4;
const SCALE_FACTOR_WINDOW: f32 = 0.5 / SCALE_FACTORS_PER_INTEGER as f32;

/// Constraint checker consulted whenever a configuration is finalized.
pub trait Validator {
    fn validate(&self, config: &Configuration) -> Result<(), ValidationError>;

    /// Scales a monitor running `mode` may use under `layout_mode`.
    fn supported_scales(&self, mode: &ModeSpec, layout_mode: LayoutMode) -> Vec<f32> {
        calculate_supported_scales(mode, layout_mode)
    }
}

impl<F> Validator for F
where
    F: Fn(&Configuration) -> Result<(), ValidationError>,
{
    fn validate(&self, config: &Configuration) -> Result<(), ValidationError> {
        self(config)
    }
}

/// The stock rules: every logical monitor must be consistent with its
/// modes, and together they must form one connected, non-overlapping
/// desktop anchored at the origin.
#[derive(Debug, Default, Clone, Copy)]
pub struct LayoutValidator;

impl Validator for LayoutValidator {
    fn validate(&self, config: &Configuration) -> Result<(), ValidationError> {
        verify_monitors_config(config)
    }
}

fn is_integral(value: f32) -> bool {
    value.floor() == value
}

pub fn verify_logical_monitor_config(
    logical_monitor: &LogicalMonitorConfig,
    layout_mode: LayoutMode,
) -> Result<(), ValidationError> {
    let layout = &logical_monitor.layout;
    let scale = logical_monitor.scale;

    if layout.x < 0 || layout.y < 0 {
        return Err(ValidationError::NegativePosition {
            x: layout.x,
            y: layout.y,
        });
    }

    let first = logical_monitor
        .monitor_configs
        .first()
        .ok_or(ValidationError::EmptyLogicalMonitor)?;
    let mode_width = first.mode_spec.width;
    let mode_height = first.mode_spec.height;

    if logical_monitor.monitor_configs.iter().any(|monitor_config| {
        monitor_config.mode_spec.width != mode_width
            || monitor_config.mode_spec.height != mode_height
    }) {
        return Err(ValidationError::MismatchedModes);
    }

    if !scale.is_finite() || scale <= 0.0 {
        return Err(ValidationError::InvalidScale(scale));
    }

    let (layout_width, layout_height) = if logical_monitor.transform.is_rotated() {
        (layout.height, layout.width)
    } else {
        (layout.width, layout.height)
    };

    let (expected_width, expected_height) = match layout_mode {
        LayoutMode::Logical => {
            if !is_integral(mode_width as f32 / scale) || !is_integral(mode_height as f32 / scale) {
                return Err(ValidationError::FractionalSize);
            }
            (
                (layout_width as f32 * scale).round() as i32,
                (layout_height as f32 * scale).round() as i32,
            )
        }
        LayoutMode::Physical => {
            if (scale - scale.round()).abs() > f32::EPSILON {
                return Err(ValidationError::FractionalScale);
            }
            (layout_width, layout_height)
        }
    };

    if mode_width != expected_width || mode_height != expected_height {
        return Err(ValidationError::SizeMismatch);
    }

    Ok(())
}

fn is_connected(logical_monitors: &[LogicalMonitorConfig]) -> bool {
    let mut reached = vec![false; logical_monitors.len()];
    let mut queue = vec![0];
    reached[0] = true;

    while let Some(index) = queue.pop() {
        let layout = &logical_monitors[index].layout;
        for (other, logical_monitor) in logical_monitors.iter().enumerate() {
            if !reached[other] && layout.is_adjacent_to(&logical_monitor.layout) {
                reached[other] = true;
                queue.push(other);
            }
        }
    }

    reached.into_iter().all(|r| r)
}

pub fn verify_monitors_config(config: &Configuration) -> Result<(), ValidationError> {
    let logical_monitors = config.logical_monitor_configs();
    if logical_monitors.is_empty() {
        return Err(ValidationError::Empty);
    }

    let mut seen = HashSet::new();
    for logical_monitor in logical_monitors {
        verify_logical_monitor_config(logical_monitor, config.layout_mode())?;

        for monitor_spec in logical_monitor.monitor_specs() {
            if !seen.insert(monitor_spec) {
                return Err(ValidationError::DuplicateMonitor(monitor_spec.to_string()));
            }
        }
    }

    let n_primary = logical_monitors.iter().filter(|lm| lm.is_primary).count();
    if n_primary > 1 {
        return Err(ValidationError::MultiplePrimary);
    }

    for (i, a) in logical_monitors.iter().enumerate() {
        for b in &logical_monitors[i + 1..] {
            if a.layout.overlaps(&b.layout) {
                return Err(ValidationError::Overlap);
            }
        }
    }

    if !is_connected(logical_monitors) {
        return Err(ValidationError::NotAdjacent);
    }

    let min_x = logical_monitors.iter().map(|lm| lm.layout.x).min().unwrap_or(0);
    let min_y = logical_monitors.iter().map(|lm| lm.layout.y).min().unwrap_or(0);
    if min_x != 0 || min_y != 0 {
        return Err(ValidationError::Offset);
    }

    for monitor_spec in config.disabled_monitor_specs() {
        if config.is_monitor_enabled(monitor_spec) {
            return Err(ValidationError::DisabledMonitorEnabled(monitor_spec.to_string()));
        }
    }

    for monitor_spec in config.for_lease_monitor_specs() {
        if !config.disabled_monitor_specs().contains(monitor_spec) {
            return Err(ValidationError::ForLeaseNotDisabled(monitor_spec.to_string()));
        }
    }

    Ok(())
}

fn is_scale_valid_for_size(width: i32, height: i32, scale: f32) -> bool {
    is_integral(width as f32 / scale) && is_integral(height as f32 / scale)
}

/// Finds the scale closest to `target` (within half a step) that divides the
/// mode into a whole number of logical pixels.
fn closest_scale_for_resolution(width: i32, height: i32, target: f32) -> Option<f32> {
    if is_scale_valid_for_size(width, height, target) {
        return Some(target);
    }

    let min_logical_width = (width as f32 / (target + SCALE_FACTOR_WINDOW)).ceil() as i32;
    let max_logical_width = (width as f32 / (target - SCALE_FACTOR_WINDOW)).floor() as i32;

    (min_logical_width.max(1)..=max_logical_width)
        .map(|logical_width| width as f32 / logical_width as f32)
        .filter(|scale| {
            *scale >= MINIMUM_SCALE_FACTOR
                && *scale <= MAXIMUM_SCALE_FACTOR
                && (scale - target).abs() < SCALE_FACTOR_WINDOW
                && is_scale_valid_for_size(width, height, *scale)
        })
        .min_by(|a, b| (a - target).abs().total_cmp(&(b - target).abs()))
}

pub fn calculate_supported_scales(mode: &ModeSpec, layout_mode: LayoutMode) -> Vec<f32> {
    let n_steps = ((MAXIMUM_SCALE_FACTOR - MINIMUM_SCALE_FACTOR) as i32) * SCALE_FACTORS_PER_INTEGER;
    let mut scales: Vec<f32> = Vec::new();

    for step in 0..=n_steps {
        let target = MINIMUM_SCALE_FACTOR + step as f32 / SCALE_FACTORS_PER_INTEGER as f32;

        let scale = match layout_mode {
            LayoutMode::Physical if is_integral(target) => Some(target),
            LayoutMode::Physical => None,
            LayoutMode::Logical => closest_scale_for_resolution(mode.width, mode.height, target),
        };

        if let Some(scale) = scale {
            if !scales.contains(&scale) {
                scales.push(scale);
            }
        }
    }

    scales
}
