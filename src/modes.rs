use bitflags::bitflags;
use core::fmt;

/// Refresh rates are stored with three decimals, so that is the precision
/// two mode specs are compared with.
const REFRESH_RATE_PRECISION: f32 = 1000.0;

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModeFlags: u32 {
        const INTERLACE = 1 << 0;
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshRateMode {
    #[default]
    Fixed,
    Variable,
}

impl RefreshRateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshRateMode::Fixed => "fixed",
            RefreshRateMode::Variable => "variable",
        }
    }

    pub fn from_name(name: &str) -> Option<RefreshRateMode> {
        match name {
            "fixed" => Some(RefreshRateMode::Fixed),
            "variable" => Some(RefreshRateMode::Variable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ModeSpec {
    pub width: i32,
    pub height: i32,
    pub refresh_rate: f32,
    pub refresh_rate_mode: RefreshRateMode,
    pub flags: ModeFlags,
}

impl ModeSpec {
    pub fn new(width: i32, height: i32, refresh_rate: f32) -> ModeSpec {
        ModeSpec {
            width,
            height,
            refresh_rate,
            refresh_rate_mode: RefreshRateMode::Fixed,
            flags: ModeFlags::empty(),
        }
    }

    pub fn get_id(&self) -> String {
        format!("{}x{}@{:.3}Hz", self.width, self.height, self.refresh_rate)
    }

    pub fn is_interlaced(&self) -> bool {
        self.flags.contains(ModeFlags::INTERLACE)
    }

    /// Width, height and refresh rate must all be positive.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.refresh_rate > 0.0
    }

    fn rounded_rate(&self) -> i64 {
        (self.refresh_rate * REFRESH_RATE_PRECISION).round() as i64
    }
}

impl PartialEq for ModeSpec {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.rounded_rate() == other.rounded_rate()
            && self.refresh_rate_mode == other.refresh_rate_mode
            && self.flags == other.flags
    }
}

impl fmt::Display for ModeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get_id())?;
        if self.is_interlaced() {
            write!(f, " (interlaced)")?;
        }
        Ok(())
    }
}
