pub mod config;
pub mod error;
pub mod geometry;
pub mod history;
pub mod migration;
pub mod modes;
pub mod monitor;
pub mod parser;
pub mod persistence;
pub mod store;
pub mod validator;
pub mod writer;

pub use config::{ConfigFlags, ConfigKey, ConfigPolicy, Configuration, LayoutMode, StoreTier};
pub use error::{
    ConfigError, ConfigRejection, MigrationError, ParseError, ParseErrorKind, PersistenceError,
    ValidationError,
};
pub use geometry::Rectangle;
pub use history::ConfigHistory;
pub use migration::{migrate, PendingConfiguration};
pub use modes::{ModeFlags, ModeSpec, RefreshRateMode};
pub use monitor::{
    ColorMode, LogicalMonitorConfig, MonitorConfig, MonitorSpec, MonitorTransform, RgbRange,
};
pub use parser::{parse_document, ParsedDocument, ParsedPolicy};
pub use store::{ConfigStore, StorePaths};
pub use validator::{LayoutValidator, Validator};
pub use writer::generate_document;
