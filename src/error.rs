use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading a monitors document.
#[derive(Debug, Error)]
#[error("at byte {position}: {kind}")]
pub struct ParseError {
    pub position: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(position: usize, kind: ParseErrorKind) -> ParseError {
        ParseError { position, kind }
    }
}

#[derive(Debug, Error)]
pub enum ParseErrorKind {
    #[error("malformed markup: {0}")]
    Markup(#[from] quick_xml::Error),
    #[error("invalid document element '{0}'")]
    InvalidDocumentElement(String),
    #[error("missing config file format version")]
    MissingVersion,
    #[error("monitors.xml has the old format")]
    LegacyFormat,
    #[error("invalid or unsupported version '{0}'")]
    UnsupportedVersion(String),
    #[error("invalid element '{element}' under <{parent}>")]
    UnexpectedElement { element: String, parent: &'static str },
    #[error("multiple <{element}> elements under <{parent}>")]
    Duplicate { element: &'static str, parent: &'static str },
    #[error("unexpected content '{text}' under <{parent}>")]
    UnexpectedContent { text: String, parent: &'static str },
    #[error("invalid <{element}> value '{value}': {reason}")]
    InvalidValue {
        element: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("incomplete <{0}>")]
    Incomplete(&'static str),
    #[error("policy can only be defined in system level configurations")]
    PolicyNotAllowed,
    #[error("multiple policy definitions")]
    MultiplePolicies,
    #[error("got an empty store")]
    EmptyStore,
    #[error("multiple identical stores in policy")]
    DuplicateStore,
    #[error("unexpected end of document")]
    UnexpectedEof,
}

/// Geometry or identity rule violations of a single configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("monitors config has no logical monitors")]
    Empty,
    #[error("logical monitor is empty")]
    EmptyLogicalMonitor,
    #[error("invalid logical monitor position ({x}, {y})")]
    NegativePosition { x: i32, y: i32 },
    #[error("monitor modes in logical monitor not equal")]
    MismatchedModes,
    #[error("scaled logical monitor size is fractional")]
    FractionalSize,
    #[error("a fractional scale with physical layout mode not allowed")]
    FractionalScale,
    #[error("logical monitor scale '{0}' invalid")]
    InvalidScale(f32),
    #[error("monitor mode size doesn't match scaled monitor layout")]
    SizeMismatch,
    #[error("monitor '{0}' appears more than once")]
    DuplicateMonitor(String),
    #[error("logical monitors overlap")]
    Overlap,
    #[error("logical monitors not adjacent")]
    NotAdjacent,
    #[error("config has multiple primary logical monitors")]
    MultiplePrimary,
    #[error("logical monitor positions are offset")]
    Offset,
    #[error("assigned monitor '{0}' explicitly disabled")]
    DisabledMonitorEnabled(String),
    #[error("for lease monitor '{0}' must be explicitly disabled")]
    ForLeaseNotDisabled(String),
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("neither physical nor logical layout could be derived (physical: {physical}; logical: {logical})")]
    NoValidLayout {
        physical: ValidationError,
        logical: ValidationError,
    },
}

/// Why a configuration was dropped from an otherwise readable document.
#[derive(Debug, Error)]
pub enum ConfigRejection {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("write superseded by a newer one")]
    Cancelled,
}

/// Errors surfaced by the config store to its callers.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read monitors config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse monitors config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
}
