//! Error types for container parsing and image-graph resolution

use alloc::string::String;
use core::fmt;
use enough::StopReason;
use whereat::At;

/// Result type for container operations, with error location tracking.
///
/// Errors carry a trace of where they were created and propagated,
/// accessible via [`At::full_trace()`] or [`At::last_error_trace()`].
pub type Result<T> = core::result::Result<T, At<HeifError>>;

/// Errors that can occur while parsing, writing, or interpreting a container
#[derive(Debug)]
#[non_exhaustive]
pub enum HeifError {
    /// Fewer bytes remain than a read required
    Truncated(&'static str),
    /// A box's declared size is inconsistent with its header or parent bounds
    InvalidBoxSize(&'static str),
    /// A fixed security ceiling was breached (nesting, counts, byte sizes)
    LimitExceeded(&'static str),
    /// Malformed field content
    InvalidData(&'static str),
    /// A colr box carries a profile tag other than nclx/prof/rICC
    UnknownColorProfile,
    /// A clap fraction is out of range or has a zero denominator
    InvalidFraction(&'static str),
    /// A reference edge points at an item id with no backing item
    NonexistentItem(u32),
    /// An item references itself, directly or through a derivation cycle
    RecursiveReference(u32),
    /// An item lacks a property its type requires (e.g. hvc1 without hvcC)
    MissingProperty(&'static str),
    /// Recognized but not implemented feature
    Unsupported(&'static str),
    /// The pitm box is absent or names an id with no backing item
    NoPrimaryItem,
    /// A registered codec plugin failed to decode an item payload
    Codec(String),
    /// Operation was cancelled via cooperative cancellation
    Cancelled(StopReason),
}

impl fmt::Display for HeifError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated(msg) => write!(f, "truncated input: {msg}"),
            Self::InvalidBoxSize(msg) => write!(f, "invalid box size: {msg}"),
            Self::LimitExceeded(msg) => write!(f, "security limit exceeded: {msg}"),
            Self::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Self::UnknownColorProfile => write!(f, "unknown color profile type"),
            Self::InvalidFraction(msg) => write!(f, "invalid fractional number: {msg}"),
            Self::NonexistentItem(id) => write!(f, "reference to nonexistent item {id}"),
            Self::RecursiveReference(id) => write!(f, "recursive reference involving item {id}"),
            Self::MissingProperty(msg) => write!(f, "missing required property: {msg}"),
            Self::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            Self::NoPrimaryItem => write!(f, "no or invalid primary item"),
            Self::Codec(msg) => write!(f, "codec error: {msg}"),
            Self::Cancelled(reason) => write!(f, "{reason}"),
        }
    }
}

impl core::error::Error for HeifError {}

impl From<StopReason> for HeifError {
    fn from(r: StopReason) -> Self {
        Self::Cancelled(r)
    }
}

/// Check a `Stop` token and convert to `At<HeifError>` on cancellation.
#[track_caller]
pub(crate) fn check_stop(stop: &dyn enough::Stop) -> Result<()> {
    stop.check().map_err(|r| At::from(HeifError::Cancelled(r)))
}
