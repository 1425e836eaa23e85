use thiserror::Error;

use crate::catalog::{MaterialId, Technology};

/// Failure of a remote call. Always transient from the client's point of view:
/// prior state stays intact and the user may retry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

/// A selection the catalog does not allow. Rejected without touching state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("unknown technology `{0}`")]
    UnknownTechnology(String),

    #[error("unknown material `{0}`")]
    UnknownMaterial(String),

    #[error("{material} is not offered for {technology}")]
    MaterialNotOffered {
        material: MaterialId,
        technology: Technology,
    },

    #[error("infill {0}% is outside the preset domain")]
    InfillOutOfDomain(u8),
}

/// Commit refused before any network call was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommitError {
    #[error("no file loaded")]
    NoFile,

    #[error("no price computed yet")]
    ZeroPrice,

    #[error("a price computation is still running")]
    Computing,

    #[error("the price shown was computed for a different configuration")]
    StaleQuote,

    #[error("a cart submission is already in flight")]
    InFlight,
}

/// The transient display handle for an uploaded file could not be created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not create display handle: {0}")]
pub struct HandleError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A transient message for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, text: text.into() }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Warning, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, text: text.into() }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}
