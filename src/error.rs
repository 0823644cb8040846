//! Error kinds callers need to tell apart.
//!
//! Applicability rejections, type-check rejections, and cost overruns are not
//! errors; they surface as `bool`/sentinel returns at the call sites.
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required setting is missing or invalid. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A corpus directory or transform document could not be used.
    #[error("corpus {}: {message}", path.display())]
    Corpus { path: PathBuf, message: String },

    /// A declared or deserialized transform violates a schema invariant.
    #[error("invalid transform: {0}")]
    InvalidTransform(String),

    /// Scoring a stack frame failed; the whole localization pass is void.
    #[error("localization failed while {context}")]
    Localization {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn corpus(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Corpus {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn localization(context: impl Into<String>, source: anyhow::Error) -> Self {
        Error::Localization {
            context: context.into(),
            source: source.into(),
        }
    }
}
