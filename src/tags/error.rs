use lofty::error::LoftyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TagError {
    #[error("unsupported audio format: {filename}")]
    UnsupportedFormat { filename: String },

    #[error("could not process tags of {filename}: {source}")]
    Malformed {
        filename: String,
        #[source]
        source: LoftyError,
    },

    #[error("{filename} is not a well-formed stream: {reason}")]
    Corrupt {
        filename: String,
        reason: &'static str,
    },

    #[error("i/o error while processing tags: {0}")]
    Io(#[from] std::io::Error),
}
