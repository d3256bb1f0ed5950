use std::path::PathBuf;

pub type DecryptResult<T> = Result<T, DecryptError>;

#[derive(thiserror::Error, Debug)]
pub enum DecryptError {
    #[error("malformed hash: {0}")]
    MalformedHash(String),

    #[error("manifest missing for layer '{0}'")]
    ManifestMissing(String),

    #[error("channel pattern mismatch: {0}")]
    ChannelPatternMismatch(String),

    #[error("dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("failed to open image '{}': {message}", path.display())]
    ImageOpenFailed { path: PathBuf, message: String },

    #[error("failed to write image '{}': {message}", path.display())]
    ImageWriteFailed { path: PathBuf, message: String },

    #[error("unknown cryptomatte layer '{0}'")]
    UnknownLayer(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DecryptError {
    pub fn malformed_hash(msg: impl Into<String>) -> Self {
        Self::MalformedHash(msg.into())
    }

    pub fn channel_mismatch(msg: impl Into<String>) -> Self {
        Self::ChannelPatternMismatch(msg.into())
    }

    pub fn dimension_mismatch(expected: (u32, u32), actual: (u32, u32)) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    pub fn open_failed(path: impl Into<PathBuf>, msg: impl ToString) -> Self {
        Self::ImageOpenFailed {
            path: path.into(),
            message: msg.to_string(),
        }
    }

    pub fn write_failed(path: impl Into<PathBuf>, msg: impl ToString) -> Self {
        Self::ImageWriteFailed {
            path: path.into(),
            message: msg.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
