use std::path::PathBuf;

/// Errors raised while validating settings, clips, or rendering videos.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to load font '{path}': {message}")]
    Font { path: PathBuf, message: String },

    #[error("Clip {index} has no keyframes")]
    EmptyClip { index: usize },

    #[error("Clip {index} is invalid: {reason}")]
    InvalidClip { index: usize, reason: String },

    #[error("Failed to encode frame {frame}: {message}")]
    Encode { frame: usize, message: String },

    #[error("Render cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type RenderResult<T> = Result<T, RenderError>;

impl RenderError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn invalid_clip(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidClip {
            index,
            reason: reason.into(),
        }
    }

    /// Errors shared by every clip of a batch. Retrying the next clip would fail the same way.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RenderError::Config { .. } | RenderError::Font { .. } | RenderError::Cancelled
        )
    }
}
