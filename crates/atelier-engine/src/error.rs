use thiserror::Error;

/// Rejections raised before anything is sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("select an aspect ratio first")]
    MissingAspectRatio,
    #[error("enter a prompt or upload a character or reference image")]
    MissingSubject,
    #[error("enter a video prompt")]
    MissingVideoPrompt,
    #[error("select a video aspect ratio first")]
    MissingVideoAspectRatio,
    #[error("upload an image first")]
    MissingImage,
    #[error("there are no video settings to regenerate")]
    NothingToRegenerate,
    #[error("there are no video settings to restore")]
    NothingToRestore,
    #[error("enter a prompt first")]
    EmptyPrompt,
    #[error("only structured scene results can be upgraded")]
    NotStructuredPrompt,
}

#[derive(Debug, Error)]
pub enum StudioError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("another operation is already running")]
    Busy,
    #[error("backend request failed: {0:#}")]
    Backend(anyhow::Error),
    #[error("all {attempted} scenes failed")]
    TotalBatchFailure { attempted: usize },
    #[error("no history item with id '{0}'")]
    UnknownHistoryItem(String),
    #[error("image processing failed: {0:#}")]
    Imaging(anyhow::Error),
}

impl StudioError {
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input(_))
    }
}

pub type StudioResult<T> = Result<T, StudioError>;
