use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    /// Invalid or missing setting. The run never leaves Idle.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required visual asset is unavailable.
    #[error("resource error: {0}")]
    Resource(String),

    /// A trigger input channel is unusable. Non-fatal: the channel is disabled.
    #[error("trigger channel {channel} unavailable: {reason}")]
    Channel { channel: String, reason: String },

    /// The presentation surface failed while the run was in progress.
    #[error("display error: {0}")]
    Display(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl TaskError {
    pub fn channel(channel: impl Into<String>, reason: impl ToString) -> Self {
        TaskError::Channel {
            channel: channel.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the run can continue after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TaskError::Channel { .. })
    }
}
