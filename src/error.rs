use thiserror::Error;

/// Everything that can go wrong between the widget and the chat backend.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("could not decode backend payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("image did not decode: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),

    #[error("backend reported failure{}", .0.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Application(Option<String>),
}

/// How a failure is surfaced in the transcript. Both kinds produce a single apology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    Application,
}

impl FailureKind {
    pub fn apology(self) -> &'static str {
        match self {
            FailureKind::Transport => {
                "Sorry, I could not process your request. Please try again later."
            }
            FailureKind::Application => "Sorry, I encountered an error. Please try again.",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::Application => "application",
        }
    }
}

impl ChatError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ChatError::Application(_) => FailureKind::Application,
            _ => FailureKind::Transport,
        }
    }
}
