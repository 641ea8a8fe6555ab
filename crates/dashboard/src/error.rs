use thiserror::Error;

/// Failure of a dashboard action.
///
/// Each variant maps to one way an action can fail: rejected before any request,
/// rejected in transit, rejected by the server, or impossible because the view lacks
/// controls the action needs.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("server unreachable: {0}")]
    Transport(String),

    #[error("{0}")]
    Server(String),

    #[error("missing view controls: {}", .0.join(", "))]
    MissingControls(Vec<String>),

    #[error("{0}")]
    Unsupported(String),

    #[error("action cancelled")]
    Cancelled,
}

impl DashboardError {
    pub fn validation(err: impl std::fmt::Display) -> Self {
        Self::Validation(err.to_string())
    }

    /// Whether the request never reached the server.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            DashboardError::Validation(_)
                | DashboardError::MissingControls(_)
                | DashboardError::Unsupported(_)
                | DashboardError::Cancelled
        )
    }
}

impl From<anyhow::Error> for DashboardError {
    fn from(value: anyhow::Error) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<reqwest::Error> for DashboardError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

pub type Result<T, E = DashboardError> = std::result::Result<T, E>;
