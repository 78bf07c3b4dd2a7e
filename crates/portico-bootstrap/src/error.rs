//! Error types for the shell bootstrap.

use std::time::Duration;

/// Bootstrap errors.
///
/// Shell assembly failures are logged and folded into
/// [`MountOutcome::Skipped`](crate::MountOutcome::Skipped); only application
/// start-up and orchestration errors reach the caller of
/// [`BootstrapOrchestrator::run`](crate::BootstrapOrchestrator::run).
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Layout provider could not be reached or answered with an error status.
    #[error("layout fetch failed: {message}")]
    LayoutFetch { message: String },

    /// Layout provider did not answer within the configured bound.
    #[error("layout fetch timed out after {after:?}")]
    LayoutTimeout { after: Duration },

    /// Layout provider answered with a body that is not layout data.
    #[error("invalid layout data: {message}")]
    InvalidLayout { message: String },

    /// Document tree operation rejected.
    #[error("document error: {message}")]
    Document { message: String },

    /// Main application failed to initialize.
    #[error("application init failed: {source}")]
    AppInit {
        #[source]
        source: anyhow::Error,
    },

    /// The orchestrator already ran for this page load.
    #[error("bootstrap already started")]
    AlreadyStarted,

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl BootstrapError {
    /// Whether the error concerns the optional shell rather than the application.
    pub fn is_shell_failure(&self) -> bool {
        matches!(
            self,
            Self::LayoutFetch { .. }
                | Self::LayoutTimeout { .. }
                | Self::InvalidLayout { .. }
                | Self::Document { .. }
        )
    }
}

impl From<reqwest::Error> for BootstrapError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidLayout {
                message: err.to_string(),
            }
        } else {
            Self::LayoutFetch {
                message: err.to_string(),
            }
        }
    }
}

/// Result type for bootstrap operations.
pub type BootstrapResult<T> = Result<T, BootstrapError>;
