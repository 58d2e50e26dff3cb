//! Error taxonomy for the executor.
//!
//! Only infrastructure faults live here. A program that exits non-zero,
//! or a block in a language the policy does not know, is reported
//! inside [`BatchResult`](crate::executor::BatchResult) instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Empty batch, missing destination directory, bad configuration.
    /// Raised before any remote call is made.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Creating (or re-creating) a sandbox failed: auth, quota, network.
    #[error("sandbox provisioning failed: {0}")]
    SandboxProvision(String),

    /// A file operation against the sandbox failed. Also raised for any
    /// operation on a session that has been stopped.
    #[error("sandbox I/O error on {path}: {reason}")]
    SandboxIo { path: String, reason: String },

    /// The command transport broke before an exit status was received.
    #[error("sandbox command failed: {0}")]
    SandboxCommand(String),

    /// Writing a synchronized file to the local directory failed.
    #[error("local I/O error: {0}")]
    LocalIo(#[from] std::io::Error),
}

impl ExecutorError {
    pub(crate) fn io(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::SandboxIo {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true when the remote side can no longer be trusted and the
    /// caller should `restart()` the executor before the next batch.
    pub fn needs_restart(&self) -> bool {
        matches!(
            self,
            Self::SandboxProvision(_) | Self::SandboxIo { .. } | Self::SandboxCommand(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ExecutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_restart_for_infrastructure_faults() {
        assert!(ExecutorError::SandboxProvision("quota".into()).needs_restart());
        assert!(ExecutorError::io("/home/user/a.py", "stale handle").needs_restart());
        assert!(ExecutorError::SandboxCommand("stream closed".into()).needs_restart());
    }

    #[test]
    fn test_caller_errors_do_not_need_restart() {
        assert!(!ExecutorError::InvalidArgument("empty".into()).needs_restart());
        let local = ExecutorError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(!local.needs_restart());
    }

    #[test]
    fn test_display_includes_path() {
        let err = ExecutorError::io("/home/user/out.csv", "not found");
        assert_eq!(
            err.to_string(),
            "sandbox I/O error on /home/user/out.csv: not found"
        );
    }
}
