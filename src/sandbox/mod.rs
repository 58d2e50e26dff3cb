//! Remote execution sandbox.
//!
//! The executor only talks to [`SandboxSession`]. The session owns one
//! [`SandboxHandle`] and delegates every remote call to a
//! [`SandboxProvider`] adapter, so the batch logic never sees
//! provider-specific result shapes.
//!
//! Isolation itself is the provider's job: this module only manages the
//! lifecycle of the remote environment and moves bytes in and out of it.

pub mod credentials;
pub mod http;
pub mod observer;
pub mod session;

#[cfg(test)]
pub(crate) mod fake;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

pub use credentials::{CredentialSource, KeyPool, StaticCredential};
pub use http::HttpSandboxProvider;
pub use observer::{CollectingObserver, NullObserver, OutputObserver, TracingObserver};
pub use session::SandboxSession;

/// Identity of one provisioned remote environment.
///
/// Only a [`SandboxSession`] creates or destroys these. After a restart
/// the old handle is gone for good; nothing keeps a copy of it.
#[derive(Clone)]
pub struct SandboxHandle {
    pub id: String,
    /// Fixed root for every file the executor writes.
    pub working_dir: String,
    pub created_at: DateTime<Utc>,
    /// Credential the sandbox was provisioned with; later calls reuse it.
    pub(crate) api_key: String,
}

impl SandboxHandle {
    pub fn new(id: String, working_dir: String, api_key: String) -> Self {
        Self {
            id,
            working_dir,
            created_at: Utc::now(),
            api_key,
        }
    }

    /// Joins a derived filename onto the working directory.
    pub fn path_for(&self, filename: &str) -> String {
        format!("{}/{}", self.working_dir.trim_end_matches('/'), filename)
    }
}

impl fmt::Debug for SandboxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxHandle")
            .field("id", &self.id)
            .field("working_dir", &self.working_dir)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// What a sandbox needs at creation time.
#[derive(Clone, Default)]
pub struct SandboxSpec {
    pub template: String,
    /// Used when the provider does not report a working directory.
    pub working_dir: String,
    /// Environment variables set for every command in the sandbox.
    pub envs: HashMap<String, String>,
}

// Env values are often credentials; only their names are printed.
impl fmt::Debug for SandboxSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.envs.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("SandboxSpec")
            .field("template", &self.template)
            .field("working_dir", &self.working_dir)
            .field("envs", &names)
            .finish()
    }
}

/// Fully materialized outcome of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// The provider flagged the run as failed; stderr is the useful stream.
    pub errored: bool,
}

impl CommandResult {
    pub fn timed_out(&self) -> bool {
        self.exit_code == crate::command::TIMEOUT_EXIT_CODE
    }

    /// The stream worth reporting for this run.
    pub fn captured_output(&self) -> &str {
        if self.errored {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileEntry {
    pub name: String,
    pub is_directory: bool,
}

/// Adapter over one sandbox provider's API.
///
/// Implementations translate provider responses into the types above
/// and map failures onto [`ExecutorError`](crate::error::ExecutorError):
/// provisioning failures to `SandboxProvision`, file failures to
/// `SandboxIo`, broken command transport to `SandboxCommand`.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Provisions a fresh environment.
    async fn create(&self, spec: &SandboxSpec, api_key: &str) -> Result<SandboxHandle>;

    /// Uploads `content` to `path`, creating parent directories.
    async fn write_file(&self, handle: &SandboxHandle, path: &str, content: &[u8]) -> Result<()>;

    /// Runs `command` to completion, feeding output lines to `observer`
    /// as they arrive. Providers without streaming replay them at the end.
    async fn run_command(
        &self,
        handle: &SandboxHandle,
        command: &str,
        observer: &dyn OutputObserver,
    ) -> Result<CommandResult>;

    /// Non-recursive listing.
    async fn list_directory(&self, handle: &SandboxHandle, path: &str)
        -> Result<Vec<RemoteFileEntry>>;

    async fn read_file(&self, handle: &SandboxHandle, path: &str) -> Result<Vec<u8>>;

    /// Tears the environment down. Destroying an already-gone sandbox
    /// must succeed.
    async fn destroy(&self, handle: &SandboxHandle) -> Result<()>;

    /// The provider name (e.g. `"http"`).
    fn provider_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_for_joins_working_dir() {
        let handle = SandboxHandle::new("sb-1".into(), "/home/user".into(), "k".into());
        assert_eq!(handle.path_for("a.py"), "/home/user/a.py");

        let trailing = SandboxHandle::new("sb-1".into(), "/home/user/".into(), "k".into());
        assert_eq!(trailing.path_for("a.py"), "/home/user/a.py");
    }

    #[test]
    fn test_handle_debug_hides_api_key() {
        let handle = SandboxHandle::new("sb-1".into(), "/home/user".into(), "secret-key".into());
        let debug = format!("{handle:?}");
        assert!(debug.contains("sb-1"));
        assert!(!debug.contains("secret-key"));
    }

    #[test]
    fn test_spec_debug_hides_env_values() {
        let spec = SandboxSpec {
            template: "base".into(),
            working_dir: "/home/user".into(),
            envs: HashMap::from([("OPENAI_API_KEY".to_string(), "sk-secret".to_string())]),
        };
        let debug = format!("{spec:?}");
        assert!(debug.contains("OPENAI_API_KEY"));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn test_captured_output_picks_stream() {
        let ok = CommandResult {
            exit_code: 0,
            stdout: "out".into(),
            stderr: "warn".into(),
            errored: false,
        };
        assert_eq!(ok.captured_output(), "out");

        let failed = CommandResult {
            errored: true,
            ..ok
        };
        assert_eq!(failed.captured_output(), "warn");
    }

    #[test]
    fn test_timed_out() {
        let result = CommandResult {
            exit_code: 124,
            ..Default::default()
        };
        assert!(result.timed_out());
        assert!(!CommandResult::default().timed_out());
    }

    #[test]
    fn test_provider_is_object_safe() {
        fn _assert_object_safe(_: &dyn SandboxProvider) {}
    }
}
