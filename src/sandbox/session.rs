//! Lifecycle of one remote sandbox.
//!
//! `create` → Active → (`stop`) → Destroyed → (`restart`) → Active.
//! Batches leave their files behind in the working directory; nothing
//! is rolled back between them.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::{
    CommandResult, CredentialSource, NullObserver, OutputObserver, RemoteFileEntry, SandboxHandle,
    SandboxProvider, SandboxSpec,
};
use crate::error::{ExecutorError, Result};

enum SessionState {
    Active(SandboxHandle),
    Destroyed,
}

pub struct SandboxSession {
    provider: Arc<dyn SandboxProvider>,
    credentials: Arc<dyn CredentialSource>,
    spec: SandboxSpec,
    state: SessionState,
}

impl SandboxSession {
    /// Provisions a sandbox and returns an active session.
    pub async fn create(
        provider: Arc<dyn SandboxProvider>,
        credentials: Arc<dyn CredentialSource>,
        spec: SandboxSpec,
    ) -> Result<Self> {
        let handle = provision(provider.as_ref(), credentials.as_ref(), &spec).await?;
        Ok(Self {
            provider,
            credentials,
            spec,
            state: SessionState::Active(handle),
        })
    }

    /// The current handle, or `SandboxIo` once the session is stopped.
    pub fn handle(&self) -> Result<&SandboxHandle> {
        match &self.state {
            SessionState::Active(handle) => Ok(handle),
            SessionState::Destroyed => Err(ExecutorError::io(
                self.spec.working_dir.as_str(),
                "sandbox session has been stopped",
            )),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active(_))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub async fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let handle = self.handle()?;
        self.provider.write_file(handle, path, content).await
    }

    /// Runs a command to completion. Lines go to `observer` as they
    /// arrive; the returned result always carries the full streams.
    pub async fn run_command(
        &self,
        command: &str,
        observer: Option<&dyn OutputObserver>,
    ) -> Result<CommandResult> {
        let handle = self.handle()?;
        self.provider
            .run_command(handle, command, observer.unwrap_or(&NullObserver))
            .await
    }

    pub async fn list_directory(&self, path: &str) -> Result<Vec<RemoteFileEntry>> {
        let handle = self.handle()?;
        self.provider.list_directory(handle, path).await
    }

    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let handle = self.handle()?;
        self.provider.read_file(handle, path).await
    }

    /// Best-effort teardown. Safe to call any number of times; provider
    /// errors are logged and swallowed.
    pub async fn stop(&mut self) {
        let SessionState::Active(handle) =
            std::mem::replace(&mut self.state, SessionState::Destroyed)
        else {
            return;
        };

        let uptime = Utc::now() - handle.created_at;
        info!(
            "Stopping sandbox {} (up {}s)",
            handle.id,
            uptime.num_seconds()
        );
        if let Err(e) = self.provider.destroy(&handle).await {
            warn!("Failed to destroy sandbox {}: {e}", handle.id);
        }
    }

    /// Tears down the current sandbox and provisions a new one. On
    /// failure the session stays stopped.
    pub async fn restart(&mut self) -> Result<()> {
        info!("Restarting sandbox session...");
        self.stop().await;
        let handle = provision(
            self.provider.as_ref(),
            self.credentials.as_ref(),
            &self.spec,
        )
        .await?;
        self.state = SessionState::Active(handle);
        info!("Sandbox restarted");
        Ok(())
    }
}

async fn provision(
    provider: &dyn SandboxProvider,
    credentials: &dyn CredentialSource,
    spec: &SandboxSpec,
) -> Result<SandboxHandle> {
    let api_key = credentials.api_key()?;
    let handle = provider.create(spec, &api_key).await?;
    info!(
        "Provisioned sandbox {} via {} (template: {}, working dir: {})",
        handle.id,
        provider.provider_name(),
        spec.template,
        handle.working_dir
    );
    Ok(handle)
}
