//! Batch execution of code blocks inside one sandbox.
//!
//! Blocks run strictly in order, each as its own script file in the
//! sandbox working directory. Program failures (non-zero exits, unknown
//! languages) end up in the returned [`BatchResult`]; only sandbox
//! infrastructure faults are returned as errors.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::command::{silence_pip, CommandBuilder, TIMEOUT_MSG};
use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, Result};
use crate::filename::derive_filename;
use crate::policy::{LanguagePolicy, Support};
use crate::sandbox::{OutputObserver, SandboxSession, TracingObserver};
use crate::sync::{ensure_local_dir, sync_files};

/// Exit code reported when a batch is aborted on an unsupported language.
pub const UNSUPPORTED_EXIT_CODE: i32 = 1;

/// One snippet as produced by the code extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
}

impl CodeBlock {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// Last executed block's exit code, or 1 if the batch was aborted.
    pub exit_code: i32,
    /// Captured output of every block, in order, plus diagnostics.
    pub combined_output: String,
    /// First synchronized file, if any.
    pub primary_file: Option<PathBuf>,
    /// Every file synchronized after the batch.
    pub files: Vec<PathBuf>,
}

/// Runs batches of code blocks in a remote sandbox.
///
/// Methods that touch the sandbox take `&mut self`, so a single executor
/// can never have two batches in flight.
pub struct CodeExecutor {
    session: SandboxSession,
    policy: LanguagePolicy,
    commands: CommandBuilder,
    local_dir: PathBuf,
    observer: Arc<dyn OutputObserver>,
}

impl CodeExecutor {
    /// Wraps an already provisioned session.
    pub fn new(session: SandboxSession, config: &ExecutorConfig) -> Self {
        Self {
            session,
            policy: LanguagePolicy::with_overrides(
                &config.execution_policy,
                &config.language_aliases,
            ),
            commands: CommandBuilder::new(config.timeout_secs, &config.powershell),
            local_dir: config.local_dir.clone(),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replaces the live output observer (default: [`TracingObserver`]).
    pub fn with_observer(mut self, observer: Arc<dyn OutputObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn session(&self) -> &SandboxSession {
        &self.session
    }

    pub fn policy(&self) -> &LanguagePolicy {
        &self.policy
    }

    /// Per-instance policy overrides.
    pub fn policy_mut(&mut self) -> &mut LanguagePolicy {
        &mut self.policy
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    /// Runs `blocks` in order and syncs the sandbox's files afterwards.
    ///
    /// The first block in a language absent from the policy aborts the
    /// rest of the batch with exit code 1. File synchronization runs
    /// whatever happened; if a block failed at the infrastructure level
    /// that error is returned once the sync attempt is over.
    pub async fn execute_code_blocks(&mut self, blocks: &[CodeBlock]) -> Result<BatchResult> {
        if blocks.is_empty() {
            return Err(ExecutorError::InvalidArgument(
                "No code blocks to execute.".into(),
            ));
        }
        ensure_local_dir(&self.local_dir).await?;

        info!(
            "Executing {} code block(s) in sandbox {}",
            blocks.len(),
            self.session.handle()?.id
        );

        let mut output = String::new();
        let outcome = self.run_blocks(blocks, &mut output).await;
        let synced = sync_files(&self.session, &self.local_dir).await;

        let exit_code = match outcome {
            Ok(code) => code,
            Err(e) => {
                if let Err(sync_err) = synced {
                    warn!("File sync after failed batch also failed: {sync_err}");
                }
                return Err(e);
            }
        };
        let files = synced?;

        info!("Batch finished with exit code {exit_code}");
        Ok(BatchResult {
            exit_code,
            combined_output: output,
            primary_file: files.first().cloned(),
            files,
        })
    }

    /// The per-block loop. Returns the batch exit code.
    async fn run_blocks(&self, blocks: &[CodeBlock], output: &mut String) -> Result<i32> {
        let mut exit_code = 0;

        for (index, block) in blocks.iter().enumerate() {
            let language = self.policy.resolve(&block.language);

            // An enabled language with no interpreter (html, css) cannot run either
            let no_interpreter = language.support == Support::Allowed
                && self.commands.interpreter(&language.name).is_none();
            if language.support == Support::Unsupported || no_interpreter {
                warn!(
                    "Block {index}: unsupported language {:?}, aborting batch",
                    language.name
                );
                output.push_str(&format!("Unsupported language {}\n", language.name));
                exit_code = UNSUPPORTED_EXIT_CODE;
                break;
            }

            let code = silence_pip(&block.code, &language.name);
            let filename = derive_filename(&code, &language.name);
            let path = self.session.handle()?.path_for(&filename);

            let command = match language.support {
                Support::Allowed => self.commands.build_shell(&language.name, &path),
                _ => None,
            };

            self.session.write_file(&path, code.as_bytes()).await?;

            let Some(command) = command else {
                debug!("Block {index}: {} is disabled, saved to {path}", language.name);
                output.push_str(&format!("Code saved to {path}\n"));
                continue;
            };
            debug!("Block {index}: running {command}");

            let result = self
                .session
                .run_command(&command, Some(self.observer.as_ref()))
                .await?;

            output.push_str(result.captured_output());
            if result.timed_out() {
                warn!(
                    "Block {index} timed out after {}s",
                    self.commands.timeout_secs()
                );
                output.push_str(TIMEOUT_MSG);
                output.push('\n');
            }
            debug!("Block {index} exited with {}", result.exit_code);
            exit_code = result.exit_code;
        }

        Ok(exit_code)
    }

    /// Tears down the sandbox. Idempotent.
    pub async fn stop(&mut self) {
        info!("Stopping the sandbox code executor...");
        self.session.stop().await;
    }

    /// Replaces the sandbox with a freshly provisioned one.
    pub async fn restart(&mut self) -> Result<()> {
        info!("Restarting the sandbox code executor...");
        self.session.restart().await
    }
}
