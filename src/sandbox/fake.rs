//! In-memory provider for tests. Records every call it receives.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    CommandResult, OutputObserver, RemoteFileEntry, SandboxHandle, SandboxProvider, SandboxSpec,
};
use crate::error::{ExecutorError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Create,
    Write(String),
    Run(String),
    List(String),
    Read(String),
    Destroy(String),
}

#[derive(Default)]
struct State {
    next_id: u32,
    live: HashSet<String>,
    /// Full path → contents of the live sandbox. Wiped on destroy.
    files: BTreeMap<String, Vec<u8>>,
    /// Listing entries that are not backed by a written file.
    extra_entries: Vec<RemoteFileEntry>,
    results: VecDeque<CommandResult>,
    /// Files a command "produces" when it runs, in order.
    produced: VecDeque<Vec<(String, Vec<u8>)>>,
    calls: Vec<Call>,
    fail_create: bool,
    fail_destroy: bool,
    /// Commands left to run successfully before one fails.
    fail_command_after: Option<usize>,
}

pub(crate) struct FakeProvider {
    state: Mutex<State>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }

    /// Number of calls that touched a sandbox (anything but `Create`).
    pub fn remote_calls(&self) -> usize {
        self.with(|s| s.calls.iter().filter(|c| **c != Call::Create).count())
    }

    pub fn runs(&self) -> Vec<String> {
        self.with(|s| {
            s.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Run(cmd) => Some(cmd.clone()),
                    _ => None,
                })
                .collect()
        })
    }

    pub fn writes(&self) -> Vec<String> {
        self.with(|s| {
            s.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Write(path) => Some(path.clone()),
                    _ => None,
                })
                .collect()
        })
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.with(|s| s.files.get(path).cloned())
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.with(|s| s.live.contains(id))
    }

    /// Queues the result of the next `run_command`. Unscripted runs
    /// succeed with empty output.
    pub fn push_result(&self, result: CommandResult) {
        self.with(|s| s.results.push_back(result));
    }

    pub fn push_exit(&self, exit_code: i32, stdout: &str) {
        self.push_result(CommandResult {
            exit_code,
            stdout: stdout.to_string(),
            stderr: String::new(),
            errored: false,
        });
    }

    /// Files the next command writes into the sandbox.
    pub fn produce_on_next_run(&self, files: Vec<(&str, &[u8])>) {
        let files = files
            .into_iter()
            .map(|(path, data)| (path.to_string(), data.to_vec()))
            .collect();
        self.with(|s| s.produced.push_back(files));
    }

    pub fn add_entry(&self, name: &str, is_directory: bool) {
        self.with(|s| {
            s.extra_entries.push(RemoteFileEntry {
                name: name.to_string(),
                is_directory,
            })
        });
    }

    pub fn fail_next_create(&self) {
        self.with(|s| s.fail_create = true);
    }

    pub fn fail_next_destroy(&self) {
        self.with(|s| s.fail_destroy = true);
    }

    pub fn fail_next_command(&self) {
        self.fail_command_after(0);
    }

    /// Lets `successes` commands complete, then fails the next one.
    pub fn fail_command_after(&self, successes: usize) {
        self.with(|s| s.fail_command_after = Some(successes));
    }

    fn require_live(state: &State, handle: &SandboxHandle, path: &str) -> Result<()> {
        if state.live.contains(&handle.id) {
            Ok(())
        } else {
            Err(ExecutorError::io(path, format!("stale handle {}", handle.id)))
        }
    }
}

#[async_trait]
impl SandboxProvider for FakeProvider {
    async fn create(&self, spec: &SandboxSpec, api_key: &str) -> Result<SandboxHandle> {
        self.with(|s| {
            s.calls.push(Call::Create);
            if std::mem::take(&mut s.fail_create) {
                return Err(ExecutorError::SandboxProvision("quota exceeded".into()));
            }
            s.next_id += 1;
            let id = format!("fake-{}", s.next_id);
            s.live.insert(id.clone());
            Ok(SandboxHandle::new(id, spec.working_dir.clone(), api_key.to_string()))
        })
    }

    async fn write_file(&self, handle: &SandboxHandle, path: &str, content: &[u8]) -> Result<()> {
        self.with(|s| {
            s.calls.push(Call::Write(path.to_string()));
            Self::require_live(s, handle, path)?;
            s.files.insert(path.to_string(), content.to_vec());
            Ok(())
        })
    }

    async fn run_command(
        &self,
        handle: &SandboxHandle,
        command: &str,
        observer: &dyn OutputObserver,
    ) -> Result<CommandResult> {
        let result = self.with(|s| {
            s.calls.push(Call::Run(command.to_string()));
            let injected = match s.fail_command_after {
                Some(0) => {
                    s.fail_command_after = None;
                    true
                }
                Some(n) => {
                    s.fail_command_after = Some(n - 1);
                    false
                }
                None => false,
            };
            if !s.live.contains(&handle.id) || injected {
                return Err(ExecutorError::SandboxCommand("connection reset".into()));
            }
            if let Some(files) = s.produced.pop_front() {
                s.files.extend(files);
            }
            Ok(s.results.pop_front().unwrap_or_default())
        })?;

        for line in result.stdout.lines() {
            observer.on_stdout(line);
        }
        for line in result.stderr.lines() {
            observer.on_stderr(line);
        }
        Ok(result)
    }

    async fn list_directory(
        &self,
        handle: &SandboxHandle,
        path: &str,
    ) -> Result<Vec<RemoteFileEntry>> {
        self.with(|s| {
            s.calls.push(Call::List(path.to_string()));
            Self::require_live(s, handle, path)?;

            let prefix = format!("{}/", path.trim_end_matches('/'));
            let mut entries: Vec<RemoteFileEntry> = Vec::new();
            for full in s.files.keys() {
                let Some(rest) = full.strip_prefix(&prefix) else {
                    continue;
                };
                let (name, is_directory) = match rest.split_once('/') {
                    Some((dir, _)) => (dir, true),
                    None => (rest, false),
                };
                if !entries.iter().any(|e| e.name == name) {
                    entries.push(RemoteFileEntry {
                        name: name.to_string(),
                        is_directory,
                    });
                }
            }
            entries.extend(s.extra_entries.iter().cloned());
            Ok(entries)
        })
    }

    async fn read_file(&self, handle: &SandboxHandle, path: &str) -> Result<Vec<u8>> {
        self.with(|s| {
            s.calls.push(Call::Read(path.to_string()));
            Self::require_live(s, handle, path)?;
            s.files
                .get(path)
                .cloned()
                .ok_or_else(|| ExecutorError::io(path, "no such file or directory"))
        })
    }

    async fn destroy(&self, handle: &SandboxHandle) -> Result<()> {
        self.with(|s| {
            s.calls.push(Call::Destroy(handle.id.clone()));
            if s.live.remove(&handle.id) {
                s.files.clear();
            }
            if std::mem::take(&mut s.fail_destroy) {
                return Err(ExecutorError::io(handle.id.as_str(), "network unreachable"));
            }
            Ok(())
        })
    }

    fn provider_name(&self) -> &str {
        "fake"
    }
}
