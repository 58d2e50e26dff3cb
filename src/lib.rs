//! Runs agent-generated code blocks inside a remote sandbox.
//!
//! A [`CodeExecutor`] owns one [`SandboxSession`]. Each call to
//! [`CodeExecutor::execute_code_blocks`] writes the blocks into the
//! sandbox working directory, runs them one after the other under a
//! `timeout` wrapper, and copies whatever files the sandbox ends up with
//! into a local directory.

pub mod backoff;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod filename;
pub mod policy;
pub mod sandbox;
pub mod sync;

pub use error::{ExecutorError, Result};
pub use executor::{BatchResult, CodeBlock, CodeExecutor};
pub use sandbox::SandboxSession;
