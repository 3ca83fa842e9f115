//! Command execution abstraction for testability
//!
//! This module provides a trait-based abstraction for running the database
//! dump tool, enabling dependency injection and mocking for tests.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Abstraction for command execution, enabling mocking in tests
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command and write its stdout to `output_path`
    async fn run_to_file(
        &self,
        program: &str,
        args: &[String],
        envs: &[(String, String)],
        output_path: &Path,
        timeout: Option<Duration>,
    ) -> Result<()>;
}

/// Default implementation using real subprocess calls
#[derive(Debug, Clone, Default)]
pub struct RealExecutor;

impl RealExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for RealExecutor {
    async fn run_to_file(
        &self,
        program: &str,
        args: &[String],
        envs: &[(String, String)],
        output_path: &Path,
        timeout: Option<Duration>,
    ) -> Result<()> {
        super::command::run_command_to_file(program, args, envs, output_path, timeout).await
    }
}

/// A mock executor for testing that records calls and returns configured responses
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Recorded command invocation
    #[derive(Clone, Debug)]
    pub struct CommandCall {
        pub program: String,
        pub args: Vec<String>,
        pub envs: Vec<(String, String)>,
        pub output_path: String,
    }

    /// Response configuration for mock
    #[derive(Clone, Debug)]
    pub enum MockResponse {
        /// Write `stdout` to the output file and succeed
        Success { stdout: String },
        /// Leave a partial output file behind and fail
        Failure { stderr: String, exit_code: i32 },
    }

    impl Default for MockResponse {
        fn default() -> Self {
            MockResponse::Success {
                stdout: String::new(),
            }
        }
    }

    /// Mock executor for testing
    #[derive(Clone, Default)]
    pub struct MockExecutor {
        /// Recorded command invocations
        pub calls: Arc<Mutex<Vec<CommandCall>>>,
        /// Pre-configured responses: program name -> response
        responses: Arc<Mutex<HashMap<String, MockResponse>>>,
        /// Default response when no specific response is configured
        default_response: Arc<Mutex<MockResponse>>,
    }

    impl MockExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Configure a response for a specific program
        pub fn expect(self, program: &str, response: MockResponse) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(program.to_string(), response);
            self
        }

        /// Set the default response for unconfigured programs
        pub fn with_default_response(self, response: MockResponse) -> Self {
            *self.default_response.lock().unwrap() = response;
            self
        }

        /// Get all recorded calls
        pub fn get_calls(&self) -> Vec<CommandCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Get number of calls to a specific program
        pub fn call_count(&self, program: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.program == program)
                .count()
        }

        fn get_response(&self, program: &str) -> MockResponse {
            self.responses
                .lock()
                .unwrap()
                .get(program)
                .cloned()
                .unwrap_or_else(|| self.default_response.lock().unwrap().clone())
        }
    }

    #[async_trait]
    impl CommandExecutor for MockExecutor {
        async fn run_to_file(
            &self,
            program: &str,
            args: &[String],
            envs: &[(String, String)],
            output_path: &Path,
            _timeout: Option<Duration>,
        ) -> Result<()> {
            self.calls.lock().unwrap().push(CommandCall {
                program: program.to_string(),
                args: args.to_vec(),
                envs: envs.to_vec(),
                output_path: output_path.display().to_string(),
            });

            match self.get_response(program) {
                MockResponse::Success { stdout } => {
                    std::fs::write(output_path, stdout)?;
                    Ok(())
                }
                MockResponse::Failure { stderr, exit_code } => {
                    std::fs::write(output_path, "-- partial dump")?;
                    anyhow::bail!("{} failed with exit code {:?}: {}", program, Some(exit_code), stderr)
                }
            }
        }
    }
}
