//! Utilities for running external tools with proper error handling and timeouts

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, error};

/// Resolve a program name to an executable path
pub fn resolve_program(program: &str) -> Result<PathBuf> {
    let path = Path::new(program);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    which::which(program).with_context(|| {
        format!("{} executable not found in PATH. Please install it or configure an absolute path.", program)
    })
}

/// Run a command, writing its stdout to `output_path`.
///
/// `envs` are added to the child environment only; they never appear on the
/// command line. The output file is left in place on failure so the caller
/// decides what to do with a partial dump.
pub async fn run_command_to_file(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    output_path: &Path,
    timeout: Option<Duration>,
) -> Result<()> {
    let program_path = resolve_program(program)?;

    let output_file = File::create(output_path)
        .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;

    let mut cmd = tokio::process::Command::new(&program_path);
    cmd.args(args)
        .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::from(output_file))
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Running command: {} {}", program, args.join(" "));

    let child = cmd
        .spawn()
        .with_context(|| format!("Failed to execute {}", program))?;

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| anyhow::anyhow!("Command timed out after {:?}", limit))?,
        None => child.wait_with_output().await,
    }
    .with_context(|| format!("Failed to wait for {}", program))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("Command failed: {} {}", program, args.join(" "));
        error!("Stderr: {}", stderr.trim());
        anyhow::bail!(
            "{} failed with exit code {:?}: {}",
            program,
            output.status.code(),
            stderr.trim()
        );
    }

    Ok(())
}
