//! Thin wrapper around shelling out to `docker compose`, with the
//! sandboxed-subprocess shape used elsewhere for tool invocation: piped
//! stdio, a hard timeout, and exit code/stdout/stderr captured uniformly.

use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::error::DockerDriverError;

#[derive(Debug, Clone)]
pub struct ComposeOutput {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Transient error tokens: an error stream containing any of these is worth
/// retrying, since they typically indicate a registry hiccup or a BuildKit
/// daemon race rather than a genuine build failure.
pub const TRANSIENT_ERROR_TOKENS: &[&str] = &["buildkit", "solver", "network", "timeout"];

pub fn is_transient(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    TRANSIENT_ERROR_TOKENS.iter().any(|token| lower.contains(token))
}

/// Runs `docker compose <args>` in `compose_dir` with `COMPOSE_PROJECT_NAME`
/// pinned explicitly, rather than relying on the working directory's
/// basename (which collides whenever two applications share a parent
/// directory name).
pub async fn run_compose(
    compose_dir: &str,
    project_name: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<ComposeOutput, DockerDriverError> {
    let mut cmd = Command::new("docker");
    cmd.arg("compose").args(args);
    cmd.env("COMPOSE_PROJECT_NAME", project_name);
    cmd.current_dir(compose_dir);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let start = Instant::now();
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(ComposeOutput {
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            elapsed: start.elapsed(),
        }),
        Ok(Err(e)) => Err(DockerDriverError::Spawn(e)),
        Err(_) => Err(DockerDriverError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_transient_tokens_case_insensitively() {
        assert!(is_transient("failed to solve: BuildKit daemon unreachable"));
        assert!(is_transient("network is unreachable"));
        assert!(!is_transient("syntax error in Dockerfile"));
    }
}
