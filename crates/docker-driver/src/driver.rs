//! Public Docker Compose driver surface: build, start, stop, rebuild,
//! status, logs, and a bare TCP port probe, each operating on one subject
//! application identified by `(model_identifier, app_number)`.

use std::time::Duration;

use contracts::subject_application::AppIdentity;
use resilience::retry::{RetryConfig, RetryExecutor, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::compose::{is_transient, run_compose, ComposeOutput};
use crate::error::DockerDriverError;
use crate::health::{wait_for_health, ContainerHealth, ContainerHealthState, HealthWaitOutcome};
use crate::serialization::TargetLocks;

const BUILD_TIMEOUT: Duration = Duration::from_secs(600);
const COMPOSE_OP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub name: String,
    pub health: ContainerHealthState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationStatus {
    pub containers: Vec<ContainerStatus>,
    pub overall_healthy: bool,
}

struct TransientTokenPolicy;

impl RetryPolicy<DockerDriverError> for TransientTokenPolicy {
    fn should_retry(&self, attempt: u32, error: &DockerDriverError) -> bool {
        if attempt >= 3 {
            return false;
        }
        match error {
            DockerDriverError::ComposeFailed(stderr) => is_transient(stderr),
            DockerDriverError::Timeout(_) => true,
            _ => false,
        }
    }
}

/// Generalises the compose-dir lookup from a static layout to whatever
/// convention the subject application repository uses; callers supply it so
/// the driver doesn't hardcode a filesystem root.
pub trait ComposeDirResolver: Send + Sync {
    fn compose_dir(&self, identity: &AppIdentity) -> String;
}

pub struct DockerDriver<R: ComposeDirResolver> {
    resolver: R,
    locks: TargetLocks,
}

impl<R: ComposeDirResolver> DockerDriver<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            resolver,
            locks: TargetLocks::new(),
        }
    }

    async fn run_retryable(
        &self,
        compose_dir: &str,
        project_name: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<ComposeOutput, DockerDriverError> {
        let executor = RetryExecutor::new(
            RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 2_000,
                max_delay_ms: 8_000,
                backoff_multiplier: 2.0,
                jitter_factor: 0.0,
            },
            Box::new(TransientTokenPolicy),
        );

        executor
            .execute(|| async {
                let output = run_compose(compose_dir, project_name, args, timeout).await?;
                if output.success {
                    Ok(output)
                } else {
                    Err(DockerDriverError::ComposeFailed(output.stderr))
                }
            })
            .await
            .map_err(|e| match e {
                resilience::retry::RetryError::AttemptsExhausted { source, .. } => source,
                resilience::retry::RetryError::Aborted { reason } => DockerDriverError::ComposeFailed(reason),
            })
    }

    /// `down --remove-orphans --rmi local` ahead of a build, so stale
    /// images or orphaned containers never block the new one. Failures
    /// here are logged and swallowed — cleanup is best-effort, not a
    /// precondition for the build to proceed.
    async fn pre_build_cleanup(&self, compose_dir: &str, project_name: &str) {
        let result = run_compose(
            compose_dir,
            project_name,
            &["down", "--remove-orphans", "--rmi", "local"],
            COMPOSE_OP_TIMEOUT,
        )
        .await;

        if let Err(e) = result {
            tracing::warn!(project_name, error = %e, "pre-build cleanup failed, proceeding with build anyway");
        }
    }

    pub async fn build(
        &self,
        identity: &AppIdentity,
        no_cache: bool,
    ) -> Result<(), DockerDriverError> {
        let _guard = self
            .locks
            .try_acquire(&identity.model_identifier, identity.app_number as i32)
            .await
            .ok_or(DockerDriverError::ConcurrentOperationRejected)?;

        let compose_dir = self.resolver.compose_dir(identity);
        let project_name = identity.compose_project_name();

        self.pre_build_cleanup(&compose_dir, &project_name).await;

        let mut args = vec!["build"];
        if no_cache {
            args.push("--no-cache");
        }
        self.run_retryable(&compose_dir, &project_name, &args, BUILD_TIMEOUT)
            .await?;
        Ok(())
    }

    pub async fn rebuild(&self, identity: &AppIdentity) -> Result<(), DockerDriverError> {
        self.build(identity, true).await
    }

    /// Brings the application up, transparently building first if no images
    /// exist yet, then waits for container health.
    pub async fn start(
        &self,
        identity: &AppIdentity,
        health_timeout: Duration,
    ) -> Result<HealthWaitOutcome, DockerDriverError> {
        let _guard = self
            .locks
            .try_acquire(&identity.model_identifier, identity.app_number as i32)
            .await
            .ok_or(DockerDriverError::ConcurrentOperationRejected)?;

        let compose_dir = self.resolver.compose_dir(identity);
        let project_name = identity.compose_project_name();

        let up_result = self
            .run_retryable(&compose_dir, &project_name, &["up", "-d"], COMPOSE_OP_TIMEOUT)
            .await;

        if let Err(DockerDriverError::ComposeFailed(stderr)) = &up_result {
            if stderr.to_ascii_lowercase().contains("no such image")
                || stderr.to_ascii_lowercase().contains("pull access denied")
            {
                tracing::info!(project_name, "images absent, building before starting");
                drop(self.pre_build_cleanup(&compose_dir, &project_name).await);
                self.run_retryable(&compose_dir, &project_name, &["build"], BUILD_TIMEOUT)
                    .await?;
                self.run_retryable(&compose_dir, &project_name, &["up", "-d"], COMPOSE_OP_TIMEOUT)
                    .await?;
            } else {
                up_result?;
            }
        } else {
            up_result?;
        }

        let compose_dir_for_poll = compose_dir.clone();
        let project_name_for_poll = project_name.clone();
        let outcome = wait_for_health(health_timeout, || {
            let compose_dir = compose_dir_for_poll.clone();
            let project_name = project_name_for_poll.clone();
            async move { poll_container_health(&compose_dir, &project_name).await }
        })
        .await;

        Ok(outcome)
    }

    pub async fn stop(&self, identity: &AppIdentity) -> Result<(), DockerDriverError> {
        let _guard = self
            .locks
            .try_acquire(&identity.model_identifier, identity.app_number as i32)
            .await
            .ok_or(DockerDriverError::ConcurrentOperationRejected)?;

        let compose_dir = self.resolver.compose_dir(identity);
        let project_name = identity.compose_project_name();
        run_compose(&compose_dir, &project_name, &["down"], COMPOSE_OP_TIMEOUT).await?;
        Ok(())
    }

    pub async fn status(&self, identity: &AppIdentity) -> Result<ApplicationStatus, DockerDriverError> {
        let compose_dir = self.resolver.compose_dir(identity);
        let project_name = identity.compose_project_name();
        let containers = poll_container_health(&compose_dir, &project_name).await;

        let overall_healthy = !containers.is_empty()
            && containers
                .iter()
                .all(|c| c.state == ContainerHealthState::Healthy);

        Ok(ApplicationStatus {
            containers: containers
                .into_iter()
                .map(|c| ContainerStatus {
                    name: c.container_name,
                    health: c.state,
                })
                .collect(),
            overall_healthy,
        })
    }

    pub async fn logs(
        &self,
        identity: &AppIdentity,
        tail: u32,
    ) -> Result<String, DockerDriverError> {
        let compose_dir = self.resolver.compose_dir(identity);
        let project_name = identity.compose_project_name();
        let tail_arg = tail.to_string();
        let output = run_compose(
            &compose_dir,
            &project_name,
            &["logs", "--tail", &tail_arg],
            COMPOSE_OP_TIMEOUT,
        )
        .await?;
        Ok(output.stdout)
    }
}

/// Bare TCP connect probe, independent of any application identity — used
/// by callers that only know a port (e.g. the port allocator verifying a
/// port is free before assignment).
pub async fn port_probe(port: u16) -> bool {
    tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok()
}

async fn poll_container_health(compose_dir: &str, project_name: &str) -> Vec<ContainerHealth> {
    let output = match run_compose(compose_dir, project_name, &["ps", "--format", "json"], COMPOSE_OP_TIMEOUT).await {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(project_name, error = %e, "failed to poll container status");
            return vec![];
        }
    };

    output
        .stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .map(|entry| {
            let name = entry
                .get("Name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let health_token = entry.get("Health").and_then(serde_json::Value::as_str);
            ContainerHealth {
                container_name: name,
                state: ContainerHealthState::from_docker_token(health_token),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticResolver;
    impl ComposeDirResolver for StaticResolver {
        fn compose_dir(&self, identity: &AppIdentity) -> String {
            format!("/tmp/subjects/{}", identity.results_dir())
        }
    }

    #[tokio::test]
    async fn concurrent_build_on_same_target_is_rejected() {
        let driver = DockerDriver::new(StaticResolver);
        let identity = AppIdentity::new("demo", 1);

        let locks = driver.locks.clone();
        let _guard = locks.try_acquire(&identity.model_identifier, identity.app_number as i32).await.unwrap();

        let result = driver.build(&identity, false).await;
        assert!(matches!(result, Err(DockerDriverError::ConcurrentOperationRejected)));
    }

    #[test]
    fn retry_policy_retries_transient_errors_only() {
        let policy = TransientTokenPolicy;
        assert!(policy.should_retry(1, &DockerDriverError::ComposeFailed("buildkit error".to_string())));
        assert!(!policy.should_retry(1, &DockerDriverError::ComposeFailed("syntax error".to_string())));
        assert!(!policy.should_retry(3, &DockerDriverError::ComposeFailed("buildkit error".to_string())));
    }
}
