//! Post-start health polling: waits for every container in a Compose
//! project to report a terminal health state (or times out), rather than
//! assuming `up -d` returning means the application is ready to serve.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerHealthState {
    /// No health check configured on the container — treated as healthy.
    Healthy,
    Starting,
    Unhealthy,
}

impl ContainerHealthState {
    pub fn from_docker_token(token: Option<&str>) -> Self {
        match token {
            None | Some("") => ContainerHealthState::Healthy,
            Some("healthy") => ContainerHealthState::Healthy,
            Some("unhealthy") => ContainerHealthState::Unhealthy,
            Some("starting") => ContainerHealthState::Starting,
            Some(_) => ContainerHealthState::Starting,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, ContainerHealthState::Healthy | ContainerHealthState::Unhealthy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerHealth {
    pub container_name: String,
    pub state: ContainerHealthState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthWaitOutcome {
    pub healthy: bool,
    pub timed_out: bool,
    pub containers: Vec<ContainerHealth>,
}

pub const DEFAULT_HEALTH_WAIT_TIMEOUT: Duration = Duration::from_secs(60);
pub const PIPELINE_MODE_HEALTH_WAIT_TIMEOUT: Duration = Duration::from_secs(180);
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Polls `poll_once` every two seconds until every container reaches a
/// terminal health state or `timeout` elapses. `poll_once` is injected so
/// callers can drive this with a real `docker compose ps` invocation in
/// production and a scripted sequence in tests.
pub async fn wait_for_health<F, Fut>(timeout: Duration, mut poll_once: F) -> HealthWaitOutcome
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Vec<ContainerHealth>>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let containers = poll_once().await;
        let all_terminal = containers.iter().all(|c| c.state.is_terminal());
        let any_unhealthy = containers
            .iter()
            .any(|c| c.state == ContainerHealthState::Unhealthy);

        if all_terminal {
            return HealthWaitOutcome {
                healthy: !any_unhealthy,
                timed_out: false,
                containers,
            };
        }

        if tokio::time::Instant::now() >= deadline {
            return HealthWaitOutcome {
                healthy: false,
                timed_out: true,
                containers,
            };
        }

        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn absent_health_check_is_treated_as_healthy() {
        assert_eq!(ContainerHealthState::from_docker_token(None), ContainerHealthState::Healthy);
        assert_eq!(ContainerHealthState::from_docker_token(Some("")), ContainerHealthState::Healthy);
    }

    #[test]
    fn unhealthy_and_starting_are_distinguished() {
        assert_eq!(ContainerHealthState::from_docker_token(Some("unhealthy")), ContainerHealthState::Unhealthy);
        assert_eq!(ContainerHealthState::from_docker_token(Some("starting")), ContainerHealthState::Starting);
    }

    #[tokio::test]
    async fn returns_as_soon_as_all_containers_are_terminal() {
        let calls = AtomicUsize::new(0);
        let outcome = wait_for_health(Duration::from_secs(5), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    vec![ContainerHealth {
                        container_name: "web".to_string(),
                        state: ContainerHealthState::Starting,
                    }]
                } else {
                    vec![ContainerHealth {
                        container_name: "web".to_string(),
                        state: ContainerHealthState::Healthy,
                    }]
                }
            }
        })
        .await;

        assert!(outcome.healthy);
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn unhealthy_container_is_terminal_and_reported_unhealthy() {
        let outcome = wait_for_health(Duration::from_secs(5), || async {
            vec![ContainerHealth {
                container_name: "web".to_string(),
                state: ContainerHealthState::Unhealthy,
            }]
        })
        .await;

        assert!(!outcome.healthy);
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn times_out_if_never_terminal() {
        let outcome = wait_for_health(Duration::from_millis(10), || async {
            vec![ContainerHealth {
                container_name: "web".to_string(),
                state: ContainerHealthState::Starting,
            }]
        })
        .await;

        assert!(outcome.timed_out);
        assert!(!outcome.healthy);
        assert_eq!(outcome.containers.len(), 1);
    }
}
