//! Replica/pool vocabulary shared between `analyzer-pool` and the executor.

use serde::{Deserialize, Serialize};

/// One of the four analyzer kinds; each owns its own pool and tool set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    Static,
    Dynamic,
    Performance,
    Ai,
}

impl AnalyzerKind {
    pub const ALL: [AnalyzerKind; 4] = [
        AnalyzerKind::Static,
        AnalyzerKind::Dynamic,
        AnalyzerKind::Performance,
        AnalyzerKind::Ai,
    ];

    /// Whether this kind requires a running subject application container
    /// before tools can run.
    pub fn requires_running_subject(self) -> bool {
        matches!(self, AnalyzerKind::Dynamic | AnalyzerKind::Performance)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnalyzerKind::Static => "static",
            AnalyzerKind::Dynamic => "dynamic",
            AnalyzerKind::Performance => "performance",
            AnalyzerKind::Ai => "ai",
        }
    }
}

impl std::fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown analyzer kind {0:?}")]
pub struct UnknownAnalyzerKind(pub String);

impl std::str::FromStr for AnalyzerKind {
    type Err = UnknownAnalyzerKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(AnalyzerKind::Static),
            "dynamic" => Ok(AnalyzerKind::Dynamic),
            "performance" => Ok(AnalyzerKind::Performance),
            "ai" => Ok(AnalyzerKind::Ai),
            other => Err(UnknownAnalyzerKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaEndpointId(pub uuid::Uuid);

impl ReplicaEndpointId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ReplicaEndpointId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_kind_round_trip() {
        for kind in AnalyzerKind::ALL {
            assert_eq!(kind.as_str().parse::<AnalyzerKind>().unwrap(), kind);
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!("comprehensive".parse::<AnalyzerKind>().is_err());
    }
}

/// Point-in-time stats for one replica endpoint, exposed by the pool's
/// observability surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaStats {
    pub id: ReplicaEndpointId,
    pub url: String,
    pub kind: AnalyzerKind,
    pub healthy: bool,
    pub active_requests: u32,
    pub average_latency_ms: f64,
    pub consecutive_failures: u32,
    pub cooldown_until: Option<chrono::DateTime<chrono::Utc>>,
}
