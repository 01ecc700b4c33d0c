//! Maps each analyzer kind to its pool. One process owns at most one pool
//! per kind; the registry is how the executor finds the right one during
//! pre-flight and dispatch without threading four separate parameters
//! through every call site.

use std::collections::BTreeMap;
use std::sync::Arc;

use analyzer_pool::pool::{AnalyzerPool, ReplicaTransport};
use contracts::replica::AnalyzerKind;

pub struct PoolRegistry {
    pools: BTreeMap<AnalyzerKind, Arc<AnalyzerPool>>,
    transport: Arc<dyn ReplicaTransport>,
}

impl PoolRegistry {
    pub fn new(transport: Arc<dyn ReplicaTransport>) -> Self {
        Self {
            pools: BTreeMap::new(),
            transport,
        }
    }

    pub fn register(&mut self, pool: Arc<AnalyzerPool>) {
        self.pools.insert(pool.kind(), pool);
    }

    pub fn pool(&self, kind: AnalyzerKind) -> Option<&Arc<AnalyzerPool>> {
        self.pools.get(&kind)
    }

    pub fn transport(&self) -> &dyn ReplicaTransport {
        self.transport.as_ref()
    }

    /// Pre-flight liveness: every kind a task requires must have at least
    /// one healthy endpoint before dispatch begins.
    pub fn all_healthy(&self, kinds: &[AnalyzerKind]) -> Result<(), AnalyzerKind> {
        for kind in kinds {
            match self.pools.get(kind) {
                Some(pool) if pool.has_healthy_endpoint() => continue,
                _ => return Err(*kind),
            }
        }
        Ok(())
    }
}
