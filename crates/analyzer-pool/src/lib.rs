//! Concurrent analyzer pool: the framed replica protocol, the
//! single-kind replica worker (bounded queue + concurrency semaphore), and
//! the connection pool that load-balances, health-checks, circuit-breaks,
//! and fails over across replicas of one analyzer kind.

pub mod pool;
pub mod protocol;
pub mod replica;

pub use pool::{AnalyzerPool, FailureKind, PoolError, ReplicaTransport, SelectionPolicy, TransportError};
pub use protocol::{AnalysisRequest, AnalysisResultPayload, ClientFrame, ResponseFrame, ToolOutcomeWire, WireErrorClass};
pub use replica::{AnalysisHandler, HandlerError, OverloadError, ReplicaWorker};
