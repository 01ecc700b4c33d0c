//! Task Executor: claims pending analysis tasks, pre-flights analyzer pool
//! liveness, dispatches to the right pool(s), and persists the outcome.
//! Runs alongside a `Reaper` that reclaims tasks orphaned by a dead
//! executor process.

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod executor;
pub mod pools;
pub mod reaper;
pub mod transport;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::ExecutorConfig;
pub use dispatch::DispatchOutcome;
pub use executor::{ExecutorError, TaskExecutor};
pub use pools::PoolRegistry;
pub use reaper::{ReapAction, ReapReport, Reaper};
pub use transport::TcpReplicaTransport;
