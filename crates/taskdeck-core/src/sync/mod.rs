//! Client-side synchronization against a single remote backup blob.

mod conflicts;
mod first_connect;
mod network;
mod orchestrator;
mod queue;
mod scheduler;
mod status;

pub use conflicts::ConflictLedger;
pub use first_connect::{ConnectOutcome, FirstConnectCoordinator, FirstConnectSummary, MergeChoice};
pub use network::NetworkMonitor;
pub use orchestrator::{SyncOrchestrator, SyncOutcome, SyncReport};
pub use queue::ChangeQueue;
pub use scheduler::{SchedulerSettings, SyncScheduler, DEFAULT_DEBOUNCE, DEFAULT_POLL_INTERVAL};
pub use status::SyncStatusHandle;
