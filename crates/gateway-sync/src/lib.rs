//! Bidirectional data synchronization between a gridnode worker device and
//! its coordinating gateway.
//!
//! The engine reconciles locally recorded task-execution and earnings
//! records with the gateway's copy: paginated incremental pull, per-record
//! validation, conflict resolution, optional upward push, and health
//! diagnostics over an unreliable link.

mod client;
mod error;
mod local;
mod orchestrator;
mod synchronizer;
mod types;

pub use client::{GatewayApi, GatewayClient};
pub use error::{Result, SyncError};
pub use local::LocalDataManager;
pub use orchestrator::SyncOrchestrator;
pub use synchronizer::{EarningsSynchronizer, TaskSynchronizer};
pub use types::*;
