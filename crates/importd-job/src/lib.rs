//! Import job lifecycle: state machine, progress arithmetic, control channel,
//! keepalive driver, chunked worker and the progress feed served to observers.

pub mod control;
pub mod dry_run;
pub mod feed;
mod inflight;
pub mod keepalive;
pub mod lifecycle;
pub mod progress;
pub mod report;
pub mod service;
pub mod trigger;
pub mod worker;

pub use control::{ControlChannel, ControlOutcome};
pub use dry_run::DryRunProcessor;
pub use feed::{FeedConfig, ProgressFeed, ProgressResponse};
pub use keepalive::{KeepaliveConfig, KeepaliveDriver, KickstartAck, kickstart_eligible};
pub use lifecycle::{Transition, allowed_actions, transition};
pub use progress::{Eta, ProgressStats, SuccessRate};
pub use report::ImportReport;
pub use service::{ImportService, NewJob, ServiceConfig};
pub use trigger::{HttpWorkerTrigger, LocalWorkerTrigger, WorkerTrigger};
pub use worker::{ChunkProcessor, ImportWorker, ItemOutcome, ItemResult, WorkerTick};
