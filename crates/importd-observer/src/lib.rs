//! Polling client for import job progress.

pub mod animation;
pub mod config;
pub mod runtime;
pub mod session;
pub mod transport;

pub use animation::AnimatedCounter;
pub use config::ObserverConfig;
pub use runtime::Observer;
pub use session::{ApplyOutcome, ObserverSession, ObserverView};
pub use transport::{FeedTransport, HttpTransport, LocalTransport};
