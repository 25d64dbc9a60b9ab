//! The ingestion control plane: the scheduler that decides which feeds are
//! due, the broker that carries tasks to workers, and the per-feed worker
//! that downloads entries and drives the retry state machine.

pub mod broker;
pub mod scheduler;
pub mod tasks;
pub mod testing;
pub mod worker;

pub use broker::{Broker, Task, TaskConsumer};
pub use scheduler::Scheduler;
pub use worker::{Downloader, FailureNotifier, FeedWorker};
