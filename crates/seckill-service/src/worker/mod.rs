//! 后台 Worker

pub mod order_worker;

pub use order_worker::{EntryOutcome, OrderWorker, WorkerConfig};
