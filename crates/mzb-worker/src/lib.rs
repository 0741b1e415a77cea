//! mzb-worker: worker-side bridge to the MZBench node.
//!
//! The node drives a worker through one channel: the worker issues
//! synchronous calls, emits metric notifications, and finishes with a
//! single result or failure frame.

pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;
pub mod term;
pub mod worker;

pub use bridge::protocol::{CallRequest, MetricName};
pub use bridge::transport::Channel;
pub use config::{ResponseSource, WorkerConfig};
pub use error::{BridgeError, Result};
pub use term::{Mapping, Number, Value};
pub use worker::{TaskFailure, TaskOutcome, Worker, WorkerTask, run_task, run_worker};
