//! Worker-side handle for the node protocol.
//!
//! [`Worker`] owns the channel and enforces turn-taking through `&mut self`:
//! a call writes its frame and is suspended until the whole response is
//! read. Termination frames close the worker for good; any fatal fault
//! poisons it.
//!
//! [`run_worker`] runs a [`WorkerTask`] once and reports its outcome with a
//! single termination frame.

use std::time::Duration;

use crate::bridge::protocol::{CallRequest, MetricName, OutgoingFrame, ResponseFrame};
use crate::bridge::transport::Channel;
use crate::config::WorkerConfig;
use crate::error::{BridgeError, Result};
use crate::term::{Number, Value};

/// Lifecycle of the channel as seen by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelState {
    Open,
    Terminated,
    Poisoned,
}

pub struct Worker {
    channel: Channel,
    state: ChannelState,
    call_timeout: Option<Duration>,
}

impl Worker {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            state: ChannelState::Open,
            call_timeout: None,
        }
    }

    /// Fail calls whose response does not arrive within `timeout`.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Open the channel described by `config` and the process environment.
    pub async fn connect(config: &WorkerConfig) -> Result<Self> {
        let channel = Channel::open(config).await?;
        Ok(Self::new(channel).with_call_timeout(config.call_timeout()))
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ChannelState::Terminated
    }

    pub fn is_poisoned(&self) -> bool {
        self.state == ChannelState::Poisoned
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        match self.state {
            ChannelState::Open => Ok(()),
            ChannelState::Terminated => Err(BridgeError::LifecycleViolation { operation }),
            ChannelState::Poisoned => Err(BridgeError::Poisoned),
        }
    }

    /// Poison the worker if `result` carries a fatal error.
    fn track<T>(&mut self, operation: &'static str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result
            && e.is_fatal()
        {
            tracing::error!(operation, error = %e, "Worker channel fault");
            self.state = ChannelState::Poisoned;
        }
        result
    }

    /// Call `target:operation(arguments)` on the node and wait for the result.
    ///
    /// `ERROR` responses come back as [`BridgeError::RemoteCall`].
    pub async fn call(
        &mut self,
        target: &str,
        operation: &str,
        arguments: Vec<Value>,
    ) -> Result<Value> {
        self.call_request(CallRequest::new(target, operation, arguments))
            .await
    }

    pub async fn call_request(&mut self, request: CallRequest) -> Result<Value> {
        self.ensure_open("call")?;
        tracing::debug!(
            module = %request.target,
            function = %request.operation,
            args = request.arguments.len(),
            "Calling node"
        );

        let response = self.exchange(request).await;
        let response = self.track("call", response)?;
        tracing::debug!(
            status = ?response.status,
            line_count = response.line_count(),
            "Call returned"
        );
        response.into_result()
    }

    async fn exchange(&mut self, request: CallRequest) -> Result<ResponseFrame> {
        self.channel.write_frame(OutgoingFrame::Call(request)).await?;
        match self.call_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.channel.read_response())
                .await
                .map_err(|_| BridgeError::CallTimeout(timeout))?,
            None => self.channel.read_response().await,
        }
    }

    /// Current value of a node-side metric.
    pub async fn get_metric_value(&mut self, name: &str) -> Result<Value> {
        self.call("mzb_metrics", "get_value", vec![Value::text(name)])
            .await
    }

    /// Emit a metric sample; nothing is read back.
    pub async fn notify(
        &mut self,
        metric: impl Into<MetricName>,
        value: impl Into<Number>,
    ) -> Result<()> {
        self.ensure_open("notify")?;
        let metric = metric.into();
        let value = value.into();
        tracing::trace!(metric = %metric.name, kind = %metric.kind, ?value, "Notify");

        let written = self
            .channel
            .write_frame(OutgoingFrame::Metric { metric, value })
            .await;
        self.track("notify", written)
    }

    /// Report the final result. The worker is unusable afterwards.
    pub async fn signal_done(&mut self, result: Value) -> Result<()> {
        self.terminate("signal_done", OutgoingFrame::Done(result))
            .await
    }

    /// Report a failure as `E <kind> <origin>.` The worker is unusable afterwards.
    pub async fn signal_failed(&mut self, kind: &str, origin: &str) -> Result<()> {
        let frame = OutgoingFrame::Failed {
            kind: kind.to_string(),
            origin: origin.to_string(),
        };
        self.terminate("signal_failed", frame).await
    }

    async fn terminate(&mut self, operation: &'static str, frame: OutgoingFrame) -> Result<()> {
        self.ensure_open(operation)?;
        tracing::debug!(tag = %frame.tag(), "Signaling termination");

        let written = self.channel.write_frame(frame).await;
        self.track(operation, written)?;
        self.state = ChannelState::Terminated;
        Ok(())
    }
}

/// Failure with an explicit kind for the `E` frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {origin}")]
pub struct TaskFailure {
    pub kind: String,
    pub origin: String,
}

impl TaskFailure {
    pub fn new(kind: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            origin: origin.into(),
        }
    }
}

/// Worker logic run once per process.
#[async_trait::async_trait]
pub trait WorkerTask: Send {
    async fn run(&mut self, worker: &mut Worker) -> anyhow::Result<Value>;
}

/// How a task ended, as reported to the node.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Done(Value),
    Failed { kind: String, origin: String },
}

/// Run `task` and emit exactly one termination frame from its result.
///
/// Fatal bridge errors are returned without a frame: the channel can no
/// longer carry one.
pub async fn run_task<T: WorkerTask + ?Sized>(
    worker: &mut Worker,
    task: &mut T,
) -> Result<TaskOutcome> {
    match task.run(worker).await {
        Ok(result) => {
            worker.signal_done(result.clone()).await?;
            tracing::info!("Worker task done");
            Ok(TaskOutcome::Done(result))
        }
        Err(err) => {
            let err = match err.downcast::<BridgeError>() {
                Ok(bridge) if bridge.is_fatal() => {
                    tracing::error!(error = %bridge, "Worker task aborted by channel fault");
                    return Err(bridge);
                }
                Ok(bridge) => anyhow::Error::from(bridge),
                Err(other) => other,
            };

            let (kind, origin) = describe_failure(&err);
            worker.signal_failed(&kind, &origin).await?;
            tracing::warn!(%kind, %origin, "Worker task failed");
            Ok(TaskOutcome::Failed { kind, origin })
        }
    }
}

/// Connect using `config` and run `task` to completion.
///
/// Global setup is left to the caller, as in this entry point:
///
/// ```no_run
/// use mzb_worker::{Value, Worker, WorkerConfig, WorkerTask, logging, run_worker};
///
/// struct Ping;
///
/// #[async_trait::async_trait]
/// impl WorkerTask for Ping {
///     async fn run(&mut self, worker: &mut Worker) -> anyhow::Result<Value> {
///         worker.notify(("pings", "counter"), 1).await?;
///         Ok(Value::symbol("ok"))
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     logging::init_tracing();
///     let config = WorkerConfig::from_env()?;
///     run_worker(config, Ping).await?;
///     Ok(())
/// }
/// ```
pub async fn run_worker<T: WorkerTask>(config: WorkerConfig, mut task: T) -> Result<TaskOutcome> {
    let mut worker = Worker::connect(&config).await?;
    run_task(&mut worker, &mut task).await
}

fn describe_failure(err: &anyhow::Error) -> (String, String) {
    if let Some(failure) = err.chain().find_map(|e| e.downcast_ref::<TaskFailure>()) {
        return (failure.kind.clone(), failure.origin.clone());
    }

    let kind = match err.chain().find_map(|e| e.downcast_ref::<BridgeError>()) {
        Some(BridgeError::RemoteCall { .. }) => "remote_call_error",
        Some(BridgeError::Decode(_)) => "decode_error",
        _ => "error",
    };
    (kind.to_string(), format!("{err:#}"))
}
