//! Wire protocol types for worker-node communication.
//!
//! Worker → node frames are single lines tagged by their first character:
//! - `C` call, answered by a response frame
//! - `M` metric notification
//! - `T` / `E` terminal result / failure
//!
//! Node → worker responses are `OK`|`ERROR`, a line count, then that many
//! body lines.

use std::fmt;

use crate::error::{BridgeError, Result};
use crate::term::{self, Number, Value, escape_metric_component};

/// A remote call `{target, operation, arguments}`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub target: String,
    pub operation: String,
    pub arguments: Vec<Value>,
}

impl CallRequest {
    pub fn new(
        target: impl Into<String>,
        operation: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        Self {
            target: target.into(),
            operation: operation.into(),
            arguments,
        }
    }

    /// The 3-tuple sent on the wire.
    pub fn to_term(&self) -> Value {
        Value::Pair(vec![
            Value::symbol(&self.target),
            Value::symbol(&self.operation),
            Value::Sequence(self.arguments.clone()),
        ])
    }
}

/// Metric identifier, e.g. `("requests", "counter")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricName {
    pub name: String,
    /// Second component; the node uses it for the metric type.
    pub kind: String,
}

impl MetricName {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }
}

impl From<&MetricName> for MetricName {
    fn from(metric: &MetricName) -> Self {
        metric.clone()
    }
}

impl<A: Into<String>, B: Into<String>> From<(A, B)> for MetricName {
    fn from((name, kind): (A, B)) -> Self {
        Self::new(name, kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    Error,
}

impl ResponseStatus {
    /// Parse a status line; trailing whitespace is ignored.
    pub fn parse(line: &str) -> Result<Self> {
        match line.trim_end() {
            "OK" => Ok(Self::Ok),
            "ERROR" => Ok(Self::Error),
            other => Err(BridgeError::framing(format!(
                "expected OK or ERROR status line, got {other:?}"
            ))),
        }
    }
}

/// Parse a body line count; trailing whitespace is ignored.
pub fn parse_line_count(line: &str) -> Result<usize> {
    let trimmed = line.trim_end();
    trimmed
        .parse::<usize>()
        .map_err(|_| BridgeError::framing(format!("expected a line count, got {trimmed:?}")))
}

/// One complete response to a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub status: ResponseStatus,
    pub body_lines: Vec<String>,
}

impl ResponseFrame {
    pub fn line_count(&self) -> usize {
        self.body_lines.len()
    }

    /// Body lines joined by `\n`.
    pub fn body(&self) -> String {
        self.body_lines.join("\n")
    }

    /// `OK` bodies decode to a value (empty → `Nil`); `ERROR` bodies become
    /// [`BridgeError::RemoteCall`].
    pub fn into_result(self) -> Result<Value> {
        let body = self.body();
        match self.status {
            ResponseStatus::Ok if body.is_empty() => Ok(Value::Nil),
            ResponseStatus::Ok => Ok(term::decode(&body)?),
            ResponseStatus::Error => Err(BridgeError::RemoteCall { message: body }),
        }
    }
}

/// Frames written by the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingFrame {
    Call(CallRequest),
    Metric { metric: MetricName, value: Number },
    Done(Value),
    Failed { kind: String, origin: String },
}

impl OutgoingFrame {
    pub fn tag(&self) -> char {
        match self {
            Self::Call(_) => 'C',
            Self::Metric { .. } => 'M',
            Self::Done(_) => 'T',
            Self::Failed { .. } => 'E',
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed { .. })
    }
}

/// Line content without the trailing newline.
impl fmt::Display for OutgoingFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.tag())?;
        match self {
            Self::Call(request) => write!(f, "{}", request.to_term())?,
            Self::Metric { metric, value } => write!(
                f,
                "{{\"{}\", \"{}\", {}}}",
                escape_metric_component(&metric.name),
                escape_metric_component(&metric.kind),
                Value::from(*value)
            )?,
            Self::Done(result) => write!(f, "{result}")?,
            Self::Failed { kind, origin } => {
                write!(f, "{} {}", single_line(kind), single_line(origin))?
            }
        }
        f.write_str(".")
    }
}

fn single_line(s: &str) -> String {
    s.replace("\r\n", " ").replace(['\n', '\r'], " ")
}
