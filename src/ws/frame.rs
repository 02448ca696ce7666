use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Error;
use crate::ws::topic::Topic;

/// Outbound control operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Subscribe,
    Unsubscribe,
    Login,
}

/// Credentials argument of a login control frame.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginArgs {
    pub api_key: String,
    pub passphrase: String,
    pub timestamp: String,
    pub sign: String,
}

/// Outbound control frame: `{"op": ..., "args": [...]}`.
#[derive(Debug, Serialize)]
pub struct ControlFrame {
    pub op: Op,
    pub args: Vec<Value>,
}

impl ControlFrame {
    pub fn subscribe(topics: &[Topic]) -> Result<Self, Error> {
        Self::op_frame(Op::Subscribe, topics)
    }

    pub fn unsubscribe(topics: &[Topic]) -> Result<Self, Error> {
        Self::op_frame(Op::Unsubscribe, topics)
    }

    fn op_frame(op: Op, topics: &[Topic]) -> Result<Self, Error> {
        let args = topics
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { op, args })
    }

    pub fn login(args: LoginArgs) -> Result<Self, Error> {
        Ok(Self {
            op: Op::Login,
            args: vec![serde_json::to_value(args)?],
        })
    }

    pub fn to_text(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Generic shape of every inbound frame before topic-specific decoding.
///
/// Three disjoint cases: an operation acknowledgment (`event` set), a push
/// frame (`event` absent, `arg` and non-empty `data` present), and the bare
/// text `pong` keepalive which never reaches JSON parsing.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Envelope {
    pub event: Option<String>,
    pub arg: Option<Value>,
    pub code: Option<String>,
    pub msg: Option<String>,
    pub data: Option<Value>,
}

impl Envelope {
    pub fn is_push(&self) -> bool {
        self.event.is_none()
            && self.arg.is_some()
            && self
                .data
                .as_ref()
                .and_then(Value::as_array)
                .is_some_and(|d| !d.is_empty())
    }

    /// Venue status code of an acknowledgment, `0` when absent.
    pub fn code(&self) -> i64 {
        self.code
            .as_deref()
            .and_then(|c| c.parse().ok())
            .unwrap_or(0)
    }

    pub fn topic(&self) -> Option<Topic> {
        let arg = self.arg.as_ref()?;
        serde_json::from_value(arg.clone()).ok()
    }
}

/// A decoded push frame for one topic.
#[derive(Debug, Clone, Deserialize)]
pub struct Push<T> {
    pub arg: Topic,
    pub data: Vec<T>,
}
