//! WebSocket subscription layer.
//!
//! A [`WsConnection`] owns one physical socket and its [`router::Router`].
//! The typed facades in [`public`] and [`private`] build [`Topic`]s, register
//! decoding sinks, and hand back `mpsc` receivers that survive reconnects.

pub mod conn;
pub mod frame;
pub mod private;
pub mod public;
pub mod router;
pub mod topic;

pub use conn::{ConnState, Scope, WsConfig, WsConnection};
pub use frame::Push;
pub use topic::Topic;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::errors::Error;

/// Default bound of a subscription's delivery queue. Push frames beyond the
/// bound are dropped and counted rather than stalling the socket reader.
pub const DEFAULT_SINK_BUFFER: usize = 256;

/// Per-subscription options accepted by the `*_with` facade methods.
#[derive(Debug, Clone, Copy)]
pub struct SubscribeOptions {
    /// Capacity of the delivery queue behind the returned receiver.
    pub buffer: usize,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            buffer: DEFAULT_SINK_BUFFER,
        }
    }
}

/// Register a decoding sink for `topic` and subscribe on the wire if the
/// topic is not already live. Registration failures before the wire frame
/// leave no trace behind.
pub(crate) async fn subscribe_typed<T>(
    conn: &WsConnection,
    topic: Topic,
    options: SubscribeOptions,
) -> Result<mpsc::Receiver<Push<T>>, Error>
where
    T: DeserializeOwned + Send + 'static,
{
    let (rx, needs_wire) = conn.router().register::<T>(topic.clone(), options.buffer)?;
    if needs_wire {
        if let Err(e) = conn.subscribe(vec![topic.clone()]).await {
            conn.router().deactivate(&topic, true);
            return Err(e);
        }
    }
    Ok(rx)
}

/// Like [`subscribe_typed`] but batches every not-yet-live topic into a
/// single control frame. Receivers are returned in the order of `topics`.
pub(crate) async fn subscribe_typed_many<T>(
    conn: &WsConnection,
    topics: Vec<Topic>,
    options: SubscribeOptions,
) -> Result<Vec<mpsc::Receiver<Push<T>>>, Error>
where
    T: DeserializeOwned + Send + 'static,
{
    let mut receivers = Vec::with_capacity(topics.len());
    let mut wire = Vec::new();
    for topic in topics {
        let (rx, needs_wire) = conn.router().register::<T>(topic.clone(), options.buffer)?;
        if needs_wire {
            wire.push(topic);
        }
        receivers.push(rx);
    }
    if let Err(e) = conn.subscribe(wire.clone()).await {
        for topic in &wire {
            conn.router().deactivate(topic, true);
        }
        return Err(e);
    }
    Ok(receivers)
}
