//! Typed facade over the private (authenticated) WebSocket channels.
//!
//! The connection behind this facade performs the login handshake before it
//! reports ready, so the first subscribe call on a fresh client implicitly
//! authenticates.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::errors::Error;
use crate::types::{AccountBalance, BalanceAndPosition, Order, Position};
use crate::ws::topic::Topic;
use crate::ws::{subscribe_typed, Push, SubscribeOptions, WsConnection};

/// Optional instrument filters accepted by the positions and orders
/// channels.
#[derive(Debug, Clone, Default)]
pub struct InstrumentFilter {
    pub inst_family: Option<String>,
    pub inst_id: Option<String>,
}

impl InstrumentFilter {
    fn apply(&self, mut topic: Topic) -> Topic {
        if let Some(family) = &self.inst_family {
            topic = topic.arg("instFamily", family.clone());
        }
        if let Some(id) = &self.inst_id {
            topic = topic.arg("instId", id.clone());
        }
        topic
    }
}

pub fn account_topic(ccy: Option<&str>) -> Topic {
    let topic = Topic::new("account");
    match ccy {
        Some(ccy) => topic.arg("ccy", ccy),
        None => topic,
    }
}

pub fn positions_topic(inst_type: impl Into<String>, filter: &InstrumentFilter) -> Topic {
    filter.apply(Topic::new("positions").arg("instType", inst_type))
}

pub fn balance_and_position_topic() -> Topic {
    Topic::new("balance_and_position")
}

pub fn orders_topic(inst_type: impl Into<String>, filter: &InstrumentFilter) -> Topic {
    filter.apply(Topic::new("orders").arg("instType", inst_type))
}

/// Private account and order channels. Cheap to clone; all clones share the
/// same authenticated connection.
#[derive(Clone)]
pub struct PrivateChannels {
    conn: Arc<WsConnection>,
}

impl PrivateChannels {
    pub(crate) fn new(conn: Arc<WsConnection>) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &WsConnection {
        &self.conn
    }

    /// Balance updates, optionally narrowed to one currency.
    pub async fn account(
        &self,
        ccy: Option<&str>,
    ) -> Result<mpsc::Receiver<Push<AccountBalance>>, Error> {
        subscribe_typed(&self.conn, account_topic(ccy), SubscribeOptions::default()).await
    }

    pub async fn positions(
        &self,
        inst_type: &str,
        filter: &InstrumentFilter,
    ) -> Result<mpsc::Receiver<Push<Position>>, Error> {
        subscribe_typed(
            &self.conn,
            positions_topic(inst_type, filter),
            SubscribeOptions::default(),
        )
        .await
    }

    /// Combined balance and position updates pushed on fills and transfers.
    pub async fn balance_and_position(
        &self,
    ) -> Result<mpsc::Receiver<Push<BalanceAndPosition>>, Error> {
        subscribe_typed(
            &self.conn,
            balance_and_position_topic(),
            SubscribeOptions::default(),
        )
        .await
    }

    pub async fn orders(
        &self,
        inst_type: &str,
        filter: &InstrumentFilter,
    ) -> Result<mpsc::Receiver<Push<Order>>, Error> {
        subscribe_typed(
            &self.conn,
            orders_topic(inst_type, filter),
            SubscribeOptions::default(),
        )
        .await
    }

    pub async fn orders_with(
        &self,
        inst_type: &str,
        filter: &InstrumentFilter,
        options: SubscribeOptions,
    ) -> Result<mpsc::Receiver<Push<Order>>, Error> {
        subscribe_typed(&self.conn, orders_topic(inst_type, filter), options).await
    }

    /// Tear down subscriptions. With `clear_sink` the receivers observe a
    /// close; without it they stay attached for a later [`Self::resume`].
    pub async fn unsubscribe(&self, topics: Vec<Topic>, clear_sink: bool) -> Result<(), Error> {
        self.conn.unsubscribe(topics, clear_sink).await
    }

    /// Re-subscribe a topic whose sink was retained across an unsubscribe.
    pub async fn resume(&self, topic: Topic) -> Result<(), Error> {
        self.conn.resume(topic).await
    }

    pub fn dropped_frames(&self, topic: &Topic) -> u64 {
        self.conn.dropped_frames(topic)
    }

    pub fn close(&self) {
        self.conn.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_are_additive() {
        let bare = positions_topic("SWAP", &InstrumentFilter::default());
        assert_eq!(bare.args().len(), 1);

        let filter = InstrumentFilter {
            inst_family: Some("BTC-USD".to_string()),
            inst_id: Some("BTC-USD-SWAP".to_string()),
        };
        let full = positions_topic("SWAP", &filter);
        assert_eq!(full.args().len(), 3);
        assert_eq!(
            full.args().get("instFamily").map(String::as_str),
            Some("BTC-USD")
        );
    }

    #[test]
    fn account_currency_is_optional() {
        assert!(account_topic(None).args().is_empty());
        assert_eq!(
            account_topic(Some("USDT")).args().get("ccy").map(String::as_str),
            Some("USDT")
        );
    }
}
